//! Operator account Secret
//!
//! Every role reads the operator's SQL account from this Secret. It is
//! generated once per cluster and never rotated by the reconciler.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use k8s_openapi::api::core::v1::Secret;

use super::common::{owned_meta, ACCOUNT_PASSWORD_KEY, ACCOUNT_USER_KEY};
use super::account_secret_key;
use crate::crd::DorisCluster;
use crate::Error;

/// SQL user the operator manages the cluster as
pub const OPERATOR_USER: &str = "k8sopr";

const PASSWORD_BYTES: usize = 24;

/// Generate a random password, URL-safe base64 without padding
pub fn generate_password() -> crate::Result<String> {
    let mut raw = [0u8; PASSWORD_BYTES];
    aws_lc_rs::rand::fill(&mut raw)
        .map_err(|_| Error::internal_with_context("account-secret", "random generation failed"))?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}

/// Account Secret with a freshly generated password
///
/// Returns `Ok(None)` for a cluster without a namespace.
pub fn account_secret(cluster: &DorisCluster) -> crate::Result<Option<Secret>> {
    let Some(cluster_key) = cluster.key() else {
        return Ok(None);
    };
    let password = generate_password()?;
    Ok(Some(Secret {
        metadata: owned_meta(cluster, &account_secret_key(&cluster_key), None),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            (ACCOUNT_USER_KEY.to_string(), OPERATOR_USER.to_string()),
            (ACCOUNT_PASSWORD_KEY.to_string(), password),
        ])),
        ..Default::default()
    }))
}
