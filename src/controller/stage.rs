//! Reconciliation stages and their results
//!
//! A pass over a DorisCluster walks a fixed list of stages. Each stage
//! produces a [`StageResult`]; the first one carrying an error ends the pass.

use std::fmt;

use crate::crd::{Role, StageAction, StageStatus};
use crate::resources::ObjectKind;
use crate::Error;

/// A point in the reconciliation pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Ensuring the operator account Secret exists
    AccountSecret,
    /// A role finished applying or deleting all its objects
    Role(Role),
    /// A single object of a role, named when it fails
    Resource(Role, ObjectKind),
    /// Every stage succeeded
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountSecret => f.write_str("account-secret"),
            Self::Role(role) => write!(f, "{}", role),
            Self::Resource(role, kind) => write!(f, "{}-{}", role, kind),
            Self::Complete => f.write_str("complete"),
        }
    }
}

/// Outcome of one stage
#[derive(Debug)]
pub struct StageResult {
    /// Stage that produced this result
    pub stage: Stage,
    /// Whether the stage succeeded
    pub status: StageStatus,
    /// What the stage did, if it did anything
    pub action: Option<StageAction>,
    /// Error that aborted the stage
    pub error: Option<Error>,
}

impl StageResult {
    /// A stage that finished without error
    pub fn succeeded(stage: Stage, action: Option<StageAction>) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            action,
            error: None,
        }
    }

    /// A stage aborted by `error`
    pub fn failed(stage: Stage, action: Option<StageAction>, error: Error) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            action,
            error: Some(error),
        }
    }

    /// Result of a pass in which every stage succeeded
    pub fn complete() -> Self {
        Self::succeeded(Stage::Complete, None)
    }

    /// True if this result ends the pass
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_identify_role_and_object() {
        assert_eq!(Stage::AccountSecret.to_string(), "account-secret");
        assert_eq!(Stage::Role(Role::Cn).to_string(), "cn");
        assert_eq!(
            Stage::Resource(Role::Fe, ObjectKind::PeerService).to_string(),
            "fe-peer-service"
        );
        assert_eq!(
            Stage::Resource(Role::Broker, ObjectKind::StatefulSet).to_string(),
            "broker-statefulset"
        );
        assert_eq!(Stage::Complete.to_string(), "complete");
    }

    #[test]
    fn failed_result_reports_failed_status() {
        let result = StageResult::failed(
            Stage::Resource(Role::Be, ObjectKind::ConfigMap),
            Some(StageAction::Apply),
            Error::internal_with_context("test", "boom"),
        );
        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.is_failure());

        let ok = StageResult::succeeded(Stage::Role(Role::Be), Some(StageAction::Delete));
        assert_eq!(ok.status, StageStatus::Succeeded);
        assert!(!ok.is_failure());
    }
}
