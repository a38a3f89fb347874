//! DorisCluster controller implementation
//!
//! A pass runs a fixed list of stages: the operator account Secret, then the
//! FE, BE, CN and Broker roles. The first failing stage ends the pass and is
//! recorded on the cluster status; kube-runtime then requeues it through
//! [`error_policy`]. Nothing is rolled back, the next pass picks up from the
//! live objects.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{AutoscalerLookup, KubeClientImpl, ObjectStore, StatusWriter};
use super::role::{RoleReconciler, DESCRIPTORS};
use super::stage::{Stage, StageResult};
use crate::crd::{
    Condition, ConditionStatus, DorisCluster, DorisClusterStatus, StageAction, StageStatus,
};
use crate::resources::{account_secret_key, secret, ManagedObject, ObjectKey, ObjectKind};
use crate::Error;

/// Condition type summarizing the last pass
pub const RECONCILED_CONDITION: &str = "Reconciled";

/// Timing of the controller loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Requeue delay after a successful pass
    pub resync_interval: Duration,
    /// Requeue delay after a failed pass
    pub error_requeue: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(300),
            error_requeue: Duration::from_secs(15),
        }
    }
}

// =============================================================================
// Cluster reconciler
// =============================================================================

/// Runs every stage of one pass over a DorisCluster
pub struct ClusterReconciler<'a> {
    cluster: &'a DorisCluster,
    key: &'a ObjectKey,
    store: &'a dyn ObjectStore,
    autoscalers: &'a dyn AutoscalerLookup,
}

impl<'a> ClusterReconciler<'a> {
    /// Create a reconciler for `cluster`, identified by `key`
    pub fn new(
        cluster: &'a DorisCluster,
        key: &'a ObjectKey,
        store: &'a dyn ObjectStore,
        autoscalers: &'a dyn AutoscalerLookup,
    ) -> Self {
        Self {
            cluster,
            key,
            store,
            autoscalers,
        }
    }

    /// Run all stages in order and stop at the first failure
    pub async fn reconcile(&self) -> StageResult {
        let secret = self.ensure_account_secret().await;
        if secret.is_failure() {
            return secret;
        }

        let roles = RoleReconciler::new(self.cluster, self.key, self.store, self.autoscalers);
        for descriptor in &DESCRIPTORS {
            let result = roles.reconcile(descriptor).await;
            if result.is_failure() {
                warn!(
                    role = %descriptor.role,
                    stage = %result.stage,
                    error = ?result.error,
                    "stage failed"
                );
                return result;
            }
            debug!(role = %descriptor.role, action = ?result.action, "role reconciled");
        }

        StageResult::complete()
    }

    /// Create the account Secret unless it already exists
    ///
    /// An existing Secret is left alone so the password is never rotated.
    async fn ensure_account_secret(&self) -> StageResult {
        match self.create_account_secret_if_missing().await {
            Ok(()) => StageResult::succeeded(Stage::AccountSecret, Some(StageAction::Apply)),
            Err(e) => StageResult::failed(Stage::AccountSecret, Some(StageAction::Apply), e),
        }
    }

    async fn create_account_secret_if_missing(&self) -> Result<(), Error> {
        let key = account_secret_key(self.key);
        if self.store.exists(ObjectKind::Secret, &key).await? {
            debug!(secret = %key, "operator account secret present");
            return Ok(());
        }
        let Some(secret) = secret::account_secret(self.cluster)? else {
            return Err(Error::internal_with_context(
                "account-secret",
                "cluster has no namespace",
            ));
        };
        self.store.create(&ManagedObject::Secret(secret)).await?;
        info!(secret = %key, "created operator account secret");
        Ok(())
    }
}

/// Status projection of a pass result
pub fn status_for(result: &StageResult, generation: Option<i64>) -> DorisClusterStatus {
    let condition = match &result.error {
        None => Condition::new(
            RECONCILED_CONDITION,
            ConditionStatus::True,
            "Complete",
            "all stages succeeded",
        ),
        Some(e) => Condition::new(
            RECONCILED_CONDITION,
            ConditionStatus::False,
            result.stage.to_string(),
            e.to_string(),
        ),
    };
    let status = DorisClusterStatus {
        stage: Some(result.stage.to_string()),
        stage_status: Some(result.status),
        stage_action: result.action,
        ..Default::default()
    }
    .observed_generation(generation)
    .condition(condition);

    match &result.error {
        Some(e) => status.message(e.to_string()),
        None => status,
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Controller context containing shared clients and loop timing
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(ReconcilerConfig::default())
///     .build();
/// ```
pub struct Context {
    /// Store for managed objects
    pub store: Arc<dyn ObjectStore>,
    /// Lookup of autoscalers bound to clusters
    pub autoscalers: Arc<dyn AutoscalerLookup>,
    /// Writer for the DorisCluster status
    pub status: Arc<dyn StatusWriter>,
    /// Loop timing
    pub config: ReconcilerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self::builder(client).build()
    }

    /// Create a context for testing with custom clients
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ObjectStore>,
        autoscalers: Arc<dyn AutoscalerLookup>,
        status: Arc<dyn StatusWriter>,
    ) -> Self {
        Self {
            store,
            autoscalers,
            status,
            config: ReconcilerConfig::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    store: Option<Arc<dyn ObjectStore>>,
    autoscalers: Option<Arc<dyn AutoscalerLookup>>,
    status: Option<Arc<dyn StatusWriter>>,
    config: ReconcilerConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            store: None,
            autoscalers: None,
            status: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the loop timing
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the object store (primarily for testing)
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the autoscaler lookup (primarily for testing)
    pub fn autoscaler_lookup(mut self, lookup: Arc<dyn AutoscalerLookup>) -> Self {
        self.autoscalers = Some(lookup);
        self
    }

    /// Override the status writer (primarily for testing)
    pub fn status_writer(mut self, status: Arc<dyn StatusWriter>) -> Self {
        self.status = Some(status);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube = Arc::new(KubeClientImpl::new(self.client));
        Context {
            store: self.store.unwrap_or_else(|| kube.clone()),
            autoscalers: self.autoscalers.unwrap_or_else(|| kube.clone()),
            status: self.status.unwrap_or(kube),
            config: self.config,
        }
    }
}

// =============================================================================
// kube-runtime callbacks
// =============================================================================

/// Reconcile a DorisCluster resource
///
/// Invalid specs are recorded on the status and wait for the next spec
/// change. Otherwise one pass runs and its outcome is recorded; a failed
/// stage is returned as the error so [`error_policy`] schedules the retry.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<DorisCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(key) = cluster.key() else {
        return Err(Error::validation("DorisCluster has no namespace"));
    };
    let generation = cluster.metadata.generation;
    info!("reconciling cluster");

    if let Err(e) = cluster.spec.validate() {
        warn!(error = %e, "cluster validation failed");
        let status = DorisClusterStatus {
            stage: Some("validation".to_string()),
            stage_status: Some(StageStatus::Failed),
            ..Default::default()
        }
        .message(e.to_string())
        .observed_generation(generation)
        .condition(Condition::new(
            RECONCILED_CONDITION,
            ConditionStatus::False,
            "InvalidSpec",
            e.to_string(),
        ));
        record_status(&ctx, &cluster, &key, status).await?;
        return Ok(Action::await_change());
    }

    let result = ClusterReconciler::new(
        &cluster,
        &key,
        ctx.store.as_ref(),
        ctx.autoscalers.as_ref(),
    )
    .reconcile()
    .await;

    record_status(&ctx, &cluster, &key, status_for(&result, generation)).await?;

    match result.error {
        Some(e) => Err(e),
        None => {
            info!("cluster reconciled");
            Ok(Action::requeue(ctx.config.resync_interval))
        }
    }
}

/// Write `status` unless the cluster already reports it
///
/// A status write is a watch event on the cluster and starts another pass, so
/// a settled cluster must produce no write at all.
async fn record_status(
    ctx: &Context,
    cluster: &DorisCluster,
    key: &ObjectKey,
    status: DorisClusterStatus,
) -> Result<(), Error> {
    let status = status.carry_transition_times(cluster.status.as_ref());
    if cluster.status.as_ref() == Some(&status) {
        debug!("status unchanged");
        return Ok(());
    }
    ctx.status.patch_status(key, &status).await
}

/// Error policy for the controller
///
/// Retryable errors requeue after the configured delay. Anything else needs a
/// change to the cluster or its objects, which triggers a new pass anyway.
pub fn error_policy(cluster: Arc<DorisCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ctx.config.error_requeue)
    } else {
        Action::await_change()
    }
}
