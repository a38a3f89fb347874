//! Doris Operator - reconciles DorisCluster resources into running Doris roles

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use doris_operator::controller::{error_policy, reconcile, Context, ReconcilerConfig};
use doris_operator::crd::{DorisAutoscaler, DorisCluster};
use doris_operator::error::MultiError;
use doris_operator::Error;

/// Doris Operator - CRD-driven Kubernetes operator for Apache Doris clusters
#[derive(Parser, Debug)]
#[command(name = "doris-operator", version, about, long_about = None)]
struct OperatorArgs {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Only watch DorisClusters in this namespace (default: all namespaces)
    #[arg(long, env = "DORIS_OPERATOR_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between passes over a healthy cluster
    #[arg(long, env = "DORIS_OPERATOR_RESYNC_SECS", default_value = "300")]
    resync_secs: u64,

    /// Seconds before retrying a failed pass
    #[arg(long, env = "DORIS_OPERATOR_ERROR_REQUEUE_SECS", default_value = "15")]
    error_requeue_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "DORIS_OPERATOR_LOG_JSON")]
    log_json: bool,
}

impl OperatorArgs {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            resync_interval: Duration::from_secs(self.resync_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let args = OperatorArgs::parse();

    if args.crd {
        for crd in [DorisCluster::crd(), DorisAutoscaler::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    run_controller(args).await
}

/// Install the operator's CRDs with server-side apply
///
/// The CRDs always match the running operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(doris_operator::FIELD_MANAGER).force();

    // Attempt every CRD so one failure does not hide another.
    let mut results = Vec::new();
    for crd in [DorisCluster::crd(), DorisAutoscaler::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        let result = crds
            .patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map(|_| ())
            .map_err(Error::from);
        results.push(result);
    }
    if let Some(errors) = MultiError::merge(results) {
        return Err(anyhow::anyhow!("Failed to install CRDs: {}", errors));
    }

    tracing::info!("All Doris CRDs installed/updated");
    Ok(())
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the DorisCluster controller until a shutdown signal arrives
async fn run_controller(args: OperatorArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let ctx = Arc::new(
        Context::builder(client.clone())
            .config(args.reconciler_config())
            .build(),
    );

    let namespace = args.namespace.as_deref();
    let clusters: Api<DorisCluster> = scoped_api(&client, namespace);
    let managed = WatcherConfig::default().labels(&format!(
        "app.kubernetes.io/managed-by={}",
        doris_operator::MANAGED_BY
    ));

    tracing::info!(namespace = namespace.unwrap_or("*"), "Starting DorisCluster controller");

    Controller::new(clusters, WatcherConfig::default())
        .owns(scoped_api::<StatefulSet>(&client, namespace), managed.clone())
        .owns(scoped_api::<Service>(&client, namespace), managed.clone())
        .owns(scoped_api::<ConfigMap>(&client, namespace), managed)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Cluster reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Cluster reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Controller stopped");
    Ok(())
}
