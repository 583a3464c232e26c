//! Kubernetes resource watchers.
//!
//! Four resource streams feed one reconcile key, the ManagedCluster name.
//! Each event source is a [`WatchSource`] variant that maps its object to the
//! cluster it belongs to. A single `kube_runtime::Controller` over
//! ManagedClusters owns the queue, so one cluster is never reconciled twice
//! at the same time and bursts of events collapse into one pass.

use crate::constants::{
    AUTO_IMPORT_SECRET_NAME, HOSTED_CLUSTER_LABEL, HOSTED_KLUSTERLET_WORK_SUFFIX, HOSTED_KUBECONFIG_WORK_SUFFIX,
    IMPORT_SECRET_LABEL,
};
use crate::error::ControllerError;
use crate::helpers::{DeployMode, deploy_mode, import_secret_name, label};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::{ManagedCluster, ManifestWork};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, controller::{Action, Config as RuntimeConfig}, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Server-side watch timeout, kept below common idle-connection limits
const WATCH_TIMEOUT_SECS: u32 = 290;

/// An object from one of the watched streams
#[derive(Debug, Clone, Copy)]
pub enum WatchSource<'a> {
    ManagedCluster(&'a ManagedCluster),
    ManifestWork(&'a ManifestWork),
    /// Secret carrying the import-secret label
    ImportSecret(&'a Secret),
    /// Secret named `auto-import-secret`
    AutoImportSecret(&'a Secret),
}

impl WatchSource<'_> {
    /// Name of the ManagedCluster this object belongs to, if any
    #[must_use]
    pub fn cluster_name(&self) -> Option<String> {
        match self {
            Self::ManagedCluster(cluster) => {
                (deploy_mode(cluster) == DeployMode::Hosted).then(|| cluster.name_any())
            }
            Self::ManifestWork(work) => {
                let name = work.name_any();
                let by_suffix = [HOSTED_KLUSTERLET_WORK_SUFFIX, HOSTED_KUBECONFIG_WORK_SUFFIX]
                    .iter()
                    .find_map(|suffix| name.strip_suffix(suffix)?.strip_suffix('-'))
                    .filter(|cluster| !cluster.is_empty());
                by_suffix
                    .or_else(|| label(&work.metadata, HOSTED_CLUSTER_LABEL))
                    .map(str::to_string)
                    .or_else(|| work.namespace())
            }
            Self::ImportSecret(secret) => {
                let namespace = secret.namespace()?;
                (secret.name_any() == import_secret_name(&namespace)).then_some(namespace)
            }
            Self::AutoImportSecret(secret) => {
                if secret.name_any() != AUTO_IMPORT_SECRET_NAME {
                    return None;
                }
                secret.namespace()
            }
        }
    }

    /// Reconcile key for the owning ManagedCluster
    #[must_use]
    pub fn reconcile_key(&self) -> Option<ObjectRef<ManagedCluster>> {
        self.cluster_name().map(|name| ObjectRef::new(&name))
    }
}

/// Watches hub resources and drives the reconciler.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    clusters: Api<ManagedCluster>,
    works: Api<ManifestWork>,
    secrets: Api<Secret>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Done => Action::await_change(),
            ReconcileOutcome::RequeueAfter(interval) => Action::requeue(interval),
        }
    }
}

async fn reconcile(cluster: Arc<ManagedCluster>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    if WatchSource::ManagedCluster(&cluster).reconcile_key().is_none() {
        return Ok(Action::await_change());
    }
    let name = cluster.name_any();
    debug!("Reconciling ManagedCluster {}", name);
    let outcome = ctx.reconcile(&name).await?;
    ctx.backoff().reset(&name);
    Ok(outcome.into())
}

fn error_policy(cluster: Arc<ManagedCluster>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let name = cluster.name_any();
    let delay = ctx.backoff().next_delay(&name);
    error!("Reconciliation error for ManagedCluster {}: {} (retrying in {:?})", name, error, delay);
    Action::requeue(delay)
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        clusters: Api<ManagedCluster>,
        works: Api<ManifestWork>,
        secrets: Api<Secret>,
    ) -> Self {
        Self {
            reconciler,
            clusters,
            works,
            secrets,
        }
    }

    /// Run the controller until its streams end
    pub async fn watch_managed_clusters(&self, concurrency: u16, debounce: Duration) -> Result<(), ControllerError> {
        info!("Starting ManagedCluster watcher");
        let watch_config = || watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);

        let runtime_config = RuntimeConfig::default().debounce(debounce).concurrency(concurrency);

        Controller::new(self.clusters.clone(), watch_config())
            .with_config(runtime_config)
            .watches(self.works.clone(), watch_config(), |work: ManifestWork| {
                WatchSource::ManifestWork(&work).reconcile_key()
            })
            .watches(self.secrets.clone(), watch_config().labels(IMPORT_SECRET_LABEL), |secret: Secret| {
                WatchSource::ImportSecret(&secret).reconcile_key()
            })
            .watches(
                self.secrets.clone(),
                watch_config().fields(&format!("metadata.name={AUTO_IMPORT_SECRET_NAME}")),
                |secret: Secret| WatchSource::AutoImportSecret(&secret).reconcile_key(),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::clone(&self.reconciler))
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled ManagedCluster {}", obj.name),
                    Err(e) => error!("ManagedCluster controller error: {}", e),
                }
            })
            .await;

        info!("ManagedCluster watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_outcome_maps_to_action() {
        assert_eq!(Action::from(ReconcileOutcome::Done), Action::await_change());
        assert_eq!(
            Action::from(ReconcileOutcome::RequeueAfter(Duration::from_secs(2))),
            Action::requeue(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_hosted_work_maps_by_name_suffix() {
        let klusterlet = create_test_manifest_work("cluster1", "test-hosted-klusterlet", &[]);
        let kubeconfig = create_test_manifest_work("cluster1", "my-cluster-hosted-kubeconfig", &[]);
        assert_eq!(WatchSource::ManifestWork(&klusterlet).cluster_name().as_deref(), Some("test"));
        assert_eq!(WatchSource::ManifestWork(&kubeconfig).cluster_name().as_deref(), Some("my-cluster"));
    }

    #[test]
    fn test_labelled_work_maps_by_label() {
        let mut work = create_test_manifest_work("cluster1", "test-extra", &[]);
        work.metadata.labels = Some(BTreeMap::from([(HOSTED_CLUSTER_LABEL.to_string(), "test".to_string())]));
        assert_eq!(WatchSource::ManifestWork(&work).cluster_name().as_deref(), Some("test"));
    }

    #[test]
    fn test_plain_work_maps_by_namespace() {
        let work = create_test_manifest_work("test", "test-klusterlet-addon-workmgr", &[]);
        let key = WatchSource::ManifestWork(&work).reconcile_key().unwrap();
        assert_eq!(key.name, "test");
        assert_eq!(key.namespace, None);
    }

    #[test]
    fn test_only_hosted_clusters_are_keys() {
        let hosted = create_test_managed_cluster("test", Some("cluster1"));
        let default = create_test_managed_cluster("cluster1", None);
        assert_eq!(WatchSource::ManagedCluster(&hosted).cluster_name().as_deref(), Some("test"));
        assert!(WatchSource::ManagedCluster(&default).reconcile_key().is_none());
    }

    #[test]
    fn test_import_secret_must_match_namespace() {
        let secret = create_test_import_secret("test", TEST_IMPORT_YAML);
        assert_eq!(WatchSource::ImportSecret(&secret).cluster_name().as_deref(), Some("test"));

        let mut foreign = secret.clone();
        foreign.metadata.namespace = Some("other".to_string());
        assert!(WatchSource::ImportSecret(&foreign).reconcile_key().is_none());
    }

    #[test]
    fn test_auto_import_secret_maps_to_namespace() {
        let secret = create_test_auto_import_secret("test", TEST_KUBECONFIG, false);
        assert_eq!(WatchSource::AutoImportSecret(&secret).cluster_name().as_deref(), Some("test"));

        let mut renamed = secret.clone();
        renamed.metadata.name = Some("kubeconfig".to_string());
        assert!(WatchSource::AutoImportSecret(&renamed).reconcile_key().is_none());
    }
}
