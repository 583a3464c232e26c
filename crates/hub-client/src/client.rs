//! kube-backed hub client

use crate::error::HubError;
use crate::event::{EventKind, HubEvent};
use crate::hub_trait::HubClientTrait;
use crds::{ManagedCluster, ManagedClusterAddOn, ManifestWork};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client};
use tracing::{debug, warn};

/// Hub client backed by the Kubernetes API server
#[derive(Clone)]
pub struct HubClient {
    client: Client,
    recorder: Recorder,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient").finish_non_exhaustive()
    }
}

impl HubClient {
    /// Create a client whose Events are reported by `controller_name`
    #[must_use]
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    /// Underlying kube client, for watch streams
    #[must_use]
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn clusters(&self) -> Api<ManagedCluster> {
        Api::all(self.client.clone())
    }

    fn works(&self, namespace: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta, kind: &str) -> Result<String, HubError> {
    meta.name
        .clone()
        .ok_or_else(|| HubError::InvalidObject(format!("{kind} missing name")))
}

fn object_namespace(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta, kind: &str) -> Result<String, HubError> {
    meta.namespace
        .clone()
        .ok_or_else(|| HubError::InvalidObject(format!("{kind} missing namespace")))
}

/// Treat a 404 on delete as success
fn ignore_not_found<T>(result: Result<T, kube::Error>) -> Result<(), HubError> {
    match result.map_err(HubError::from) {
        Ok(_) | Err(HubError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl HubClientTrait for HubClient {
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError> {
        Ok(self.clusters().get_opt(name).await?)
    }

    async fn update_managed_cluster_finalizers(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError> {
        let name = object_name(&cluster.metadata, "ManagedCluster")?;
        // resourceVersion in a merge patch makes the API server reject stale writes
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": cluster.metadata.resource_version,
                "finalizers": cluster.metadata.finalizers.clone().unwrap_or_default(),
            }
        });
        debug!("Updating finalizers of ManagedCluster {}", name);
        Ok(self
            .clusters()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError> {
        let name = object_name(&cluster.metadata, "ManagedCluster")?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": cluster.metadata.resource_version },
            "status": cluster.status,
        });
        debug!("Updating status of ManagedCluster {}", name);
        Ok(self
            .clusters()
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn list_manifest_works(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<ManifestWork>, HubError> {
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        Ok(self.works(namespace).list(&lp).await?.items)
    }

    async fn get_manifest_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>, HubError> {
        Ok(self.works(namespace).get_opt(name).await?)
    }

    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError> {
        let namespace = object_namespace(&work.metadata, "ManifestWork")?;
        Ok(self.works(&namespace).create(&PostParams::default(), work).await?)
    }

    async fn replace_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError> {
        let name = object_name(&work.metadata, "ManifestWork")?;
        let namespace = object_namespace(&work.metadata, "ManifestWork")?;
        Ok(self
            .works(&namespace)
            .replace(&name, &PostParams::default(), work)
            .await?)
    }

    async fn delete_manifest_work(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        ignore_not_found(self.works(namespace).delete(name, &DeleteParams::default()).await)
    }

    async fn remove_manifest_work_finalizers(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        let patch = serde_json::json!({ "metadata": { "finalizers": null } });
        ignore_not_found(
            self.works(namespace)
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await,
        )
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, HubError> {
        Ok(self.secrets(namespace).get_opt(name).await?)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, HubError> {
        let name = object_name(&secret.metadata, "Secret")?;
        let namespace = object_namespace(&secret.metadata, "Secret")?;
        Ok(self
            .secrets(&namespace)
            .replace(&name, &PostParams::default(), secret)
            .await?)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        ignore_not_found(self.secrets(namespace).delete(name, &DeleteParams::default()).await)
    }

    async fn list_managed_cluster_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, HubError> {
        let api: Api<ManagedClusterAddOn> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn publish_event(&self, reference: &ObjectReference, event: HubEvent) {
        let ev = Event {
            type_: match event.kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: event.reason.clone(),
            note: event.note,
            action: event.action,
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&ev, reference).await {
            warn!(reason = %event.reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}
