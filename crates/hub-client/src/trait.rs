//! HubClient trait for mocking
//!
//! This trait abstracts hub API access so the reconciler can be unit tested
//! against an in-memory store. The concrete `HubClient` implements it on top of
//! `kube::Api`.

use crate::error::HubError;
use crate::event::HubEvent;
use crds::{ManagedCluster, ManagedClusterAddOn, ManifestWork};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};

/// Trait for hub API operations
///
/// Getters return `Ok(None)` for missing objects. Deletes tolerate missing
/// objects. Updates carry the caller's `resourceVersion`, so a stale object
/// fails with [`HubError::Conflict`] instead of overwriting newer state.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HubClientTrait: Send + Sync {
    // ManagedCluster Operations
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError>;
    /// Write `metadata.finalizers` of the given cluster
    async fn update_managed_cluster_finalizers(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError>;
    /// Write the status subresource of the given cluster
    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError>;

    // ManifestWork Operations
    async fn list_manifest_works(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<ManifestWork>, HubError>;
    async fn get_manifest_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>, HubError>;
    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError>;
    async fn replace_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError>;
    async fn delete_manifest_work(&self, namespace: &str, name: &str) -> Result<(), HubError>;
    /// Clear every finalizer on a work so a pending deletion completes
    async fn remove_manifest_work_finalizers(&self, namespace: &str, name: &str) -> Result<(), HubError>;

    // Secret Operations
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, HubError>;
    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, HubError>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), HubError>;

    // Addon Operations
    async fn list_managed_cluster_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, HubError>;

    /// Publish an Event about `reference`. Failures are logged, never returned.
    async fn publish_event(&self, reference: &ObjectReference, event: HubEvent);
}
