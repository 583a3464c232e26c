//! Mock HubClient for unit testing
//!
//! This module provides an in-memory implementation of `HubClientTrait` that
//! behaves like the API server for the operations the controller uses:
//! resourceVersion checks, finalizer-gated deletion, label selectors.
//! Every write is appended to a log so tests can assert on ordering and
//! idempotence.

use crate::error::HubError;
use crate::event::HubEvent;
use crate::hub_trait::HubClientTrait;
use chrono::{SecondsFormat, Utc};
use crds::{ManagedCluster, ManagedClusterAddOn, ManifestWork, ManifestWorkStatus};
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type NamespacedKey = (String, String);

/// Mock HubClient for testing
///
/// Clones share the same stores, so a test can keep a handle while the
/// reconciler owns another.
#[derive(Debug, Clone, Default)]
pub struct MockHubClient {
    clusters: Arc<Mutex<HashMap<String, ManagedCluster>>>,
    works: Arc<Mutex<HashMap<NamespacedKey, ManifestWork>>>,
    secrets: Arc<Mutex<HashMap<NamespacedKey, Secret>>>,
    addons: Arc<Mutex<HashMap<NamespacedKey, ManagedClusterAddOn>>>,
    events: Arc<Mutex<Vec<(String, HubEvent)>>>,
    writes: Arc<Mutex<Vec<String>>>,
    // One-shot failures keyed by operation name
    failures: Arc<Mutex<HashMap<String, String>>>,
    pending_conflicts: Arc<Mutex<u32>>,
    resource_version: Arc<Mutex<u64>>,
}

fn key(namespace: &str, name: &str) -> NamespacedKey {
    (namespace.to_string(), name.to_string())
}

fn now() -> Option<Time> {
    serde_json::from_value(serde_json::Value::String(
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
    .ok()
}

fn matches_selector(meta: &ObjectMeta, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => meta.labels.as_ref().and_then(|l| l.get(k)).map(String::as_str) == Some(v),
        None => meta.labels.as_ref().is_some_and(|l| l.contains_key(term)),
    })
}

fn check_version(stored: &ObjectMeta, incoming: &ObjectMeta, what: &str) -> Result<(), HubError> {
    match (&incoming.resource_version, &stored.resource_version) {
        (Some(incoming), Some(stored)) if incoming != stored => Err(HubError::Conflict(format!(
            "{what}: resourceVersion {incoming} is stale, current is {stored}"
        ))),
        _ => Ok(()),
    }
}

impl MockHubClient {
    /// Create an empty mock hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        let mut rv = self.resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    fn record(&self, entry: String) {
        self.writes.lock().unwrap().push(entry);
    }

    fn take_failure(&self, op: &str) -> Option<HubError> {
        self.failures.lock().unwrap().remove(op).map(HubError::Api)
    }

    fn take_conflict(&self) -> bool {
        let mut pending = self.pending_conflicts.lock().unwrap();
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }

    // Test setup

    /// Add a ManagedCluster (for test setup)
    pub fn add_managed_cluster(&self, mut cluster: ManagedCluster) {
        cluster.metadata.resource_version = Some(self.next_version());
        let name = cluster.metadata.name.clone().unwrap_or_default();
        self.clusters.lock().unwrap().insert(name, cluster);
    }

    /// Add a ManifestWork (for test setup)
    pub fn add_manifest_work(&self, mut work: ManifestWork) {
        work.metadata.resource_version = Some(self.next_version());
        let k = key(
            work.metadata.namespace.as_deref().unwrap_or_default(),
            work.metadata.name.as_deref().unwrap_or_default(),
        );
        self.works.lock().unwrap().insert(k, work);
    }

    /// Add a Secret (for test setup)
    pub fn add_secret(&self, mut secret: Secret) {
        secret.metadata.resource_version = Some(self.next_version());
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(k, secret);
    }

    /// Add a ManagedClusterAddOn (for test setup)
    pub fn add_addon(&self, addon: ManagedClusterAddOn) {
        let k = key(
            addon.metadata.namespace.as_deref().unwrap_or_default(),
            addon.metadata.name.as_deref().unwrap_or_default(),
        );
        self.addons.lock().unwrap().insert(k, addon);
    }

    /// Remove a ManagedClusterAddOn, as its addon controller would after cleanup
    pub fn remove_addon(&self, namespace: &str, name: &str) {
        self.addons.lock().unwrap().remove(&key(namespace, name));
    }

    /// Overwrite the status of a stored ManifestWork, as the work agent would
    pub fn set_manifest_work_status(&self, namespace: &str, name: &str, status: ManifestWorkStatus) {
        if let Some(work) = self.works.lock().unwrap().get_mut(&key(namespace, name)) {
            work.status = Some(status);
        }
    }

    /// Make the next call of `op` fail with an API error
    pub fn fail_next(&self, op: &str, message: &str) {
        self.failures.lock().unwrap().insert(op.to_string(), message.to_string());
    }

    /// Make the next `count` ManagedCluster updates fail with a conflict
    pub fn conflict_next_cluster_updates(&self, count: u32) {
        *self.pending_conflicts.lock().unwrap() = count;
    }

    // Inspection

    /// Current stored ManagedCluster
    #[must_use]
    pub fn managed_cluster(&self, name: &str) -> Option<ManagedCluster> {
        self.clusters.lock().unwrap().get(name).cloned()
    }

    /// Current stored ManifestWork
    #[must_use]
    pub fn manifest_work(&self, namespace: &str, name: &str) -> Option<ManifestWork> {
        self.works.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Names of all ManifestWorks in a namespace, sorted
    #[must_use]
    pub fn manifest_work_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .works
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Current stored Secret
    #[must_use]
    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Reasons of all published events, in order
    #[must_use]
    pub fn event_reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.reason.clone())
            .collect()
    }

    /// All published events with the name of the object they were about
    #[must_use]
    pub fn events(&self) -> Vec<(String, HubEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Write log, e.g. `create ManifestWork cluster1/test-hosted-klusterlet`
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Forget recorded writes and events
    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl HubClientTrait for MockHubClient {
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError> {
        Ok(self.clusters.lock().unwrap().get(name).cloned())
    }

    async fn update_managed_cluster_finalizers(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError> {
        let name = cluster.metadata.name.clone().unwrap_or_default();
        if self.take_conflict() {
            return Err(HubError::Conflict(format!("ManagedCluster {name} was modified")));
        }
        if let Some(err) = self.take_failure("update_managed_cluster_finalizers") {
            return Err(err);
        }
        let mut clusters = self.clusters.lock().unwrap();
        let stored = clusters
            .get_mut(&name)
            .ok_or_else(|| HubError::NotFound(format!("ManagedCluster {name}")))?;
        check_version(&stored.metadata, &cluster.metadata, "ManagedCluster")?;
        stored.metadata.finalizers = cluster.metadata.finalizers.clone();
        stored.metadata.resource_version = Some(self.next_version());
        let updated = stored.clone();
        let released = stored.metadata.deletion_timestamp.is_some()
            && stored.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if released {
            clusters.remove(&name);
        }
        drop(clusters);
        self.record(format!("update ManagedCluster/finalizers {name}"));
        Ok(updated)
    }

    async fn update_managed_cluster_status(&self, cluster: &ManagedCluster) -> Result<ManagedCluster, HubError> {
        let name = cluster.metadata.name.clone().unwrap_or_default();
        if self.take_conflict() {
            return Err(HubError::Conflict(format!("ManagedCluster {name} was modified")));
        }
        if let Some(err) = self.take_failure("update_managed_cluster_status") {
            return Err(err);
        }
        let mut clusters = self.clusters.lock().unwrap();
        let stored = clusters
            .get_mut(&name)
            .ok_or_else(|| HubError::NotFound(format!("ManagedCluster {name}")))?;
        check_version(&stored.metadata, &cluster.metadata, "ManagedCluster")?;
        stored.status = cluster.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        let updated = stored.clone();
        drop(clusters);
        self.record(format!("update ManagedCluster/status {name}"));
        Ok(updated)
    }

    async fn list_manifest_works(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<ManifestWork>, HubError> {
        if let Some(err) = self.take_failure("list_manifest_works") {
            return Err(err);
        }
        let mut works: Vec<ManifestWork> = self
            .works
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), w)| ns == namespace && matches_selector(&w.metadata, label_selector))
            .map(|(_, w)| w.clone())
            .collect();
        works.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(works)
    }

    async fn get_manifest_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>, HubError> {
        Ok(self.manifest_work(namespace, name))
    }

    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError> {
        if let Some(err) = self.take_failure("create_manifest_work") {
            return Err(err);
        }
        let namespace = work.metadata.namespace.clone().unwrap_or_default();
        let name = work.metadata.name.clone().unwrap_or_default();
        let mut works = self.works.lock().unwrap();
        if works.contains_key(&key(&namespace, &name)) {
            return Err(HubError::Conflict(format!("ManifestWork {namespace}/{name} already exists")));
        }
        let mut created = work.clone();
        created.metadata.resource_version = Some(self.next_version());
        created.status = None;
        works.insert(key(&namespace, &name), created.clone());
        drop(works);
        self.record(format!("create ManifestWork {namespace}/{name}"));
        Ok(created)
    }

    async fn replace_manifest_work(&self, work: &ManifestWork) -> Result<ManifestWork, HubError> {
        if let Some(err) = self.take_failure("replace_manifest_work") {
            return Err(err);
        }
        let namespace = work.metadata.namespace.clone().unwrap_or_default();
        let name = work.metadata.name.clone().unwrap_or_default();
        let mut works = self.works.lock().unwrap();
        let stored = works
            .get_mut(&key(&namespace, &name))
            .ok_or_else(|| HubError::NotFound(format!("ManifestWork {namespace}/{name}")))?;
        check_version(&stored.metadata, &work.metadata, "ManifestWork")?;
        let status = stored.status.take();
        *stored = work.clone();
        stored.status = status;
        stored.metadata.resource_version = Some(self.next_version());
        let updated = stored.clone();
        drop(works);
        self.record(format!("update ManifestWork {namespace}/{name}"));
        Ok(updated)
    }

    async fn delete_manifest_work(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        if let Some(err) = self.take_failure("delete_manifest_work") {
            return Err(err);
        }
        let mut works = self.works.lock().unwrap();
        let k = key(namespace, name);
        let Some(work) = works.get_mut(&k) else {
            return Ok(());
        };
        if work.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()) {
            if work.metadata.deletion_timestamp.is_none() {
                work.metadata.deletion_timestamp = now();
            }
        } else {
            works.remove(&k);
        }
        drop(works);
        self.record(format!("delete ManifestWork {namespace}/{name}"));
        Ok(())
    }

    async fn remove_manifest_work_finalizers(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        let mut works = self.works.lock().unwrap();
        let k = key(namespace, name);
        let Some(work) = works.get_mut(&k) else {
            return Ok(());
        };
        work.metadata.finalizers = None;
        if work.metadata.deletion_timestamp.is_some() {
            works.remove(&k);
        }
        drop(works);
        self.record(format!("finalize ManifestWork {namespace}/{name}"));
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, HubError> {
        Ok(self.secret(namespace, name))
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, HubError> {
        if let Some(err) = self.take_failure("replace_secret") {
            return Err(err);
        }
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut secrets = self.secrets.lock().unwrap();
        let stored = secrets
            .get_mut(&key(&namespace, &name))
            .ok_or_else(|| HubError::NotFound(format!("Secret {namespace}/{name}")))?;
        check_version(&stored.metadata, &secret.metadata, "Secret")?;
        *stored = secret.clone();
        stored.metadata.resource_version = Some(self.next_version());
        let updated = stored.clone();
        drop(secrets);
        self.record(format!("update Secret {namespace}/{name}"));
        Ok(updated)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), HubError> {
        if let Some(err) = self.take_failure("delete_secret") {
            return Err(err);
        }
        if self.secrets.lock().unwrap().remove(&key(namespace, name)).is_some() {
            self.record(format!("delete Secret {namespace}/{name}"));
        }
        Ok(())
    }

    async fn list_managed_cluster_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, HubError> {
        Ok(self
            .addons
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, a)| a.clone())
            .collect())
    }

    async fn publish_event(&self, reference: &ObjectReference, event: HubEvent) {
        let name = reference.name.clone().unwrap_or_default();
        self.events.lock().unwrap().push((name, event));
    }
}
