//! Deletion Orchestrator
//!
//! Tears down the works of a deleting hosted cluster in an order that keeps
//! the klusterlet operator able to clean the managed cluster:
//!
//! - reachable cluster: delete own works except addon works and works whose
//!   postponed deletion window is still open, wait until the namespace is
//!   empty and no addon remains, then tear down the hosted works in stages
//!   across passes: other labelled works, the klusterlet work once those are
//!   gone, the kubeconfig work once the klusterlet work is gone
//! - unreachable cluster: delete every own work by force, then the hosted
//!   works, in one pass
//!
//! The finalizer comes off once nothing is left. Until then every pass asks
//! for a requeue.

use super::{ReconcileOutcome, Reconciler};
use crate::constants::{CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED, HOSTED_CLUSTER_LABEL, REASON_DETACHING, REASON_FORCE_DETACHING};
use crate::error::ControllerError;
use crate::helpers::{hosting_cluster_name, is_addon_work, is_deleting, needs_force_delete, postpone_deletion};
use crate::manifest::{hosted_klusterlet_work_name, hosted_kubeconfig_work_name};
use chrono::Utc;
use crds::{Condition, ConditionStatus, ManagedCluster, ManifestWork};
use hub_client::HubEvent;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Works that belong to one managed cluster
#[derive(Debug, Clone, Default)]
pub(crate) struct ClusterWorks {
    /// Works in the managed cluster namespace
    pub own: Vec<ManifestWork>,
    /// Works in the hosting cluster namespace labelled with the cluster name
    pub hosted: Vec<ManifestWork>,
}

impl ClusterWorks {
    pub fn total(&self) -> usize {
        self.own.len() + self.hosted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn has_hosted(&self, name: &str) -> bool {
        self.hosted.iter().any(|w| w.metadata.name.as_deref() == Some(name))
    }

    fn hosted_work(&self, name: &str) -> Option<&ManifestWork> {
        self.hosted.iter().find(|w| w.metadata.name.as_deref() == Some(name))
    }

    /// Hosted works other than the cluster's klusterlet and kubeconfig works
    fn other_hosted<'a>(&'a self, cluster: &str) -> impl Iterator<Item = &'a ManifestWork> + 'a {
        let klusterlet = hosted_klusterlet_work_name(cluster);
        let kubeconfig = hosted_kubeconfig_work_name(cluster);
        self.hosted.iter().filter(move |w| {
            let work_name = w.name_any();
            work_name != klusterlet && work_name != kubeconfig
        })
    }

    /// Every hosted work, klusterlet and kubeconfig works last
    fn hosted_in_order(&self, cluster: &str) -> Vec<&ManifestWork> {
        self.other_hosted(cluster)
            .chain(self.hosted_work(&hosted_klusterlet_work_name(cluster)))
            .chain(self.hosted_work(&hosted_kubeconfig_work_name(cluster)))
            .collect()
    }

    /// Hosted works due on the reachable path. Each stage waits until the
    /// previous one is gone, works still finalizing included.
    fn hosted_stage(&self, cluster: &str) -> Vec<&ManifestWork> {
        let others: Vec<_> = self.other_hosted(cluster).collect();
        if !others.is_empty() {
            return others;
        }
        self.hosted_work(&hosted_klusterlet_work_name(cluster))
            .or_else(|| self.hosted_work(&hosted_kubeconfig_work_name(cluster)))
            .into_iter()
            .collect()
    }
}

impl Reconciler {
    /// List the cluster's own works and its hosted works on the hosting cluster
    pub(crate) async fn list_cluster_works(&self, cluster: &ManagedCluster) -> Result<ClusterWorks, ControllerError> {
        let name = cluster.name_any();
        let own = self.hub.list_manifest_works(&name, None).await?;
        let hosted = match hosting_cluster_name(cluster) {
            Some(hosting) => {
                let selector = format!("{HOSTED_CLUSTER_LABEL}={name}");
                self.hub.list_manifest_works(hosting, Some(&selector)).await?
            }
            None => Vec::new(),
        };
        Ok(ClusterWorks { own, hosted })
    }

    pub(crate) async fn reconcile_deletion(
        &self,
        cluster: &ManagedCluster,
        works: &ClusterWorks,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let name = cluster.name_any();
        if works.is_empty() {
            debug!("ManagedCluster {} is deleting with no manifest works left", name);
            return Ok(ReconcileOutcome::Done);
        }

        if needs_force_delete(cluster, Utc::now(), self.config.unknown_availability_timeout) {
            self.force_delete(cluster, works).await?;
        } else {
            self.delete_gracefully(cluster, works).await?;
        }

        let remaining = self.list_cluster_works(cluster).await?;
        self.sync_finalizer(cluster, remaining.total()).await?;
        if remaining.is_empty() {
            return Ok(ReconcileOutcome::Done);
        }
        debug!(
            "ManagedCluster {} still has {} manifest works, requeue in {:?}",
            name,
            remaining.total(),
            self.config.deletion_requeue_interval
        );
        Ok(ReconcileOutcome::RequeueAfter(self.config.deletion_requeue_interval))
    }

    async fn force_delete(&self, cluster: &ManagedCluster, works: &ClusterWorks) -> Result<(), ControllerError> {
        let name = cluster.name_any();
        warn!("ManagedCluster {} is unavailable, force deleting {} manifest works", name, works.own.len());
        self.set_conditions(cluster, &[Condition::new(
            CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED,
            ConditionStatus::False,
            REASON_FORCE_DETACHING,
            "The managed cluster is being detached by force",
        )])
        .await?;

        for work in &works.own {
            self.force_delete_manifest_work(&name, &work.name_any()).await?;
        }
        self.delete_hosted_works(works.hosted_in_order(&name)).await?;

        self.publish(cluster, HubEvent::warning(
            "ManifestWorksForceDeleted",
            "Delete",
            format!("The managed cluster {name} is unavailable, its manifest works are force deleted"),
        ))
        .await;
        Ok(())
    }

    /// Delete a work and clear whatever finalizers keep it around
    async fn force_delete_manifest_work(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        self.hub.delete_manifest_work(namespace, name).await?;
        let Some(work) = self.hub.get_manifest_work(namespace, name).await? else {
            return Ok(());
        };
        if work.finalizers().is_empty() {
            return Ok(());
        }
        self.hub.remove_manifest_work_finalizers(namespace, name).await?;
        debug!("Removed finalizers of ManifestWork {}/{}", namespace, name);
        Ok(())
    }

    /// Reachable path. Hosted works are only touched once the cluster
    /// namespace is clear.
    async fn delete_gracefully(&self, cluster: &ManagedCluster, works: &ClusterWorks) -> Result<(), ControllerError> {
        let name = cluster.name_any();
        self.set_conditions(cluster, &[Condition::new(
            CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED,
            ConditionStatus::False,
            REASON_DETACHING,
            "The managed cluster is being detached now",
        )])
        .await?;

        let now = Utc::now();
        let mut deleted = Vec::new();
        for work in &works.own {
            let work_name = work.name_any();
            if is_addon_work(work, &name) || is_deleting(&work.metadata) {
                continue;
            }
            if postpone_deletion(work, cluster, now, self.config.postpone_delete_window) {
                debug!("Postponing deletion of ManifestWork {}/{}", name, work_name);
                continue;
            }
            self.hub.delete_manifest_work(&name, &work_name).await?;
            deleted.push(work_name);
        }
        if !deleted.is_empty() {
            info!("Deleted manifest works {:?} of ManagedCluster {}", deleted, name);
            self.publish(cluster, HubEvent::normal(
                "ManifestWorksDeleted",
                "Delete",
                format!("The manifest works {} of managed cluster {name} are deleted", deleted.join(", ")),
            ))
            .await;
        }

        if !self.no_pending_manifest_works(&name).await? {
            debug!("ManagedCluster {} still has manifest works or addons pending deletion", name);
            return Ok(());
        }

        self.delete_hosted_works(works.hosted_stage(&name)).await
    }

    /// Whether the cluster namespace holds no works and no addons
    async fn no_pending_manifest_works(&self, namespace: &str) -> Result<bool, ControllerError> {
        let works = self.hub.list_manifest_works(namespace, None).await?;
        if !works.is_empty() {
            return Ok(false);
        }
        let addons = self.hub.list_managed_cluster_addons(namespace).await?;
        Ok(addons.is_empty())
    }

    async fn delete_hosted_works(&self, works: Vec<&ManifestWork>) -> Result<(), ControllerError> {
        for work in works {
            if is_deleting(&work.metadata) {
                continue;
            }
            let namespace = work.namespace().unwrap_or_default();
            self.hub.delete_manifest_work(&namespace, &work.name_any()).await?;
            info!("Deleted hosted ManifestWork {}/{}", namespace, work.name_any());
        }
        Ok(())
    }
}
