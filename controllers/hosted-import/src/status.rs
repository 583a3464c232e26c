//! ManagedCluster writes with optimistic concurrency.
//!
//! Every finalizer or condition change goes through [`update_cluster_with_retry`],
//! which re-reads the cluster before each attempt so a mutation is never applied
//! to a stale copy.

use crate::error::ControllerError;
use crds::{Condition, ManagedCluster, ManagedClusterStatus, set_condition};
use hub_client::HubClientTrait;
use tracing::debug;

/// Which part of the ManagedCluster a mutation writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTarget {
    /// `status` subresource
    Status,
    /// `metadata.finalizers`
    Finalizers,
}

/// Read-modify-write a ManagedCluster, retrying on conflict.
///
/// `mutate` returns whether it changed anything; when it does not, no write is
/// issued. Returns `Ok(false)` when nothing was written, including when the
/// cluster no longer exists.
pub async fn update_cluster_with_retry<F>(
    hub: &dyn HubClientTrait,
    name: &str,
    target: UpdateTarget,
    retries: u32,
    mut mutate: F,
) -> Result<bool, ControllerError>
where
    F: FnMut(&mut ManagedCluster) -> bool + Send,
{
    let mut attempt = 0;
    loop {
        let Some(mut cluster) = hub.get_managed_cluster(name).await? else {
            return Ok(false);
        };
        if !mutate(&mut cluster) {
            return Ok(false);
        }

        let result = match target {
            UpdateTarget::Status => hub.update_managed_cluster_status(&cluster).await,
            UpdateTarget::Finalizers => hub.update_managed_cluster_finalizers(&cluster).await,
        };
        match result {
            Ok(_) => return Ok(true),
            Err(e) if e.is_conflict() && attempt < retries => {
                attempt += 1;
                debug!("Conflict writing {:?} of ManagedCluster {} (attempt {}), retrying", target, name, attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Apply `conditions` to a cluster's status. Returns the conditions that changed.
pub fn merge_conditions(cluster: &mut ManagedCluster, conditions: &[Condition]) -> Vec<Condition> {
    let status = cluster.status.get_or_insert_with(ManagedClusterStatus::default);
    conditions
        .iter()
        .filter(|c| set_condition(&mut status.conditions, (*c).clone()))
        .cloned()
        .collect()
}
