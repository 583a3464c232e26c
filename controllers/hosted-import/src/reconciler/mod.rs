//! Reconciliation of hosted-mode ManagedClusters.
//!
//! One pass per cluster name, always starting from a fresh read:
//!
//! 1. skip clusters that are gone or not in hosted mode
//! 2. keep the manifestwork-cleanup finalizer in line with the works that exist
//! 3. deleting clusters go to the deletion orchestrator (`deletion`)
//! 4. otherwise walk the import flow: hosting cluster, import secret,
//!    klusterlet work, auto-import secret, kubeconfig work
//!
//! Waiting states of the import flow are recorded as conditions and return
//! [`ReconcileOutcome::Done`]; the watches on secrets and works bring the
//! cluster back when something changes. A deletion that is not finished asks
//! for a timed requeue instead, since addons and postponed works do not feed
//! any watched stream.

mod deletion;


pub(crate) use deletion::ClusterWorks;

use crate::backoff::BackoffTracker;
use crate::config::ControllerConfig;
use crate::constants::{
    AUTO_IMPORT_SECRET_NAME, CONDITION_EXTERNAL_MANAGED_KUBECONFIG_CREATED_SUCCEEDED,
    CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED, MANIFEST_WORK_FINALIZER, REASON_DETACHING, REASON_FORCE_DETACHING,
    REASON_IMPORTED, REASON_IMPORTING, REASON_IMPORT_FAILED, REASON_KUBECONFIG_CREATED,
    REASON_KUBECONFIG_NOT_CREATED, REASON_WAIT_FOR_IMPORTING,
};
use crate::error::ControllerError;
use crate::helpers::{
    DeployMode, auto_import_kubeconfig, deploy_mode, ensure_finalizer, has_finalizer, hosting_cluster_name,
    import_secret_name, increment_auto_import_retry, is_deleting, is_work_available, keep_auto_import_secret,
    klusterlet_ready_to_apply, remove_finalizer, validate_import_secret,
};
use crate::manifest::{
    ManifestCodec, build_klusterlet_work, build_kubeconfig_work, hosted_kubeconfig_work_name, work_matches,
};
use crate::status::{UpdateTarget, merge_conditions, update_cluster_with_retry};
use crds::{Condition, ConditionStatus, ManagedCluster, ManifestWork, find_condition};
use hub_client::{HubClientTrait, HubEvent};
use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the runtime should do with a cluster after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Wait for the next watch event
    Done,
    /// Run again after the interval
    RequeueAfter(Duration),
}

/// Reconciles hosted-mode ManagedClusters against the hub.
pub struct Reconciler {
    pub(crate) hub: Box<dyn HubClientTrait + Send + Sync>,
    pub(crate) codec: ManifestCodec,
    pub(crate) config: ControllerConfig,
    backoff: BackoffTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn import_condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED, status, reason, message)
}

fn kubeconfig_condition(status: ConditionStatus, reason: &str, message: impl Into<String>) -> Condition {
    Condition::new(CONDITION_EXTERNAL_MANAGED_KUBECONFIG_CREATED_SUCCEEDED, status, reason, message)
}

/// Event for a condition change worth surfacing, `None` for routine waiting states
fn condition_event(condition: &Condition) -> Option<HubEvent> {
    match condition.reason.as_str() {
        REASON_IMPORTED | REASON_DETACHING | REASON_FORCE_DETACHING => Some(HubEvent::normal(
            condition.reason.as_str(),
            "Reconcile",
            condition.message.as_str(),
        )),
        REASON_IMPORT_FAILED | REASON_KUBECONFIG_NOT_CREATED => Some(HubEvent::warning(
            condition.reason.as_str(),
            "Reconcile",
            condition.message.as_str(),
        )),
        _ => None,
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(hub: impl HubClientTrait + Send + Sync + 'static, codec: ManifestCodec, config: ControllerConfig) -> Self {
        let backoff = BackoffTracker::new(config.backoff_min_seconds, config.backoff_max_seconds);
        Self {
            hub: Box::new(hub),
            codec,
            config,
            backoff,
        }
    }

    /// Per-cluster requeue backoff
    pub fn backoff(&self) -> &BackoffTracker {
        &self.backoff
    }

    /// Run one reconcile pass for the named ManagedCluster.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let Some(cluster) = self.hub.get_managed_cluster(name).await? else {
            debug!("ManagedCluster {} not found, nothing to do", name);
            return Ok(ReconcileOutcome::Done);
        };
        if deploy_mode(&cluster) != DeployMode::Hosted {
            debug!("ManagedCluster {} is not in hosted mode, skipping", name);
            return Ok(ReconcileOutcome::Done);
        }

        debug!("Reconciling hosted ManagedCluster {}", name);

        let works = self.list_cluster_works(&cluster).await?;
        self.sync_finalizer(&cluster, works.total()).await?;

        if is_deleting(&cluster.metadata) {
            return self.reconcile_deletion(&cluster, &works).await;
        }

        self.import_cluster(&cluster, &works).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn import_cluster(&self, cluster: &ManagedCluster, works: &ClusterWorks) -> Result<(), ControllerError> {
        let name = cluster.name_any();

        let Some(hosting) = hosting_cluster_name(cluster) else {
            return self
                .set_conditions(cluster, &[import_condition(
                    ConditionStatus::False,
                    REASON_IMPORT_FAILED,
                    "Waiting for the user to specify the hosting cluster",
                )])
                .await;
        };

        match self.hub.get_managed_cluster(hosting).await? {
            None => {
                return self
                    .set_conditions(cluster, &[import_condition(
                        ConditionStatus::False,
                        REASON_IMPORT_FAILED,
                        "Hosting cluster is not a managed cluster of the hub",
                    )])
                    .await;
            }
            Some(hosting_cluster) if is_deleting(&hosting_cluster.metadata) => {
                return self
                    .set_conditions(cluster, &[import_condition(
                        ConditionStatus::False,
                        REASON_IMPORT_FAILED,
                        format!("The hosting cluster {hosting} is being deleted"),
                    )])
                    .await;
            }
            Some(_) => {}
        }

        let Some(import_secret) = self.hub.get_secret(&name, &import_secret_name(&name)).await? else {
            return self
                .set_conditions(cluster, &[import_condition(
                    ConditionStatus::False,
                    REASON_WAIT_FOR_IMPORTING,
                    "Wait for import secret to be created",
                )])
                .await;
        };

        let payload = match validate_import_secret(&import_secret) {
            Ok(payload) => payload,
            Err(reason) => {
                return self
                    .set_conditions(cluster, &[import_condition(
                        ConditionStatus::False,
                        REASON_IMPORT_FAILED,
                        format!("Import secret is invalid, error: {reason}"),
                    )])
                    .await;
            }
        };

        let desired = match build_klusterlet_work(&self.codec, &name, hosting, payload) {
            Ok(work) => work,
            Err(e) => {
                let message = format!("Import secret is invalid, error: {e}");
                return Err(self
                    .fail_with(cluster, import_condition(ConditionStatus::False, REASON_IMPORT_FAILED, message), e.into())
                    .await);
            }
        };

        let klusterlet_work = match self.apply_manifest_work(cluster, desired).await {
            Ok(work) => work,
            Err(e) => {
                let message = format!("Apply importing resources to the hosting cluster failed, error: {e}");
                return Err(self
                    .fail_with(cluster, import_condition(ConditionStatus::False, REASON_IMPORTING, message), e)
                    .await);
            }
        };
        // The klusterlet work exists now even if the earlier listing was empty
        self.sync_finalizer(cluster, 1).await?;

        let ready = klusterlet_ready_to_apply(&klusterlet_work, &name);

        let Some(auto_import_secret) = self.hub.get_secret(&name, AUTO_IMPORT_SECRET_NAME).await? else {
            let condition = if ready {
                import_condition(ConditionStatus::True, REASON_IMPORTED, "Import succeeded")
            } else if works.has_hosted(&hosted_kubeconfig_work_name(&name)) {
                import_condition(
                    ConditionStatus::False,
                    REASON_IMPORTING,
                    "Wait for the klusterlet to apply the external managed kubeconfig",
                )
            } else {
                import_condition(
                    ConditionStatus::False,
                    REASON_IMPORTING,
                    "Wait for the user to provide the external managed kubeconfig",
                )
            };
            return self.set_conditions(cluster, &[condition]).await;
        };

        if !is_work_available(&klusterlet_work) {
            return self
                .set_conditions(cluster, &[import_condition(
                    ConditionStatus::False,
                    REASON_IMPORTING,
                    "Wait for importing resources to be available on the hosting cluster",
                )])
                .await;
        }

        let kubeconfig_work = match auto_import_kubeconfig(&auto_import_secret)
            .and_then(|kubeconfig| build_kubeconfig_work(&name, hosting, &kubeconfig))
        {
            Ok(work) => work,
            Err(e) => {
                let message = format!("Build external managed kubeconfig manifest work failed, error: {e}");
                return Err(self
                    .fail_with(cluster, import_condition(ConditionStatus::False, REASON_IMPORT_FAILED, message), e.into())
                    .await);
            }
        };

        if let Err(apply_err) = self.apply_manifest_work(cluster, kubeconfig_work).await {
            warn!("Failed to apply external managed kubeconfig for {}: {}", name, apply_err);
            let mut follow_up = Vec::new();
            if let Err(e) = self
                .set_conditions(cluster, &[kubeconfig_condition(
                    ConditionStatus::False,
                    REASON_KUBECONFIG_NOT_CREATED,
                    format!("Apply external managed kubeconfig to the hosting cluster failed, error: {apply_err}"),
                )])
                .await
            {
                follow_up.push(e);
            }
            if let Err(e) = self.bump_auto_import_retry(auto_import_secret).await {
                follow_up.push(e);
            }
            return Err(ControllerError::aggregate(apply_err, follow_up));
        }

        let import = if ready {
            import_condition(ConditionStatus::True, REASON_IMPORTED, "Import succeeded")
        } else {
            import_condition(
                ConditionStatus::False,
                REASON_IMPORTING,
                "Wait for the klusterlet to apply the external managed kubeconfig",
            )
        };
        self.set_conditions(cluster, &[
            kubeconfig_condition(
                ConditionStatus::True,
                REASON_KUBECONFIG_CREATED,
                "The external managed kubeconfig is applied to the hosting cluster",
            ),
            import,
        ])
        .await?;

        if keep_auto_import_secret(&auto_import_secret) {
            debug!("Keeping auto-import secret of {} as requested", name);
            return Ok(());
        }
        self.hub.delete_secret(&name, AUTO_IMPORT_SECRET_NAME).await?;
        info!("Deleted auto-import secret {}/{}", name, AUTO_IMPORT_SECRET_NAME);
        self.publish(cluster, HubEvent::normal(
            "AutoImportSecretDeleted",
            "Reconcile",
            format!("The managed cluster {name} is imported, delete its auto-import secret"),
        ))
        .await;
        Ok(())
    }

    /// Keep the manifestwork-cleanup finalizer iff the cluster has works.
    ///
    /// Never added while the cluster is deleting.
    pub(crate) async fn sync_finalizer(&self, cluster: &ManagedCluster, works: usize) -> Result<(), ControllerError> {
        let name = cluster.name_any();
        let present = has_finalizer(&cluster.metadata, MANIFEST_WORK_FINALIZER);

        if works == 0 {
            if !present {
                return Ok(());
            }
            let removed = update_cluster_with_retry(
                self.hub.as_ref(),
                &name,
                UpdateTarget::Finalizers,
                self.config.status_update_retries,
                |c| remove_finalizer(&mut c.metadata, MANIFEST_WORK_FINALIZER),
            )
            .await?;
            if removed {
                info!("Removed manifestwork finalizer from ManagedCluster {}", name);
                self.publish(cluster, HubEvent::normal(
                    "ManagedClusterFinalizerRemoved",
                    "Reconcile",
                    format!("The managed cluster {name} manifestwork finalizer is removed"),
                ))
                .await;
            }
            return Ok(());
        }

        if present || is_deleting(&cluster.metadata) {
            return Ok(());
        }
        let added = update_cluster_with_retry(
            self.hub.as_ref(),
            &name,
            UpdateTarget::Finalizers,
            self.config.status_update_retries,
            |c| !is_deleting(&c.metadata) && ensure_finalizer(&mut c.metadata, MANIFEST_WORK_FINALIZER),
        )
        .await?;
        if added {
            info!("Added manifestwork finalizer to ManagedCluster {}", name);
            self.publish(cluster, HubEvent::normal(
                "ManagedClusterFinalizerAdded",
                "Reconcile",
                format!("The managed cluster {name} manifestwork finalizer is added"),
            ))
            .await;
        }
        Ok(())
    }

    /// Write conditions to the cluster status, skipping the write when nothing changes
    pub(crate) async fn set_conditions(&self, cluster: &ManagedCluster, conditions: &[Condition]) -> Result<(), ControllerError> {
        let up_to_date = conditions.iter().all(|wanted| {
            find_condition(cluster.conditions(), &wanted.type_).is_some_and(|have| have.same_state(wanted))
        });
        if up_to_date {
            return Ok(());
        }

        let name = cluster.name_any();
        let mut changed = Vec::new();
        update_cluster_with_retry(
            self.hub.as_ref(),
            &name,
            UpdateTarget::Status,
            self.config.status_update_retries,
            |c| {
                changed = merge_conditions(c, conditions);
                !changed.is_empty()
            },
        )
        .await?;

        for condition in &changed {
            info!(
                "ManagedCluster {} condition {}={} ({}): {}",
                name,
                condition.type_,
                condition.status.as_str(),
                condition.reason,
                condition.message
            );
            if let Some(event) = condition_event(condition) {
                self.publish(cluster, event).await;
            }
        }
        Ok(())
    }

    /// Record a failure condition and return `err`, with any status write error attached
    async fn fail_with(&self, cluster: &ManagedCluster, condition: Condition, err: ControllerError) -> ControllerError {
        match self.set_conditions(cluster, &[condition]).await {
            Ok(()) => err,
            Err(status_err) => ControllerError::aggregate(err, vec![status_err]),
        }
    }

    /// Create the work, or replace it when its spec or our metadata drifted
    pub(crate) async fn apply_manifest_work(&self, cluster: &ManagedCluster, desired: ManifestWork) -> Result<ManifestWork, ControllerError> {
        let namespace = desired.metadata.namespace.clone().unwrap_or_default();
        let work_name = desired.name_any();

        let Some(existing) = self.hub.get_manifest_work(&namespace, &work_name).await? else {
            let created = self.hub.create_manifest_work(&desired).await?;
            info!("Created ManifestWork {}/{}", namespace, work_name);
            self.publish(cluster, HubEvent::normal(
                "ManifestWorkCreated",
                "Reconcile",
                format!("The manifest work {namespace}/{work_name} is created"),
            ))
            .await;
            return Ok(created);
        };

        if work_matches(&existing, &desired) {
            debug!("ManifestWork {}/{} is up to date", namespace, work_name);
            return Ok(existing);
        }

        let mut updated = existing;
        updated.spec = desired.spec;
        if let Some(labels) = desired.metadata.labels {
            updated.metadata.labels.get_or_insert_with(Default::default).extend(labels);
        }
        if let Some(annotations) = desired.metadata.annotations {
            updated.metadata.annotations.get_or_insert_with(Default::default).extend(annotations);
        }
        let stored = self.hub.replace_manifest_work(&updated).await?;
        info!("Updated ManifestWork {}/{}", namespace, work_name);
        self.publish(cluster, HubEvent::normal(
            "ManifestWorkUpdated",
            "Reconcile",
            format!("The manifest work {namespace}/{work_name} is updated"),
        ))
        .await;
        Ok(stored)
    }

    async fn bump_auto_import_retry(&self, mut secret: Secret) -> Result<(), ControllerError> {
        let attempt = increment_auto_import_retry(&mut secret);
        self.hub.replace_secret(&secret).await?;
        debug!(
            "Auto-import retry of {} is now {}",
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            attempt
        );
        Ok(())
    }

    pub(crate) async fn publish(&self, cluster: &ManagedCluster, event: HubEvent) {
        self.hub.publish_event(&cluster.object_ref(&()), event).await;
    }
}
