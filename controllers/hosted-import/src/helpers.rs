//! Availability and finalizer helpers.
//!
//! Predicates over ManagedCluster, ManifestWork and Secret state. Everything
//! here is synchronous and side-effect free; writes happen in the reconciler.

use crate::constants::{
    AUTO_IMPORT_RETRY_ANNOTATION, HOSTING_CLUSTER_NAME_ANNOTATION, IMPORT_SECRET_NAME_SUFFIX, IMPORT_YAML_KEY,
    KEEPING_AUTO_IMPORT_SECRET_ANNOTATION, KLUSTERLET_ADDON_WORK_SUFFIX, KLUSTERLET_DEPLOY_MODE_ANNOTATION,
    KUBECONFIG_KEY, OPERATOR_GROUP, POSTPONE_DELETION_ANNOTATION, READY_TO_APPLY_STATUS_FEEDBACK, SERVER_KEY,
    TOKEN_KEY,
};
use crate::manifest::{ManifestError, hosted_klusterlet_name, kubeconfig_from_token};
use chrono::{DateTime, Utc};
use crds::{
    ConditionStatus, MANAGED_CLUSTER_CONDITION_AVAILABLE, ManagedCluster, ManifestWork, WORK_AVAILABLE,
    find_condition, is_condition_false, is_condition_true,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::time::Duration;

/// Klusterlet deploy mode selected on a ManagedCluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployMode {
    /// Agent runs on the managed cluster itself
    Default,
    /// Agent runs on a separate hosting cluster
    Hosted,
    /// Annotation value this controller does not know
    Unknown(String),
}

/// Deploy mode from the klusterlet-deploy-mode annotation, case-insensitive
#[must_use]
pub fn deploy_mode(cluster: &ManagedCluster) -> DeployMode {
    match annotation(&cluster.metadata, KLUSTERLET_DEPLOY_MODE_ANNOTATION) {
        None | Some("") => DeployMode::Default,
        Some(mode) if mode.eq_ignore_ascii_case("default") => DeployMode::Default,
        Some(mode) if mode.eq_ignore_ascii_case("hosted") => DeployMode::Hosted,
        Some(other) => DeployMode::Unknown(other.to_string()),
    }
}

/// Hosting cluster named by the annotation, if set and non-empty
#[must_use]
pub fn hosting_cluster_name(cluster: &ManagedCluster) -> Option<&str> {
    annotation(&cluster.metadata, HOSTING_CLUSTER_NAME_ANNOTATION)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

pub(crate) fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations.as_ref()?.get(key).map(String::as_str)
}

pub(crate) fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

#[must_use]
pub fn is_deleting(meta: &ObjectMeta) -> bool {
    meta.deletion_timestamp.is_some()
}

/// Convert an API timestamp into chrono
pub(crate) fn to_utc(time: &Time) -> Option<DateTime<Utc>> {
    let raw = serde_json::to_value(time).ok()?;
    DateTime::parse_from_rfc3339(raw.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Whether the cluster is known to be unreachable.
///
/// Only an explicit `Available=False` counts. `Unknown` or a missing
/// condition is treated as reachable.
#[must_use]
pub fn is_unavailable(cluster: &ManagedCluster) -> bool {
    is_condition_false(cluster.conditions(), MANAGED_CLUSTER_CONDITION_AVAILABLE)
}

/// Whether a deleting cluster's works should be force-deleted.
///
/// True when the cluster is unavailable, or when it has been deleting for
/// longer than `unknown_timeout` without reporting `Available=True`.
#[must_use]
pub fn needs_force_delete(cluster: &ManagedCluster, now: DateTime<Utc>, unknown_timeout: Option<Duration>) -> bool {
    if is_unavailable(cluster) {
        return true;
    }
    let Some(timeout) = unknown_timeout else {
        return false;
    };
    if is_condition_true(cluster.conditions(), MANAGED_CLUSTER_CONDITION_AVAILABLE) {
        return false;
    }
    let Some(deleted_at) = cluster.metadata.deletion_timestamp.as_ref().and_then(to_utc) else {
        return false;
    };
    now.signed_duration_since(deleted_at)
        .to_std()
        .is_ok_and(|elapsed| elapsed >= timeout)
}

/// Whether a work asked to outlive its deleting cluster and that window is
/// still open at `now`.
#[must_use]
pub fn postpone_deletion(work: &ManifestWork, cluster: &ManagedCluster, now: DateTime<Utc>, window: Duration) -> bool {
    if annotation(&work.metadata, POSTPONE_DELETION_ANNOTATION).is_none() {
        return false;
    }
    let Some(deleted_at) = cluster.metadata.deletion_timestamp.as_ref().and_then(to_utc) else {
        return false;
    };
    now.signed_duration_since(deleted_at)
        .to_std()
        .map_or(true, |elapsed| elapsed < window)
}

#[must_use]
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Append `finalizer` if absent. Returns whether the list changed.
pub fn ensure_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Drop `finalizer`, keeping every other entry. Returns whether the list changed.
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
}

/// Whether the work agent reports the work as Available
#[must_use]
pub fn is_work_available(work: &ManifestWork) -> bool {
    find_condition(work.conditions(), WORK_AVAILABLE).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Whether the hosted Klusterlet reports `ReadyToApply=True` through work feedback
#[must_use]
pub fn klusterlet_ready_to_apply(work: &ManifestWork, cluster: &str) -> bool {
    let klusterlet = hosted_klusterlet_name(cluster);
    work.manifest_conditions()
        .iter()
        .filter(|m| {
            m.resource_meta.group == OPERATOR_GROUP
                && (m.resource_meta.kind == "Klusterlet" || m.resource_meta.resource == "klusterlets")
                && m.resource_meta.name == klusterlet
        })
        .flat_map(|m| m.status_feedbacks.values.iter())
        .filter(|v| v.name == READY_TO_APPLY_STATUS_FEEDBACK)
        .any(|v| {
            v.field_value.string.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("true"))
                || v.field_value.boolean == Some(true)
        })
}

/// Whether the work is owned by the addon lifecycle, not by import
#[must_use]
pub fn is_addon_work(work: &ManifestWork, cluster_namespace: &str) -> bool {
    let prefix = format!("{cluster_namespace}-{KLUSTERLET_ADDON_WORK_SUFFIX}");
    work.metadata.name.as_deref().is_some_and(|n| n.starts_with(&prefix))
}

/// `{cluster}-import`
#[must_use]
pub fn import_secret_name(cluster: &str) -> String {
    format!("{cluster}-{IMPORT_SECRET_NAME_SUFFIX}")
}

fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.as_slice())
        .filter(|v| !v.is_empty())
}

/// Check the import secret carries a non-empty import payload
pub fn validate_import_secret(secret: &Secret) -> Result<&[u8], String> {
    secret_value(secret, IMPORT_YAML_KEY).ok_or_else(|| format!("the {IMPORT_YAML_KEY} is required"))
}

/// Kubeconfig supplied by an auto-import secret.
///
/// Uses the `kubeconfig` key, or renders one from `token` and `server`.
/// Returns an empty buffer when neither is present.
pub fn auto_import_kubeconfig(secret: &Secret) -> Result<Vec<u8>, ManifestError> {
    if let Some(kubeconfig) = secret_value(secret, KUBECONFIG_KEY) {
        return Ok(kubeconfig.to_vec());
    }
    match (secret_value(secret, TOKEN_KEY), secret_value(secret, SERVER_KEY)) {
        (Some(token), Some(server)) => {
            let token = String::from_utf8_lossy(token);
            let server = String::from_utf8_lossy(server);
            Ok(kubeconfig_from_token(server.trim(), token.trim())?.into_bytes())
        }
        _ => Ok(Vec::new()),
    }
}

/// Whether the auto-import secret asks to be kept after a successful import
#[must_use]
pub fn keep_auto_import_secret(secret: &Secret) -> bool {
    secret
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(KEEPING_AUTO_IMPORT_SECRET_ANNOTATION))
}

/// Bump the auto-import retry annotation. Missing or unparsable values restart at zero.
pub fn increment_auto_import_retry(secret: &mut Secret) -> u32 {
    let annotations = secret.metadata.annotations.get_or_insert_with(Default::default);
    let next = annotations
        .get(AUTO_IMPORT_RETRY_ANNOTATION)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0)
        .saturating_add(1);
    annotations.insert(AUTO_IMPORT_RETRY_ANNOTATION.to_string(), next.to_string());
    next
}
