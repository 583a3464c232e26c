//! Test utilities for unit testing the reconciler
//!
//! Builders for hub objects in the shapes the import stack produces them.

use crate::config::ControllerConfig;
use crate::constants::{
    AUTO_IMPORT_SECRET_NAME, HOSTING_CLUSTER_NAME_ANNOTATION, IMPORT_SECRET_LABEL, IMPORT_YAML_KEY,
    KEEPING_AUTO_IMPORT_SECRET_ANNOTATION, KLUSTERLET_DEPLOY_MODE_ANNOTATION, KUBECONFIG_KEY, OPERATOR_GROUP,
    READY_TO_APPLY_STATUS_FEEDBACK,
};
use crate::helpers::import_secret_name;
use crate::manifest::{ManifestCodec, hosted_klusterlet_name};
use crate::reconciler::Reconciler;
use chrono::{DateTime, SecondsFormat, Utc};
use crds::{
    Condition, ConditionStatus, FeedbackValue, FieldValue, MANAGED_CLUSTER_CONDITION_AVAILABLE, ManagedCluster,
    ManagedClusterAddOn, ManagedClusterAddOnSpec, ManagedClusterSpec, ManagedClusterStatus, ManifestCondition,
    ManifestResourceMeta, ManifestResourceStatus, ManifestWork, ManifestWorkSpec, ManifestWorkStatus,
    StatusFeedbackResult, WORK_AVAILABLE,
};
use hub_client::MockHubClient;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;

/// Import payload as the import secret generator renders it
pub const TEST_IMPORT_YAML: &str = r"---
apiVersion: v1
kind: Namespace
metadata:
  name: klusterlet-test
---
apiVersion: operator.open-cluster-management.io/v1
kind: Klusterlet
metadata:
  name: klusterlet-test
spec:
  deployOption:
    mode: Hosted
  clusterName: test
---
apiVersion: v1
kind: Secret
metadata:
  name: bootstrap-hub-kubeconfig
  namespace: klusterlet-test
type: Opaque
data:
  kubeconfig: dGVzdAo=
";

pub const TEST_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

/// Convert a chrono timestamp into an API timestamp
pub fn to_time(at: DateTime<Utc>) -> Time {
    serde_json::from_value(serde_json::Value::String(at.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .expect("RFC 3339 timestamp")
}

/// ManagedCluster; hosted mode when `hosting` is given
pub fn create_test_managed_cluster(name: &str, hosting: Option<&str>) -> ManagedCluster {
    let annotations = hosting.map(|hosting| {
        BTreeMap::from([
            (KLUSTERLET_DEPLOY_MODE_ANNOTATION.to_string(), "Hosted".to_string()),
            (HOSTING_CLUSTER_NAME_ANNOTATION.to_string(), hosting.to_string()),
        ])
    });
    ManagedCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations,
            ..Default::default()
        },
        spec: ManagedClusterSpec {
            hub_accepts_client: true,
            lease_duration_seconds: Some(60),
        },
        status: None,
    }
}

/// Set the registration agent's Available condition
pub fn with_available(mut cluster: ManagedCluster, status: ConditionStatus) -> ManagedCluster {
    let reason = match status {
        ConditionStatus::True => "ManagedClusterAvailable",
        ConditionStatus::False => "ManagedClusterLeaseUpdateStopped",
        ConditionStatus::Unknown => "ManagedClusterLeaseUnknown",
    };
    cluster
        .status
        .get_or_insert_with(ManagedClusterStatus::default)
        .conditions
        .push(Condition::new(MANAGED_CLUSTER_CONDITION_AVAILABLE, status, reason, ""));
    cluster
}

/// Mark a cluster deleting since `at`. Adds a foreign finalizer so the
/// object outlives removal of the manifestwork finalizer.
pub fn deleting(mut cluster: ManagedCluster, at: DateTime<Utc>) -> ManagedCluster {
    cluster.metadata.deletion_timestamp = Some(to_time(at));
    cluster
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push("cluster.open-cluster-management.io/api-resource-cleanup".to_string());
    cluster
}

/// `{cluster}-import` secret carrying `payload` under import.yaml
pub fn create_test_import_secret(cluster: &str, payload: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(import_secret_name(cluster)),
            namespace: Some(cluster.to_string()),
            labels: Some(BTreeMap::from([(IMPORT_SECRET_LABEL.to_string(), "true".to_string())])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            IMPORT_YAML_KEY.to_string(),
            ByteString(payload.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// auto-import-secret carrying a kubeconfig
pub fn create_test_auto_import_secret(cluster: &str, kubeconfig: &str, keep: bool) -> Secret {
    let annotations = keep.then(|| BTreeMap::from([(KEEPING_AUTO_IMPORT_SECRET_ANNOTATION.to_string(), String::new())]));
    Secret {
        metadata: ObjectMeta {
            name: Some(AUTO_IMPORT_SECRET_NAME.to_string()),
            namespace: Some(cluster.to_string()),
            annotations,
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            KUBECONFIG_KEY.to_string(),
            ByteString(kubeconfig.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// Bare ManifestWork, optionally holding finalizers
pub fn create_test_manifest_work(namespace: &str, name: &str, finalizers: &[&str]) -> ManifestWork {
    ManifestWork {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            finalizers: (!finalizers.is_empty()).then(|| finalizers.iter().map(|f| (*f).to_string()).collect()),
            ..Default::default()
        },
        spec: ManifestWorkSpec::default(),
        status: None,
    }
}

/// Work status as the agent reports it for the hosted klusterlet work
pub fn create_test_work_status(cluster: &str, available: bool, ready_to_apply: bool) -> ManifestWorkStatus {
    let available = if available { ConditionStatus::True } else { ConditionStatus::False };
    let ready = if ready_to_apply { "True" } else { "False" };
    ManifestWorkStatus {
        conditions: vec![Condition::new(WORK_AVAILABLE, available, "ResourcesAvailable", "")],
        resource_status: Some(ManifestResourceStatus {
            manifests: vec![ManifestCondition {
                resource_meta: ManifestResourceMeta {
                    group: OPERATOR_GROUP.to_string(),
                    version: "v1".to_string(),
                    kind: "Klusterlet".to_string(),
                    resource: "klusterlets".to_string(),
                    name: hosted_klusterlet_name(cluster),
                    ..Default::default()
                },
                status_feedbacks: StatusFeedbackResult {
                    values: vec![FeedbackValue {
                        name: READY_TO_APPLY_STATUS_FEEDBACK.to_string(),
                        field_value: FieldValue {
                            type_: "String".to_string(),
                            string: Some(ready.to_string()),
                            ..Default::default()
                        },
                    }],
                },
                conditions: Vec::new(),
            }],
        }),
    }
}

pub fn create_test_addon(namespace: &str, name: &str) -> ManagedClusterAddOn {
    ManagedClusterAddOn {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: ManagedClusterAddOnSpec::default(),
    }
}

/// Reconciler backed by the given mock. The mock shares its stores across clones.
pub fn create_test_reconciler(hub: &MockHubClient) -> Reconciler {
    Reconciler::new(hub.clone(), ManifestCodec::new(), ControllerConfig::default())
}

/// Reconciler with a custom configuration
pub fn create_test_reconciler_with_config(hub: &MockHubClient, config: ControllerConfig) -> Reconciler {
    Reconciler::new(hub.clone(), ManifestCodec::new(), config)
}
