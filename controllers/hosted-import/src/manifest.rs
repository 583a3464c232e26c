//! Manifest Builder
//!
//! Pure functions producing the two hosted-mode ManifestWorks placed in the
//! hosting cluster namespace:
//!
//! - `{cluster}-hosted-klusterlet`: the import payload (Klusterlet CR, bootstrap
//!   secret, ...) with Foreground deletion and ReadyToApply feedback rules.
//! - `{cluster}-hosted-kubeconfig`: a single `external-managed-kubeconfig` Secret
//!   with Orphan deletion, since the klusterlet operator removes it itself after
//!   using it to clean the managed cluster.
//!
//! Decoding of YAML documents goes through an explicit [`ManifestCodec`] value
//! created at start-up and owned by the reconciler.

use crate::constants::{
    CLEANUP_PRIORITY_ANNOTATION, EXTERNAL_MANAGED_KUBECONFIG_SECRET, HOSTED_CLUSTER_LABEL,
    HOSTED_KLUSTERLET_WORK_SUFFIX, HOSTED_KUBECONFIG_WORK_SUFFIX, OPERATOR_GROUP,
    READY_TO_APPLY_STATUS_FEEDBACK,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crds::{
    DeleteOption, DeletePropagationPolicy, FeedbackRule, FeedbackRuleType, JsonPath, ManifestConfigOption,
    ManifestWork, ManifestWorkSpec, ManifestsTemplate, ResourceIdentifier,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors building hosted-mode works
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A document of the import payload is not a Kubernetes object
    #[error("invalid import payload, document {index}: {reason}")]
    InvalidPayload { index: usize, reason: String },

    /// No kubeconfig was supplied for the external managed kubeconfig
    #[error("the kubeconfig is required for hosted mode and must not be empty")]
    MissingKubeconfig,

    /// Rendering a manifest failed
    #[error("failed to render manifest: {0}")]
    Render(#[from] serde_yaml::Error),
}

/// Decoder for multi-document YAML manifest streams
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestCodec;

impl ManifestCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Split a stream on `---` separator lines, dropping blank and comment-only documents
    #[must_use]
    pub fn split_documents<'a>(&self, stream: &'a str) -> Vec<&'a str> {
        let mut documents = Vec::new();
        let mut start = 0;
        let mut offset = 0;
        for line in stream.split_inclusive('\n') {
            if is_separator(line) {
                documents.push(&stream[start..offset]);
                start = offset + line.len();
            }
            offset += line.len();
        }
        documents.push(&stream[start..]);
        documents.into_iter().filter(|doc| has_content(doc)).collect()
    }

    /// Convert one YAML document into a JSON object with `apiVersion` and `kind`
    pub fn decode_document(&self, document: &str) -> Result<Value, String> {
        let value: Value = serde_yaml::from_str(document).map_err(|e| e.to_string())?;
        let Some(object) = value.as_object() else {
            return Err("document is not a mapping".to_string());
        };
        for field in ["apiVersion", "kind"] {
            if object.get(field).and_then(Value::as_str).is_none_or(str::is_empty) {
                return Err(format!("document has no {field}"));
            }
        }
        Ok(value)
    }

    /// Decode every document of a payload, failing on the first malformed one
    pub fn decode_payload(&self, payload: &[u8]) -> Result<Vec<Value>, ManifestError> {
        let text = std::str::from_utf8(payload).map_err(|e| ManifestError::InvalidPayload {
            index: 0,
            reason: e.to_string(),
        })?;
        self.split_documents(text)
            .into_iter()
            .enumerate()
            .map(|(index, doc)| {
                self.decode_document(doc)
                    .map_err(|reason| ManifestError::InvalidPayload { index, reason })
            })
            .collect()
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line.strip_prefix("---").is_some_and(|rest| rest.starts_with([' ', '\t', '#']))
}

fn has_content(document: &str) -> bool {
    document
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'))
}

/// `{cluster}-hosted-klusterlet`
#[must_use]
pub fn hosted_klusterlet_work_name(cluster: &str) -> String {
    format!("{cluster}-{HOSTED_KLUSTERLET_WORK_SUFFIX}")
}

/// `{cluster}-hosted-kubeconfig`
#[must_use]
pub fn hosted_kubeconfig_work_name(cluster: &str) -> String {
    format!("{cluster}-{HOSTED_KUBECONFIG_WORK_SUFFIX}")
}

/// Name of the hosted Klusterlet CR, also the agent namespace on the hosting cluster
#[must_use]
pub fn hosted_klusterlet_name(cluster: &str) -> String {
    format!("klusterlet-{cluster}")
}

fn hosted_work_meta(name: String, hosting_cluster: &str, cluster: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(hosting_cluster.to_string()),
        labels: Some(BTreeMap::from([(HOSTED_CLUSTER_LABEL.to_string(), cluster.to_string())])),
        ..Default::default()
    }
}

fn ready_to_apply_feedback(cluster: &str) -> ManifestConfigOption {
    let field = |suffix: &str, path: &str| JsonPath {
        name: format!("ReadyToApply-{suffix}"),
        path: format!(r#".status.conditions[?(@.type=="ReadyToApply")].{path}"#),
    };
    ManifestConfigOption {
        resource_identifier: ResourceIdentifier {
            group: OPERATOR_GROUP.to_string(),
            resource: "klusterlets".to_string(),
            name: hosted_klusterlet_name(cluster),
            namespace: String::new(),
        },
        feedback_rules: vec![FeedbackRule {
            type_: FeedbackRuleType::JSONPaths,
            json_paths: vec![
                field("reason", "reason"),
                JsonPath {
                    name: READY_TO_APPLY_STATUS_FEEDBACK.to_string(),
                    path: r#".status.conditions[?(@.type=="ReadyToApply")].status"#.to_string(),
                },
                field("message", "message"),
                field("lastTransitionTime", "lastTransitionTime"),
                field("observedGeneration", "observedGeneration"),
            ],
        }],
    }
}

/// Build the klusterlet work from the import payload.
///
/// `Namespace` documents are skipped: the agent namespace belongs to the
/// hosting cluster and must survive deletion of the work.
pub fn build_klusterlet_work(
    codec: &ManifestCodec,
    cluster: &str,
    hosting_cluster: &str,
    import_payload: &[u8],
) -> Result<ManifestWork, ManifestError> {
    let manifests: Vec<Value> = codec
        .decode_payload(import_payload)?
        .into_iter()
        .filter(|doc| doc.get("kind").and_then(Value::as_str) != Some("Namespace"))
        .collect();

    let mut metadata = hosted_work_meta(hosted_klusterlet_work_name(cluster), hosting_cluster, cluster);
    metadata.annotations = Some(BTreeMap::from([(
        CLEANUP_PRIORITY_ANNOTATION.to_string(),
        "100".to_string(),
    )]));

    Ok(ManifestWork {
        metadata,
        spec: ManifestWorkSpec {
            workload: ManifestsTemplate { manifests },
            delete_option: Some(DeleteOption {
                propagation_policy: DeletePropagationPolicy::Foreground,
            }),
            manifest_configs: vec![ready_to_apply_feedback(cluster)],
        },
        status: None,
    })
}

/// Build the external managed kubeconfig work.
///
/// Fails with [`ManifestError::MissingKubeconfig`] on an empty kubeconfig.
pub fn build_kubeconfig_work(
    cluster: &str,
    hosting_cluster: &str,
    kubeconfig: &[u8],
) -> Result<ManifestWork, ManifestError> {
    if kubeconfig.iter().all(u8::is_ascii_whitespace) {
        return Err(ManifestError::MissingKubeconfig);
    }

    let secret = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {
            "name": EXTERNAL_MANAGED_KUBECONFIG_SECRET,
            "namespace": hosted_klusterlet_name(cluster),
        },
        "data": {
            "kubeconfig": STANDARD.encode(kubeconfig),
        },
    });

    Ok(ManifestWork {
        metadata: hosted_work_meta(hosted_kubeconfig_work_name(cluster), hosting_cluster, cluster),
        spec: ManifestWorkSpec {
            workload: ManifestsTemplate { manifests: vec![secret] },
            delete_option: Some(DeleteOption {
                propagation_policy: DeletePropagationPolicy::Orphan,
            }),
            manifest_configs: Vec::new(),
        },
        status: None,
    })
}

/// Render a token-authenticated kubeconfig for an API server.
///
/// Auto-import secrets without a CA bundle skip TLS verification, as the
/// import flow has no other trust root for the target cluster.
pub fn kubeconfig_from_token(server: &str, token: &str) -> Result<String, ManifestError> {
    let config = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": "default-cluster",
            "cluster": { "server": server, "insecure-skip-tls-verify": true },
        }],
        "users": [{
            "name": "default-auth",
            "user": { "token": token },
        }],
        "contexts": [{
            "name": "default-context",
            "context": { "cluster": "default-cluster", "user": "default-auth" },
        }],
        "current-context": "default-context",
    });
    Ok(serde_yaml::to_string(&config)?)
}

/// Whether an existing work already carries everything `desired` specifies.
///
/// Extra labels or annotations on the existing work are ignored.
#[must_use]
pub fn work_matches(existing: &ManifestWork, desired: &ManifestWork) -> bool {
    fn contains(have: Option<&BTreeMap<String, String>>, want: Option<&BTreeMap<String, String>>) -> bool {
        want.is_none_or(|want| {
            want.iter()
                .all(|(k, v)| have.and_then(|have| have.get(k)) == Some(v))
        })
    }

    existing.spec == desired.spec
        && contains(existing.metadata.labels.as_ref(), desired.metadata.labels.as_ref())
        && contains(existing.metadata.annotations.as_ref(), desired.metadata.annotations.as_ref())
}
