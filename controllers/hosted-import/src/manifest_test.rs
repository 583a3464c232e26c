//! Unit tests for the manifest builder

#[cfg(test)]
mod tests {
    use crate::constants::*;
    use crate::manifest::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use crds::DeletePropagationPolicy;

    const IMPORT_YAML: &str = r#"---
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
---
# bootstrap credentials
apiVersion: v1
kind: Secret
metadata:
  name: bootstrap-hub-kubeconfig
  namespace: klusterlet-test
data:
  kubeconfig: ZmFrZQ==
---
# trailing comment only
"#;

    #[test]
    fn test_split_documents_drops_empty_and_comment_only() {
        let codec = ManifestCodec::new();
        let docs = codec.split_documents(IMPORT_YAML);
        assert_eq!(docs.len(), 3);
        assert!(docs[1].contains("kind: Klusterlet"));
    }

    #[test]
    fn test_split_documents_ignores_dashes_inside_values() {
        let codec = ManifestCodec::new();
        let stream = "apiVersion: v1\nkind: ConfigMap\ndata:\n  banner: \"---not a separator\"\n--- \napiVersion: v1\nkind: ConfigMap\n";
        assert_eq!(codec.split_documents(stream).len(), 2);
    }

    #[test]
    fn test_build_klusterlet_work() {
        let codec = ManifestCodec::new();
        let work = build_klusterlet_work(&codec, "test", "cluster1", IMPORT_YAML.as_bytes()).unwrap();

        assert_eq!(work.metadata.name.as_deref(), Some("test-hosted-klusterlet"));
        assert_eq!(work.metadata.namespace.as_deref(), Some("cluster1"));
        assert_eq!(
            work.metadata.labels.as_ref().and_then(|l| l.get(HOSTED_CLUSTER_LABEL)).map(String::as_str),
            Some("test")
        );
        assert_eq!(
            work.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(CLEANUP_PRIORITY_ANNOTATION))
                .map(String::as_str),
            Some("100")
        );
        assert_eq!(
            work.spec.delete_option.as_ref().map(|d| d.propagation_policy),
            Some(DeletePropagationPolicy::Foreground)
        );

        // Namespace is not managed by the work
        let kinds: Vec<&str> = work
            .spec
            .workload
            .manifests
            .iter()
            .filter_map(|m| m["kind"].as_str())
            .collect();
        assert_eq!(kinds, vec!["Klusterlet", "Secret"]);

        let config = &work.spec.manifest_configs[0];
        assert_eq!(config.resource_identifier.name, "klusterlet-test");
        assert_eq!(config.resource_identifier.resource, "klusterlets");
        assert!(
            config.feedback_rules[0]
                .json_paths
                .iter()
                .any(|p| p.name == READY_TO_APPLY_STATUS_FEEDBACK)
        );
    }

    #[test]
    fn test_build_klusterlet_work_rejects_malformed_document() {
        let codec = ManifestCodec::new();
        let payload = "apiVersion: v1\nkind: ConfigMap\n---\nkind: [unterminated\n";
        let err = build_klusterlet_work(&codec, "test", "cluster1", payload.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidPayload { index: 1, .. }));

        let payload = "just a string\n";
        let err = build_klusterlet_work(&codec, "test", "cluster1", payload.as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidPayload { index: 0, .. }));
    }

    #[test]
    fn test_build_kubeconfig_work() {
        let kubeconfig = b"apiVersion: v1\nkind: Config\n";
        let work = build_kubeconfig_work("test", "cluster1", kubeconfig).unwrap();

        assert_eq!(work.metadata.name.as_deref(), Some("test-hosted-kubeconfig"));
        assert_eq!(work.metadata.namespace.as_deref(), Some("cluster1"));
        assert_eq!(
            work.spec.delete_option.as_ref().map(|d| d.propagation_policy),
            Some(DeletePropagationPolicy::Orphan)
        );
        assert_eq!(work.spec.workload.manifests.len(), 1);

        let secret = &work.spec.workload.manifests[0];
        assert_eq!(secret["metadata"]["name"], "external-managed-kubeconfig");
        assert_eq!(secret["metadata"]["namespace"], "klusterlet-test");
        let encoded = secret["data"]["kubeconfig"].as_str().unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), kubeconfig);
    }

    #[test]
    fn test_build_kubeconfig_work_requires_kubeconfig() {
        assert!(matches!(
            build_kubeconfig_work("test", "cluster1", b""),
            Err(ManifestError::MissingKubeconfig)
        ));
        assert!(matches!(
            build_kubeconfig_work("test", "cluster1", b"  \n"),
            Err(ManifestError::MissingKubeconfig)
        ));
    }

    #[test]
    fn test_kubeconfig_from_token() {
        let rendered = kubeconfig_from_token("https://api.test.example.com:6443", "sha256~abc").unwrap();
        let parsed: serde_json::Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed["clusters"][0]["cluster"]["server"], "https://api.test.example.com:6443");
        assert_eq!(parsed["clusters"][0]["cluster"]["insecure-skip-tls-verify"], true);
        assert_eq!(parsed["users"][0]["user"]["token"], "sha256~abc");
        assert_eq!(parsed["current-context"], "default-context");
    }

    #[test]
    fn test_work_matches_ignores_foreign_metadata() {
        let codec = ManifestCodec::new();
        let desired = build_klusterlet_work(&codec, "test", "cluster1", IMPORT_YAML.as_bytes()).unwrap();

        let mut existing = desired.clone();
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert("extra".to_string(), "label".to_string());
        existing.metadata.finalizers = Some(vec!["cluster.open-cluster-management.io/manifest-work-cleanup".to_string()]);
        assert!(work_matches(&existing, &desired));

        existing.spec.workload.manifests.pop();
        assert!(!work_matches(&existing, &desired));
    }
}
