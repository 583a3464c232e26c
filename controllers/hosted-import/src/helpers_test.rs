//! Unit tests for the availability and finalizer helpers

#[cfg(test)]
mod tests {
    use crate::constants::*;
    use crate::helpers::*;
    use crate::manifest::ManifestError;
    use crate::test_utils::*;
    use chrono::{Duration, Utc};
    use crds::{ConditionStatus, FeedbackValue, FieldValue};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_deploy_mode_from_annotation() {
        assert_eq!(deploy_mode(&create_test_managed_cluster("test", None)), DeployMode::Default);
        assert_eq!(deploy_mode(&create_test_managed_cluster("test", Some("cluster1"))), DeployMode::Hosted);

        let mut cluster = create_test_managed_cluster("test", Some("cluster1"));
        cluster
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(KLUSTERLET_DEPLOY_MODE_ANNOTATION.to_string(), "hosted".to_string());
        assert_eq!(deploy_mode(&cluster), DeployMode::Hosted);

        cluster
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(KLUSTERLET_DEPLOY_MODE_ANNOTATION.to_string(), "Singleton".to_string());
        assert_eq!(deploy_mode(&cluster), DeployMode::Unknown("Singleton".to_string()));
    }

    #[test]
    fn test_hosting_cluster_name_ignores_blank_values() {
        let mut cluster = create_test_managed_cluster("test", Some("cluster1"));
        assert_eq!(hosting_cluster_name(&cluster), Some("cluster1"));

        cluster
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(HOSTING_CLUSTER_NAME_ANNOTATION.to_string(), "  ".to_string());
        assert_eq!(hosting_cluster_name(&cluster), None);
    }

    #[test]
    fn test_unavailable_only_on_explicit_false() {
        let cluster = create_test_managed_cluster("test", None);
        assert!(!is_unavailable(&cluster), "missing condition is reachable");
        assert!(!is_unavailable(&with_available(cluster.clone(), ConditionStatus::Unknown)));
        assert!(!is_unavailable(&with_available(cluster.clone(), ConditionStatus::True)));
        assert!(is_unavailable(&with_available(cluster, ConditionStatus::False)));
    }

    #[test]
    fn test_needs_force_delete() {
        let now = Utc::now();
        let hour = Some(StdDuration::from_secs(3600));
        let base = create_test_managed_cluster("test", None);

        let unavailable = deleting(with_available(base.clone(), ConditionStatus::False), now);
        assert!(needs_force_delete(&unavailable, now, None));

        let unknown_recent = deleting(with_available(base.clone(), ConditionStatus::Unknown), now - Duration::minutes(10));
        assert!(!needs_force_delete(&unknown_recent, now, hour));

        let unknown_stale = deleting(with_available(base.clone(), ConditionStatus::Unknown), now - Duration::hours(2));
        assert!(needs_force_delete(&unknown_stale, now, hour));
        assert!(!needs_force_delete(&unknown_stale, now, None));

        let available_stale = deleting(with_available(base, ConditionStatus::True), now - Duration::hours(2));
        assert!(!needs_force_delete(&available_stale, now, hour));
    }

    #[test]
    fn test_postpone_deletion_window() {
        let now = Utc::now();
        let window = StdDuration::from_secs(600);
        let mut work = create_test_manifest_work("test", "test-observability", &[]);
        let cluster = deleting(create_test_managed_cluster("test", Some("cluster1")), now - Duration::minutes(3));
        assert!(!postpone_deletion(&work, &cluster, now, window));

        work.metadata.annotations = Some(BTreeMap::from([(POSTPONE_DELETION_ANNOTATION.to_string(), String::new())]));
        assert!(postpone_deletion(&work, &cluster, now, window));
        assert!(!postpone_deletion(&work, &cluster, now + Duration::minutes(8), window));
        assert!(!postpone_deletion(&work, &create_test_managed_cluster("test", Some("cluster1")), now, window));
    }

    #[test]
    fn test_finalizer_set_operations_keep_foreign_entries() {
        let mut cluster = create_test_managed_cluster("test", None);
        cluster.metadata.finalizers = Some(vec!["other.io/cleanup".to_string()]);

        assert!(ensure_finalizer(&mut cluster.metadata, MANIFEST_WORK_FINALIZER));
        assert!(!ensure_finalizer(&mut cluster.metadata, MANIFEST_WORK_FINALIZER));
        assert!(has_finalizer(&cluster.metadata, MANIFEST_WORK_FINALIZER));

        assert!(remove_finalizer(&mut cluster.metadata, MANIFEST_WORK_FINALIZER));
        assert!(!remove_finalizer(&mut cluster.metadata, MANIFEST_WORK_FINALIZER));
        assert_eq!(cluster.metadata.finalizers, Some(vec!["other.io/cleanup".to_string()]));
    }

    #[test]
    fn test_ready_to_apply_feedback() {
        let mut work = create_test_manifest_work("cluster1", "test-hosted-klusterlet", &[]);
        assert!(!klusterlet_ready_to_apply(&work, "test"));

        work.status = Some(create_test_work_status("test", true, false));
        assert!(is_work_available(&work));
        assert!(!klusterlet_ready_to_apply(&work, "test"));

        work.status = Some(create_test_work_status("test", true, true));
        assert!(klusterlet_ready_to_apply(&work, "test"));
        // Feedback of another cluster's klusterlet does not count
        assert!(!klusterlet_ready_to_apply(&work, "other"));

        let mut boolean = create_test_work_status("test", false, false);
        boolean.resource_status.as_mut().unwrap().manifests[0].status_feedbacks.values = vec![FeedbackValue {
            name: READY_TO_APPLY_STATUS_FEEDBACK.to_string(),
            field_value: FieldValue {
                type_: "Boolean".to_string(),
                boolean: Some(true),
                ..Default::default()
            },
        }];
        work.status = Some(boolean);
        assert!(!is_work_available(&work));
        assert!(klusterlet_ready_to_apply(&work, "test"));
    }

    #[test]
    fn test_addon_work_prefix() {
        let addon = create_test_manifest_work("test", "test-klusterlet-addon-workmgr", &[]);
        let plain = create_test_manifest_work("test", "test-app", &[]);
        let foreign = create_test_manifest_work("test", "other-klusterlet-addon-workmgr", &[]);
        assert!(is_addon_work(&addon, "test"));
        assert!(!is_addon_work(&plain, "test"));
        assert!(!is_addon_work(&foreign, "test"));
    }

    #[test]
    fn test_validate_import_secret() {
        let secret = create_test_import_secret("test", TEST_IMPORT_YAML);
        assert_eq!(validate_import_secret(&secret).unwrap(), TEST_IMPORT_YAML.as_bytes());

        let empty = create_test_import_secret("test", "");
        assert!(validate_import_secret(&empty).unwrap_err().contains(IMPORT_YAML_KEY));
    }

    #[test]
    fn test_auto_import_kubeconfig_sources() {
        let secret = create_test_auto_import_secret("test", TEST_KUBECONFIG, false);
        assert_eq!(auto_import_kubeconfig(&secret).unwrap(), TEST_KUBECONFIG.as_bytes());

        let mut token = create_test_auto_import_secret("test", "", false);
        token.data = Some(BTreeMap::from([
            (TOKEN_KEY.to_string(), ByteString(b"sha256~abc".to_vec())),
            (SERVER_KEY.to_string(), ByteString(b"https://api.test.example.com:6443\n".to_vec())),
        ]));
        let rendered = String::from_utf8(auto_import_kubeconfig(&token).unwrap()).unwrap();
        assert!(rendered.contains("https://api.test.example.com:6443"));
        assert!(rendered.contains("sha256~abc"));

        let empty = create_test_auto_import_secret("test", "", false);
        let kubeconfig = auto_import_kubeconfig(&empty).unwrap();
        assert!(kubeconfig.is_empty());
        assert!(matches!(
            crate::manifest::build_kubeconfig_work("test", "cluster1", &kubeconfig),
            Err(ManifestError::MissingKubeconfig)
        ));
    }

    #[test]
    fn test_auto_import_retry_counter() {
        let mut secret = create_test_auto_import_secret("test", TEST_KUBECONFIG, false);
        assert_eq!(increment_auto_import_retry(&mut secret), 1);
        assert_eq!(increment_auto_import_retry(&mut secret), 2);

        secret
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert(AUTO_IMPORT_RETRY_ANNOTATION.to_string(), "garbage".to_string());
        assert_eq!(increment_auto_import_retry(&mut secret), 1);
    }

    #[test]
    fn test_keep_auto_import_secret() {
        assert!(keep_auto_import_secret(&create_test_auto_import_secret("test", TEST_KUBECONFIG, true)));
        assert!(!keep_auto_import_secret(&create_test_auto_import_secret("test", TEST_KUBECONFIG, false)));
    }
}
