//! Well-known names shared with the rest of the import stack.
//!
//! These strings are part of the contract with the import secret generator,
//! the klusterlet operator and the addon controllers. Do not change them.

/// Annotation selecting the klusterlet deploy mode ("Default" or "Hosted")
pub const KLUSTERLET_DEPLOY_MODE_ANNOTATION: &str = "import.open-cluster-management.io/klusterlet-deploy-mode";

/// Annotation naming the hosting cluster of a hosted-mode cluster
pub const HOSTING_CLUSTER_NAME_ANNOTATION: &str = "import.open-cluster-management.io/hosting-cluster-name";

/// Label carried by hosted works, value is the managed cluster name
pub const HOSTED_CLUSTER_LABEL: &str = "import.open-cluster-management.io/hosted-cluster";

pub const MANIFEST_WORK_FINALIZER: &str =
    "managedcluster-import-controller.open-cluster-management.io/manifestwork-cleanup";

/// Label on import secrets produced by the import secret generator
pub const IMPORT_SECRET_LABEL: &str = "managedcluster-import-controller.open-cluster-management.io/import-secret";

pub const KEEPING_AUTO_IMPORT_SECRET_ANNOTATION: &str =
    "managedcluster-import-controller.open-cluster-management.io/keeping-auto-import-secret";

/// Opaque counter of failed auto-import attempts, interpreted by the auto-import controller
pub const AUTO_IMPORT_RETRY_ANNOTATION: &str =
    "managedcluster-import-controller.open-cluster-management.io/auto-import-retry";

/// Works with this annotation outlive a reachable cluster's deletion for a while
pub const POSTPONE_DELETION_ANNOTATION: &str = "open-cluster-management/postpone-delete";

/// Works with this annotation are deleted last by the work agent
pub const CLEANUP_PRIORITY_ANNOTATION: &str = "open-cluster-management.io/cleanup-priority";

pub const AUTO_IMPORT_SECRET_NAME: &str = "auto-import-secret";
pub const IMPORT_SECRET_NAME_SUFFIX: &str = "import";

// Secret data keys
pub const IMPORT_YAML_KEY: &str = "import.yaml";
pub const KUBECONFIG_KEY: &str = "kubeconfig";
pub const TOKEN_KEY: &str = "token";
pub const SERVER_KEY: &str = "server";

pub const HOSTED_KLUSTERLET_WORK_SUFFIX: &str = "hosted-klusterlet";
pub const HOSTED_KUBECONFIG_WORK_SUFFIX: &str = "hosted-kubeconfig";
pub const KLUSTERLET_ADDON_WORK_SUFFIX: &str = "klusterlet-addon";

/// Secret the klusterlet operator reads to reach the managed cluster
pub const EXTERNAL_MANAGED_KUBECONFIG_SECRET: &str = "external-managed-kubeconfig";

/// API group of the Klusterlet resource
pub const OPERATOR_GROUP: &str = "operator.open-cluster-management.io";

// Condition types
pub const CONDITION_MANAGED_CLUSTER_IMPORT_SUCCEEDED: &str = "ManagedClusterImportSucceeded";
pub const CONDITION_EXTERNAL_MANAGED_KUBECONFIG_CREATED_SUCCEEDED: &str = "ExternalManagedKubeconfigCreatedSucceeded";

// Condition reasons
pub const REASON_WAIT_FOR_IMPORTING: &str = "ManagedClusterWaitForImporting";
pub const REASON_IMPORTING: &str = "ManagedClusterImporting";
pub const REASON_IMPORT_FAILED: &str = "ManagedClusterImportFailed";
pub const REASON_IMPORTED: &str = "ManagedClusterImported";
pub const REASON_DETACHING: &str = "ManagedClusterDetaching";
pub const REASON_FORCE_DETACHING: &str = "ManagedClusterForceDetaching";
pub const REASON_KUBECONFIG_CREATED: &str = "ExternalManagedKubeconfigCreated";
pub const REASON_KUBECONFIG_NOT_CREATED: &str = "ExternalManagedKubeconfigNotCreated";

/// Feedback value reporting the klusterlet's ReadyToApply condition status
pub const READY_TO_APPLY_STATUS_FEEDBACK: &str = "ReadyToApply-status";
