//! Controller configuration.
//!
//! Read once from environment variables at start-up. Parsing goes through a
//! lookup closure so tests do not have to touch the process environment.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for the hosted import controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Reconciles allowed to run at once (distinct clusters only)
    pub concurrency: u16,
    /// Fibonacci backoff floor for failed reconciles, in seconds
    pub backoff_min_seconds: u64,
    /// Fibonacci backoff cap, in seconds
    pub backoff_max_seconds: u64,
    /// How long a deleting cluster may report non-True availability before its
    /// works are force-deleted. `None` disables the timeout.
    pub unknown_availability_timeout: Option<Duration>,
    /// How long works annotated for postponed deletion outlive a reachable
    /// deleting cluster
    pub postpone_delete_window: Duration,
    /// Requeue interval while a deleting cluster still has works or addons
    pub deletion_requeue_interval: Duration,
    /// Retries for conflicting ManagedCluster writes
    pub status_update_retries: u32,
    /// Quiet period before a queued reconcile starts
    pub debounce: Duration,
    /// Health probe listen address
    pub probe_addr: SocketAddr,
    /// Name reported on Kubernetes Events
    pub controller_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            backoff_min_seconds: 5,
            backoff_max_seconds: 300,
            unknown_availability_timeout: Some(Duration::from_secs(3600)),
            postpone_delete_window: Duration::from_secs(600),
            deletion_requeue_interval: Duration::from_secs(2),
            status_update_retries: 5,
            debounce: Duration::from_secs(1),
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            controller_name: "hosted-manifestwork-controller".to_string(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ControllerError> {
    match value {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ControllerError::InvalidConfig(format!("{key} has invalid value {raw:?}"))),
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let concurrency = parse("MAX_CONCURRENT_RECONCILES", lookup("MAX_CONCURRENT_RECONCILES"), defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }

        let backoff_min_seconds = parse("BACKOFF_MIN_SECONDS", lookup("BACKOFF_MIN_SECONDS"), defaults.backoff_min_seconds)?;
        let backoff_max_seconds = parse("BACKOFF_MAX_SECONDS", lookup("BACKOFF_MAX_SECONDS"), defaults.backoff_max_seconds)?;
        if backoff_min_seconds == 0 || backoff_min_seconds > backoff_max_seconds {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < min <= max, got min={backoff_min_seconds} max={backoff_max_seconds}"
            )));
        }

        let timeout_seconds: u64 = parse(
            "UNKNOWN_AVAILABILITY_FORCE_DELETE_SECONDS",
            lookup("UNKNOWN_AVAILABILITY_FORCE_DELETE_SECONDS"),
            defaults.unknown_availability_timeout.map_or(0, |d| d.as_secs()),
        )?;

        let postpone_seconds: u64 = parse(
            "MANIFEST_WORK_POSTPONE_DELETE_SECONDS",
            lookup("MANIFEST_WORK_POSTPONE_DELETE_SECONDS"),
            defaults.postpone_delete_window.as_secs(),
        )?;
        let requeue_seconds: u64 = parse(
            "DELETION_REQUEUE_SECONDS",
            lookup("DELETION_REQUEUE_SECONDS"),
            defaults.deletion_requeue_interval.as_secs(),
        )?;
        if requeue_seconds == 0 {
            return Err(ControllerError::InvalidConfig(
                "DELETION_REQUEUE_SECONDS must be at least 1".to_string(),
            ));
        }

        let status_update_retries = parse("STATUS_UPDATE_RETRIES", lookup("STATUS_UPDATE_RETRIES"), defaults.status_update_retries)?;
        let debounce_seconds: u64 = parse("RECONCILE_DEBOUNCE_SECONDS", lookup("RECONCILE_DEBOUNCE_SECONDS"), defaults.debounce.as_secs())?;
        let probe_addr = parse("PROBE_ADDR", lookup("PROBE_ADDR"), defaults.probe_addr)?;
        let controller_name = lookup("CONTROLLER_NAME")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(defaults.controller_name);

        Ok(Self {
            concurrency,
            backoff_min_seconds,
            backoff_max_seconds,
            unknown_availability_timeout: (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds)),
            postpone_delete_window: Duration::from_secs(postpone_seconds),
            deletion_requeue_interval: Duration::from_secs(requeue_seconds),
            status_update_retries,
            debounce: Duration::from_secs(debounce_seconds),
            probe_addr,
            controller_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            ("MAX_CONCURRENT_RECONCILES", "4"),
            ("BACKOFF_MIN_SECONDS", "2"),
            ("BACKOFF_MAX_SECONDS", "60"),
            ("UNKNOWN_AVAILABILITY_FORCE_DELETE_SECONDS", "0"),
            ("MANIFEST_WORK_POSTPONE_DELETE_SECONDS", "0"),
            ("DELETION_REQUEUE_SECONDS", "5"),
            ("PROBE_ADDR", "127.0.0.1:9090"),
            ("CONTROLLER_NAME", "import-controller"),
        ]))
        .unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.backoff_min_seconds, 2);
        assert_eq!(config.backoff_max_seconds, 60);
        assert_eq!(config.unknown_availability_timeout, None);
        assert_eq!(config.postpone_delete_window, Duration::ZERO);
        assert_eq!(config.deletion_requeue_interval, Duration::from_secs(5));
        assert_eq!(config.probe_addr.port(), 9090);
        assert_eq!(config.controller_name, "import-controller");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ControllerConfig::from_lookup(lookup(&[("MAX_CONCURRENT_RECONCILES", "many")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ControllerConfig::from_lookup(lookup(&[("MAX_CONCURRENT_RECONCILES", "0")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ControllerConfig::from_lookup(lookup(&[("DELETION_REQUEUE_SECONDS", "0")])),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            ControllerConfig::from_lookup(lookup(&[("BACKOFF_MIN_SECONDS", "90"), ("BACKOFF_MAX_SECONDS", "30")])),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
