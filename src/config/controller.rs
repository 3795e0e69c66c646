//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue interval after a successful reconcile (seconds)
    pub poll_interval_secs: u64,
    /// Requeue interval while a resource is creating or deleting (seconds)
    pub short_wait_secs: u64,
    /// Exponential backoff starting value (seconds)
    pub backoff_start_secs: u64,
    /// Exponential backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Maximum concurrent reconciles per kind
    pub max_concurrent_reconciles: u16,
    /// Namespace holding controller-owned secrets such as password caches
    pub controller_namespace: String,
    /// Window after a recorded Create during which a missing resource is not
    /// re-created (seconds)
    pub create_grace_period_secs: u64,
    /// Kinds to reconcile; empty means every registered kind
    pub enabled_kinds: Vec<String>,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// When set, connection details are also mirrored into AWS Secrets
    /// Manager in this region
    pub secrets_manager_mirror_region: Option<String>,
    /// Secrets Manager name prefix for mirrored connection details
    pub secrets_manager_prefix: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            short_wait_secs: DEFAULT_SHORT_WAIT_SECS,
            backoff_start_secs: DEFAULT_BACKOFF_START_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            create_grace_period_secs: DEFAULT_CREATE_GRACE_PERIOD_SECS,
            enabled_kinds: Vec::new(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            secrets_manager_mirror_region: None,
            secrets_manager_prefix: DEFAULT_SECRETS_MANAGER_PREFIX.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let controller_namespace = std::env::var("CONTROLLER_NAMESPACE")
            .or_else(|_| std::env::var("POD_NAMESPACE"))
            .unwrap_or_else(|_| DEFAULT_CONTROLLER_NAMESPACE.to_string());
        Self {
            poll_interval_secs: env_var_or_default("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            short_wait_secs: env_var_or_default("SHORT_WAIT_SECS", DEFAULT_SHORT_WAIT_SECS),
            backoff_start_secs: env_var_or_default("BACKOFF_START_SECS", DEFAULT_BACKOFF_START_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciles: env_var_or_default(
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            ),
            controller_namespace,
            create_grace_period_secs: env_var_or_default(
                "CREATE_GRACE_PERIOD_SECS",
                DEFAULT_CREATE_GRACE_PERIOD_SECS,
            ),
            enabled_kinds: parse_list(&env_var_or_default_str("ENABLED_KINDS", "")),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            secrets_manager_mirror_region: std::env::var("SECRETS_MANAGER_MIRROR_REGION")
                .ok()
                .filter(|v| !v.is_empty()),
            secrets_manager_prefix: env_var_or_default_str(
                "SECRETS_MANAGER_PREFIX",
                DEFAULT_SECRETS_MANAGER_PREFIX,
            ),
        }
    }

    /// Get poll interval duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get short wait duration
    pub fn short_wait(&self) -> Duration {
        Duration::from_secs(self.short_wait_secs)
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_secs(self.backoff_start_secs)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Get create grace period duration
    pub fn create_grace_period(&self) -> Duration {
        Duration::from_secs(self.create_grace_period_secs)
    }

    /// Whether a kind should be reconciled (case-insensitive)
    pub fn is_kind_enabled(&self, kind: &str) -> bool {
        self.enabled_kinds.is_empty()
            || self
                .enabled_kinds
                .iter()
                .any(|k| k.eq_ignore_ascii_case(kind))
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Split a comma-separated list, dropping blanks
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.short_wait(), Duration::from_secs(30));
        assert_eq!(config.backoff_max_duration(), Duration::from_secs(300));
        assert_eq!(config.controller_namespace, "aws-resource-system");
        assert!(config.secrets_manager_mirror_region.is_none());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" DBInstance, Table ,,Permission"),
            vec!["DBInstance", "Table", "Permission"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_kind_filter() {
        let mut config = ControllerConfig::default();
        assert!(config.is_kind_enabled("Job"));
        config.enabled_kinds = vec!["dbinstance".to_string()];
        assert!(config.is_kind_enabled("DBInstance"));
        assert!(!config.is_kind_enabled("Job"));
    }
}
