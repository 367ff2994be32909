//! # Controller Configuration
//!
//! Operator settings loaded from environment variables.
//!
//! Every controller reads the global settings first and then applies its own
//! overrides from variables prefixed with the component name, for example
//! `REGISTRY_CONTROLLER_CLASS_NAME` or `JOBSERVICE_CONTROLLER_MAX_CONCURRENT_RECONCILES`.

use std::path::PathBuf;
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Name written to the `operator` label of every child object
    pub operator_name: String,
    /// Operator class this instance manages
    /// Resources whose class label differs are ignored
    pub class_name: String,
    /// Maximum concurrent reconciles for one controller
    pub max_concurrent_reconciles: u16,
    /// Backoff after the first failed reconcile (seconds)
    pub backoff_min_secs: u64,
    /// Upper bound of the backoff sequence (seconds)
    pub backoff_max_secs: u64,
    /// Requeue interval while a dependent database is not ready (seconds)
    pub database_poll_interval_secs: u64,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Directory whose files override the built-in configuration templates
    pub templates_dir: Option<PathBuf>,
    /// Whether the operator runs inside the cluster network
    /// Decides how database hosts are resolved
    pub in_cluster: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operator_name: DEFAULT_OPERATOR_NAME.to_string(),
            class_name: String::new(),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            database_poll_interval_secs: DEFAULT_DATABASE_POLL_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            templates_dir: None,
            in_cluster: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;
        let in_cluster_default = lookup("KUBERNETES_SERVICE_HOST").is_some();
        Self {
            operator_name: var_or_default_str(&lookup, "OPERATOR_NAME", DEFAULT_OPERATOR_NAME),
            class_name: var_or_default_str(&lookup, "CLASS_NAME", ""),
            max_concurrent_reconciles: var_or_default(
                &lookup,
                "MAX_CONCURRENT_RECONCILES",
                DEFAULT_MAX_CONCURRENT_RECONCILES,
            ),
            backoff_min_secs: var_or_default(&lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: var_or_default(&lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            database_poll_interval_secs: var_or_default(
                &lookup,
                "DATABASE_POLL_INTERVAL_SECS",
                DEFAULT_DATABASE_POLL_INTERVAL_SECS,
            ),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            templates_dir: lookup("TEMPLATES_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            in_cluster: var_or_default_bool(&lookup, "IN_CLUSTER", in_cluster_default),
        }
    }

    /// Apply the overrides of one component controller
    ///
    /// Only the class and the concurrency can differ between controllers.
    #[must_use]
    pub fn for_component(&self, component: &str) -> Self {
        self.for_component_with(component, |key| std::env::var(key).ok())
    }

    pub fn for_component_with<F>(&self, component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = config_prefix(component);
        Self {
            class_name: var_or_default_str(
                &lookup,
                &format!("{prefix}CLASS_NAME"),
                &self.class_name,
            ),
            max_concurrent_reconciles: var_or_default(
                &lookup,
                &format!("{prefix}MAX_CONCURRENT_RECONCILES"),
                self.max_concurrent_reconciles,
            ),
            ..self.clone()
        }
    }

    /// Get database poll interval duration
    pub fn database_poll_interval(&self) -> Duration {
        Duration::from_secs(self.database_poll_interval_secs)
    }
}

/// Environment prefix of a component controller: `registryctl` becomes `REGISTRYCTL_CONTROLLER_`
pub fn config_prefix(component: &str) -> String {
    format!("{}_CONTROLLER_", component.replace('-', "_").to_uppercase())
}

/// Read variable or return default value
fn var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read variable as boolean or return default
fn var_or_default_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read variable as string or return default
fn var_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = ControllerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn in_cluster_follows_service_host() {
        let config = ControllerConfig::from_lookup(lookup(&[("KUBERNETES_SERVICE_HOST", "10.0.0.1")]));
        assert!(config.in_cluster);

        let config = ControllerConfig::from_lookup(lookup(&[
            ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
            ("IN_CLUSTER", "false"),
        ]));
        assert!(!config.in_cluster, "explicit IN_CLUSTER wins over detection");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[("MAX_CONCURRENT_RECONCILES", "many")]));
        assert_eq!(
            config.max_concurrent_reconciles,
            crate::constants::DEFAULT_MAX_CONCURRENT_RECONCILES
        );
    }

    #[test]
    fn component_overrides_use_component_prefix() {
        let global = ControllerConfig::from_lookup(lookup(&[
            ("CLASS_NAME", "blue"),
            ("MAX_CONCURRENT_RECONCILES", "4"),
        ]));
        let registryctl = global.for_component_with(
            "registryctl",
            lookup(&[("REGISTRYCTL_CONTROLLER_CLASS_NAME", "green")]),
        );

        assert_eq!(registryctl.class_name, "green");
        assert_eq!(registryctl.max_concurrent_reconciles, 4);
        assert_eq!(registryctl.operator_name, global.operator_name);
    }

    #[test]
    fn prefix_is_upper_snake_case() {
        assert_eq!(config_prefix("notaryserver"), "NOTARYSERVER_CONTROLLER_");
        assert_eq!(config_prefix("harbor-cluster"), "HARBOR_CLUSTER_CONTROLLER_");
    }
}
