//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Platform namespace holding the image pull secrets
pub const DEFAULT_PROVIDER_NAMESPACE: &str = "landscaper-provider-system";

/// Provider configuration used by instances that do not reference one
pub const DEFAULT_PROVIDER_CONFIG: &str = "default";

/// Overall wait for a cluster or access request to be answered
pub const DEFAULT_ACCESS_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Delay between readiness checks of an installed instance
pub const DEFAULT_READINESS_RECHECK_SECS: u64 = 40;

/// Listen address of the probes and metrics server
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// How control plane credentials are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Read `<instance>.kubeconfig` next to the instance
    #[default]
    Secret,
    /// Request a cluster and access to it from the platform
    AccessRequest,
}

impl FromStr for CredentialMode {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secret" => Ok(CredentialMode::Secret),
            "access-request" => Ok(CredentialMode::AccessRequest),
            other => Err(ControllerError::InvalidConfig(format!(
                "CREDENTIAL_MODE must be \"secret\" or \"access-request\", got {:?}",
                other
            ))),
        }
    }
}

/// Runtime configuration of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    pub provider_namespace: String,
    pub default_provider_config: String,
    /// Kubeconfig of the workload cluster; the default client is used when unset
    pub workload_kubeconfig: Option<PathBuf>,
    pub credential_mode: CredentialMode,
    pub access_request_timeout: Duration,
    pub readiness_recheck: Duration,
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential_mode = match var("CREDENTIAL_MODE") {
            Some(mode) => mode.parse()?,
            None => CredentialMode::default(),
        };
        let metrics_addr = var("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_addr.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("METRICS_ADDR {:?} is not a socket address: {}", metrics_addr, e))
        })?;

        Ok(Self {
            watch_namespace: var("WATCH_NAMESPACE"),
            provider_namespace: var("PROVIDER_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_PROVIDER_NAMESPACE.to_string()),
            default_provider_config: var("DEFAULT_PROVIDER_CONFIG")
                .unwrap_or_else(|| DEFAULT_PROVIDER_CONFIG.to_string()),
            workload_kubeconfig: var("WORKLOAD_KUBECONFIG").map(PathBuf::from),
            credential_mode,
            access_request_timeout: seconds(
                "ACCESS_REQUEST_TIMEOUT_SECS",
                var("ACCESS_REQUEST_TIMEOUT_SECS"),
                DEFAULT_ACCESS_REQUEST_TIMEOUT_SECS,
            )?,
            readiness_recheck: seconds(
                "READINESS_RECHECK_SECS",
                var("READINESS_RECHECK_SECS"),
                DEFAULT_READINESS_RECHECK_SECS,
            )?,
            metrics_addr,
        })
    }

    /// Logs the effective configuration.
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Namespace: {}", self.watch_namespace.as_deref().unwrap_or("all namespaces"));
        info!("  Provider namespace: {}", self.provider_namespace);
        info!("  Default provider config: {}", self.default_provider_config);
        info!(
            "  Workload cluster: {}",
            self.workload_kubeconfig
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-cluster".to_string())
        );
        info!("  Credential mode: {:?}", self.credential_mode);
        info!("  Access request timeout: {:?}", self.access_request_timeout);
        info!("  Readiness recheck: {:?}", self.readiness_recheck);
        info!("  Metrics address: {}", self.metrics_addr);
    }
}

fn seconds(key: &str, value: Option<String>, default: u64) -> Result<Duration, ControllerError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{} must be a positive number of seconds, got {:?}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.provider_namespace, "landscaper-provider-system");
        assert_eq!(config.default_provider_config, "default");
        assert_eq!(config.workload_kubeconfig, None);
        assert_eq!(config.credential_mode, CredentialMode::Secret);
        assert_eq!(config.access_request_timeout, Duration::from_secs(300));
        assert_eq!(config.readiness_recheck, Duration::from_secs(40));
        assert_eq!(config.metrics_addr.port(), 8080);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("WATCH_NAMESPACE", "tenants"),
            ("CREDENTIAL_MODE", "access-request"),
            ("READINESS_RECHECK_SECS", "10"),
            ("WORKLOAD_KUBECONFIG", "/etc/workload/kubeconfig"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ])
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("tenants"));
        assert_eq!(config.credential_mode, CredentialMode::AccessRequest);
        assert_eq!(config.readiness_recheck, Duration::from_secs(10));
        assert_eq!(config.workload_kubeconfig, Some(PathBuf::from("/etc/workload/kubeconfig")));
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = config(&[("WATCH_NAMESPACE", ""), ("READINESS_RECHECK_SECS", " ")]).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.readiness_recheck, Duration::from_secs(40));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("CREDENTIAL_MODE", "token")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("READINESS_RECHECK_SECS", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("METRICS_ADDR", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
