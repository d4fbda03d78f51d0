//! Operator configuration
//!
//! Loaded from an optional YAML file and then overridden from the command
//! line. Every field has a default so an empty file (or no file) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, DEFAULT_CLICKHOUSE_IMAGE, DEFAULT_HTTP_PORT, DEFAULT_INTERSERVER_HTTP_PORT,
    DEFAULT_LOG_IMAGE, DEFAULT_TCP_PORT,
};

/// Top-level operator configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Namespaces to watch; empty means all namespaces
    pub watch_namespaces: Vec<String>,
    /// Reconcile loop tuning
    pub reconcile: ReconcileConfig,
    /// Defaults applied during normalization and object creation
    pub defaults: DefaultsConfig,
    /// Access to running ClickHouse hosts
    pub clickhouse: ClickHouseAccessConfig,
    /// Emit JSON logs
    pub log_json: bool,
}

/// Reconcile loop tuning
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// Number of workers draining the queue
    pub workers: usize,
    /// Upper bound for one reconcile pass, in seconds
    pub pass_timeout_secs: u64,
    /// Upper bound for one platform call, in seconds
    pub call_timeout_secs: u64,
    /// Delay after a pass before the installation is reconciled again even
    /// without a spec change, in seconds; 0 disables resync
    pub resync_interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pass_timeout_secs: 600,
            call_timeout_secs: 30,
            resync_interval_secs: 60,
        }
    }
}

impl ReconcileConfig {
    /// Pass timeout as a [`Duration`]
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    /// Call timeout as a [`Duration`]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Resync interval, `None` when disabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Defaults for hosts that do not specify their own values
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsConfig {
    /// Native protocol port
    pub tcp_port: i32,
    /// HTTP interface port
    pub http_port: i32,
    /// Replication port
    #[serde(rename = "interserverHTTPPort")]
    pub interserver_http_port: i32,
    /// Server image used by the default pod template
    pub image: String,
    /// Image of the log sidecar
    pub log_image: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            tcp_port: DEFAULT_TCP_PORT,
            http_port: DEFAULT_HTTP_PORT,
            interserver_http_port: DEFAULT_INTERSERVER_HTTP_PORT,
            image: DEFAULT_CLICKHOUSE_IMAGE.to_string(),
            log_image: DEFAULT_LOG_IMAGE.to_string(),
        }
    }
}

/// Credentials and transport for the administrative SQL client
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickHouseAccessConfig {
    /// `http` or `https`
    pub scheme: String,
    /// HTTP interface port on each host
    pub port: u16,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// PEM bundle used to verify host certificates
    pub root_ca: Option<String>,
    /// Connect timeout, in seconds
    pub connect_timeout_secs: u64,
    /// Default query timeout, in seconds
    pub query_timeout_secs: u64,
}

impl Default for ClickHouseAccessConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            port: DEFAULT_HTTP_PORT as u16,
            username: String::new(),
            password: String::new(),
            root_ca: None,
            connect_timeout_secs: 2,
            query_timeout_secs: 10,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the operator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.workers == 0 {
            return Err(Error::config("reconcile.workers must be at least 1"));
        }
        let ports = [
            ("defaults.tcpPort", self.defaults.tcp_port),
            ("defaults.httpPort", self.defaults.http_port),
            ("defaults.interserverHTTPPort", self.defaults.interserver_http_port),
            ("clickhouse.port", i32::from(self.clickhouse.port)),
        ];
        for (field, port) in ports {
            if !(1..=65535).contains(&port) {
                return Err(Error::config(format!("{field} {port} out of range")));
            }
        }
        if !matches!(self.clickhouse.scheme.as_str(), "http" | "https") {
            return Err(Error::config(format!(
                "clickhouse.scheme must be http or https, got '{}'",
                self.clickhouse.scheme
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = OperatorConfig::from_yaml("").unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.defaults.tcp_port, 9000);
        assert_eq!(config.defaults.http_port, 8123);
        assert_eq!(config.defaults.interserver_http_port, 9009);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = OperatorConfig::from_yaml(
            r#"
watchNamespaces: [analytics]
reconcile:
  workers: 8
defaults:
  tcpPort: 9440
"#,
        )
        .unwrap();

        assert_eq!(config.watch_namespaces, vec!["analytics"]);
        assert_eq!(config.reconcile.workers, 8);
        assert_eq!(config.reconcile.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconcile.resync_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.defaults.tcp_port, 9440);
        assert_eq!(config.defaults.http_port, 8123);
    }

    #[test]
    fn zero_resync_interval_disables_resync() {
        let config = OperatorConfig::from_yaml("reconcile:\n  resyncIntervalSecs: 0\n").unwrap();
        assert_eq!(config.reconcile.resync_interval(), None);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = OperatorConfig::from_yaml("reconcile:\n  workers: 0\n").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        let err = OperatorConfig::from_yaml("defaults:\n  httpPort: 70000\n").unwrap_err();
        assert!(err.to_string().contains("defaults.httpPort"));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(OperatorConfig::from_yaml("clickhouse:\n  scheme: tcp\n").is_err());
    }
}
