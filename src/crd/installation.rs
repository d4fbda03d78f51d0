//! ClickHouseInstallation Custom Resource Definition
//!
//! A ClickHouseInstallation describes one or more ClickHouse clusters, each a
//! shard × replica matrix of hosts, together with the layered settings and
//! templates every host inherits.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Configuration, Defaults, InstallationPhase, Templates};

/// Maximum number of errors kept in status
pub const MAX_STATUS_ERRORS: usize = 10;

/// Specification for a ClickHouseInstallation
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "clickhouse.altinity.com",
    version = "v1",
    kind = "ClickHouseInstallation",
    plural = "clickhouseinstallations",
    shortname = "chi",
    status = "ClickHouseInstallationStatus",
    namespaced,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Clusters","type":"integer","jsonPath":".status.clusters"}"#,
    printcolumn = r#"{"name":"Hosts","type":"integer","jsonPath":".status.hosts"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClickHouseInstallationSpec {
    /// Scale every StatefulSet to zero while keeping all other objects
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stop: bool,

    /// Defaults inherited by every cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,

    /// Settings, users and cluster layout
    #[serde(default)]
    pub configuration: Configuration,

    /// Named templates referenced from `defaults` and the cluster tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Templates>,
}

/// Status for a ClickHouseInstallation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickHouseInstallationStatus {
    /// Outcome of the latest reconcile pass
    #[serde(default)]
    pub status: InstallationPhase,

    /// Generation the latest pass was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Number of clusters
    #[serde(default)]
    pub clusters: u32,

    /// Number of shards across all clusters
    #[serde(default)]
    pub shards: u32,

    /// Number of hosts across all clusters
    #[serde(default)]
    pub hosts: u32,

    /// Hosts whose objects converged in the latest pass
    #[serde(default)]
    pub hosts_completed: u32,

    /// Hosts created in the latest pass
    #[serde(default)]
    pub hosts_added: u32,

    /// Hosts torn down in the latest pass
    #[serde(default)]
    pub hosts_removed: u32,

    /// Hosts with at least one failed object in the latest pass
    #[serde(default)]
    pub hosts_with_errors: u32,

    /// Most recent errors, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    /// Last action taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Installation-wide Service DNS name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Fully qualified names of every host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fqdns: Vec<String>,
}

impl ClickHouseInstallationStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: InstallationPhase) -> Self {
        Self {
            status: phase,
            ..Default::default()
        }
    }

    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: InstallationPhase) -> Self {
        self.status = phase;
        self
    }

    /// Set the last action and return self for chaining
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Record an error, keeping only the most recent ones
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        if self.errors.len() > MAX_STATUS_ERRORS {
            let overflow = self.errors.len() - MAX_STATUS_ERRORS;
            self.errors.drain(..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // YAML Manifest Stories
    // =========================================================================

    /// Story: User declares a two-shard cluster with per-shard overrides
    #[test]
    fn story_yaml_manifest_defines_sharded_cluster() {
        let yaml = r#"
defaults:
  templates:
    podTemplate: default-pod
configuration:
  settings:
    logger/level: debug
  zookeeper:
    nodes:
      - host: zookeeper.zoo
        port: 2181
  clusters:
    - name: events
      layout:
        shardsCount: 2
        replicasCount: 1
        shards:
          - name: first
            weight: 2
            internalReplication: true
templates:
  podTemplates:
    - name: default-pod
      spec:
        containers:
          - name: clickhouse
            image: clickhouse/clickhouse-server:24.3
"#;
        let spec: ClickHouseInstallationSpec = serde_yaml::from_str(yaml).unwrap();

        let cluster = &spec.configuration.clusters[0];
        assert_eq!(cluster.name, "events");
        assert_eq!(cluster.layout.shards_count, Some(2));
        assert_eq!(cluster.layout.shards[0].weight, Some(2));
        assert_eq!(cluster.layout.shards[0].internal_replication, Some(true));
        assert!(spec.configuration.settings.has("logger/level"));
        assert_eq!(
            spec.defaults.unwrap().templates.unwrap().pod_template.as_deref(),
            Some("default-pod")
        );
        let templates = spec.templates.unwrap();
        assert!(templates.pod_template("default-pod").is_some());
    }

    /// Story: An empty resource is accepted and yields defaults
    #[test]
    fn story_empty_spec_uses_defaults() {
        let spec: ClickHouseInstallationSpec = serde_yaml::from_str("{}").unwrap();
        assert!(!spec.stop);
        assert!(spec.configuration.clusters.is_empty());
    }

    // =========================================================================
    // Status Stories
    // =========================================================================

    /// Story: Status keeps only the most recent errors
    #[test]
    fn story_status_error_list_is_bounded() {
        let mut status = ClickHouseInstallationStatus::with_phase(InstallationPhase::InProgress);
        for i in 0..15 {
            status.push_error(format!("error {i}"));
        }

        assert_eq!(status.errors.len(), MAX_STATUS_ERRORS);
        assert_eq!(status.errors.first().map(String::as_str), Some("error 5"));
        assert_eq!(status.errors.last().map(String::as_str), Some("error 14"));
    }

    /// Story: Status serializes with the upstream field names
    #[test]
    fn story_status_serializes_camel_case() {
        let status = ClickHouseInstallationStatus::default()
            .phase(InstallationPhase::Completed)
            .action("reconcile completed");
        let value = serde_json::to_value(&status).unwrap();

        assert_eq!(value["status"], "Completed");
        assert_eq!(value["hostsCompleted"], 0);
        assert_eq!(value["action"], "reconcile completed");
    }
}
