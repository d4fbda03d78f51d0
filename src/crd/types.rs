//! Supporting types for the ClickHouseInstallation CRD

use k8s_openapi::api::core::v1::{PersistentVolumeClaimSpec, PodSpec, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::settings::{MergeType, Settings};

/// Installation-wide defaults inherited by every cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    /// Template names applied to every cluster unless overridden
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateNames>,
}

/// `.spec.configuration`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Server settings shared by every host
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,

    /// Extra configuration files keyed by `section/filename`
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub files: Settings,

    /// User definitions (`user/field` paths)
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub users: Settings,

    /// Settings profiles (`profile/setting` paths)
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub profiles: Settings,

    /// Quotas (`quota/interval/field` paths)
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub quotas: Settings,

    /// Coordination service used for replication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper: Option<ZookeeperConfig>,

    /// Clusters of this installation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterSpec>,
}

/// ZooKeeper / Keeper connection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperConfig {
    /// Ensemble members
    #[serde(default)]
    pub nodes: Vec<ZookeeperNode>,
    /// Session timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_ms: Option<u32>,
    /// Operation timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u32>,
    /// Root znode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// `user:password` digest identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// A single ensemble member
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperNode {
    /// Hostname
    pub host: String,
    /// Client port (2181 when omitted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// `.spec.configuration.clusters[]`
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster name, used in object names and in `remote_servers`
    pub name: String,

    /// Host-scoped settings inherited by every host of the cluster
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,

    /// Files inherited by every host of the cluster
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub files: Settings,

    /// Template names for this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateNames>,

    /// Shard × replica layout
    #[serde(default)]
    pub layout: LayoutSpec,
}

/// Cluster layout: counts or explicit shard/replica lists
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSpec {
    /// Number of shards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards_count: Option<u32>,
    /// Number of replicas per shard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas_count: Option<u32>,
    /// Explicit shards; takes precedence over `replicas`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<ShardSpec>,
    /// Explicit replicas, used when no shards are listed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<ReplicaSpec>,
}

/// Explicit shard definition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShardSpec {
    /// Shard name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Weight in `remote_servers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// `internal_replication` flag in `remote_servers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_replication: Option<bool>,
    /// Host-scoped settings
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
    /// Host-scoped files
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub files: Settings,
    /// Template names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateNames>,
    /// Number of replicas in this shard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas_count: Option<u32>,
    /// Explicit hosts of this shard
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replicas: Vec<HostSpec>,
}

/// Explicit replica definition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    /// Replica name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Host-scoped settings
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
    /// Host-scoped files
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub files: Settings,
    /// Template names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateNames>,
    /// Number of shards in this replica
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards_count: Option<u32>,
    /// Explicit hosts of this replica
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<HostSpec>,
}

/// Explicit host definition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    /// Host name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Native protocol port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<i32>,
    /// HTTP interface port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<i32>,
    /// Replication port
    #[serde(
        default,
        rename = "interserverHTTPPort",
        skip_serializing_if = "Option::is_none"
    )]
    pub interserver_http_port: Option<i32>,
    /// Host-scoped settings
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
    /// Host-scoped files
    #[serde(default, skip_serializing_if = "Settings::is_empty")]
    pub files: Settings,
    /// Template names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateNames>,
}

/// Names of templates referenced from a level of the tree
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateNames {
    /// Host template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_template: Option<String>,
    /// Pod template for the host's StatefulSet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<String>,
    /// Volume claim template mounted at the data path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume_claim_template: Option<String>,
    /// Volume claim template mounted at the log path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_volume_claim_template: Option<String>,
    /// Service template for the installation-wide Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_template: Option<String>,
    /// Service template for a cluster Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_template: Option<String>,
    /// Service template for a shard Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_service_template: Option<String>,
    /// Service template for a host Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_service_template: Option<String>,
}

impl TemplateNames {
    /// Merge template names field by field under the given policy
    pub fn merge_from(&mut self, from: &TemplateNames, merge: MergeType) {
        fn merge_field(dst: &mut Option<String>, src: &Option<String>, merge: MergeType) {
            match merge {
                MergeType::FillEmptyOnly => {
                    if dst.is_none() {
                        dst.clone_from(src);
                    }
                }
                MergeType::Override => {
                    if src.is_some() {
                        dst.clone_from(src);
                    }
                }
            }
        }

        merge_field(&mut self.host_template, &from.host_template, merge);
        merge_field(&mut self.pod_template, &from.pod_template, merge);
        merge_field(
            &mut self.data_volume_claim_template,
            &from.data_volume_claim_template,
            merge,
        );
        merge_field(
            &mut self.log_volume_claim_template,
            &from.log_volume_claim_template,
            merge,
        );
        merge_field(&mut self.service_template, &from.service_template, merge);
        merge_field(
            &mut self.cluster_service_template,
            &from.cluster_service_template,
            merge,
        );
        merge_field(
            &mut self.shard_service_template,
            &from.shard_service_template,
            merge,
        );
        merge_field(
            &mut self.replica_service_template,
            &from.replica_service_template,
            merge,
        );
    }
}

/// `.spec.templates`: template definitions referenced by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Templates {
    /// Pod templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_templates: Vec<PodTemplate>,
    /// Volume claim templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<VolumeClaimTemplate>,
    /// Service templates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_templates: Vec<ServiceTemplate>,
}

impl Templates {
    /// Pod template by name
    pub fn pod_template(&self, name: &str) -> Option<&PodTemplate> {
        self.pod_templates.iter().find(|t| t.name == name)
    }

    /// Volume claim template by name
    pub fn volume_claim_template(&self, name: &str) -> Option<&VolumeClaimTemplate> {
        self.volume_claim_templates.iter().find(|t| t.name == name)
    }

    /// Service template by name
    pub fn service_template(&self, name: &str) -> Option<&ServiceTemplate> {
        self.service_templates.iter().find(|t| t.name == name)
    }
}

/// Named pod template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    /// Template name
    pub name: String,
    /// Pod metadata merged into the StatefulSet's pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    /// Pod spec
    #[serde(default)]
    pub spec: PodSpec,
}

/// Named volume claim template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimTemplate {
    /// Template name, also the claim and volume mount name
    pub name: String,
    /// Claim metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    /// Claim spec
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
}

/// Named service template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Template name
    pub name: String,
    /// Service metadata; name and namespace are always overwritten
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Service spec
    #[serde(default)]
    pub spec: ServiceSpec,
}

/// Installation reconcile status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum InstallationPhase {
    /// Not reconciled yet
    #[default]
    Pending,
    /// A reconcile pass is running
    InProgress,
    /// Last pass converged every object
    Completed,
    /// Last pass finished with errors
    Aborted,
}

impl std::fmt::Display for InstallationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Completed => write!(f, "Completed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}
