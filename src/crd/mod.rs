//! Custom Resource Definitions for the ClickHouse operator
//!
//! This module contains the ClickHouseInstallation CRD and its supporting types.

mod installation;
mod types;

pub use installation::{
    ClickHouseInstallation, ClickHouseInstallationSpec, ClickHouseInstallationStatus,
    MAX_STATUS_ERRORS,
};
pub use types::{
    ClusterSpec, Configuration, Defaults, HostSpec, InstallationPhase, LayoutSpec, PodTemplate,
    ReplicaSpec, ServiceTemplate, ShardSpec, TemplateNames, Templates, VolumeClaimTemplate,
    ZookeeperConfig, ZookeeperNode,
};
