//! Host: the leaf node of the cluster tree

use std::fmt;

use crate::crd::TemplateNames;
use crate::settings::Settings;

/// Position of a host inside its installation.
///
/// Used as a non-owning back-reference: the owning cluster is
/// `installation.clusters[id.cluster]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId {
    /// Cluster index
    pub cluster: usize,
    /// Shard index within the cluster
    pub shard: usize,
    /// Replica index within the shard
    pub replica: usize,
}

impl HostId {
    /// Create a host id
    pub fn new(cluster: usize, shard: usize, replica: usize) -> Self {
        Self {
            cluster,
            shard,
            replica,
        }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.shard, self.replica)
    }
}

/// Stable identity of a host, used for names and labels
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct HostAddress {
    /// Namespace of the installation
    pub namespace: String,
    /// Installation name
    pub installation_name: String,
    /// Cluster name
    pub cluster_name: String,
    /// Cluster index
    pub cluster_index: usize,
    /// Shard name
    pub shard_name: String,
    /// Shard index
    pub shard_index: usize,
    /// Replica name
    pub replica_name: String,
    /// Replica index
    pub replica_index: usize,
    /// Host name
    pub host_name: String,
}

/// Per-pass flags set by the worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostReconcileAttributes {
    /// Host has no workload yet
    pub add: bool,
    /// Host is being torn down
    pub remove: bool,
    /// Host's objects are being changed
    pub modify: bool,
    /// Host's workload exists on the platform
    pub found: bool,
    /// Host's workload reports all replicas ready
    pub ready: bool,
}

impl HostReconcileAttributes {
    /// No flags set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `add`
    pub fn set_add(mut self) -> Self {
        self.add = true;
        self
    }

    /// Set `remove`
    pub fn set_remove(mut self) -> Self {
        self.remove = true;
        self
    }

    /// Set `modify`
    pub fn set_modify(mut self) -> Self {
        self.modify = true;
        self
    }

    /// Set `found`
    pub fn set_found(mut self) -> Self {
        self.found = true;
        self
    }

    /// Set `ready`
    pub fn set_ready(mut self) -> Self {
        self.ready = true;
        self
    }

    /// True if any flag is set
    pub fn any(&self) -> bool {
        self.add || self.remove || self.modify || self.found || self.ready
    }

    /// True if any flag set in `other` is also set in `self`
    pub fn intersects(&self, other: &HostReconcileAttributes) -> bool {
        (self.add && other.add)
            || (self.remove && other.remove)
            || (self.modify && other.modify)
            || (self.found && other.found)
            || (self.ready && other.ready)
    }
}

impl fmt::Display for HostReconcileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            ("add", self.add),
            ("remove", self.remove),
            ("modify", self.modify),
            ("found", self.found),
            ("ready", self.ready),
        ];
        let set: Vec<&str> = flags
            .iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect();
        write!(f, "[{}]", set.join(","))
    }
}

/// One addressable ClickHouse server
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    /// Position in the installation
    pub id: HostId,
    /// Stable identity
    pub address: HostAddress,
    /// Native protocol port
    pub tcp_port: i32,
    /// HTTP interface port
    pub http_port: i32,
    /// Replication port
    pub interserver_http_port: i32,
    /// Resolved host-scoped settings
    pub settings: Settings,
    /// Resolved host-section files
    pub files: Settings,
    /// Resolved template names
    pub templates: TemplateNames,
    /// Flags for the current reconcile pass
    pub attributes: HostReconcileAttributes,
}

impl Host {
    /// Create a host with no ports assigned
    pub fn new(id: HostId, address: HostAddress) -> Self {
        Self {
            id,
            address,
            tcp_port: 0,
            http_port: 0,
            interserver_http_port: 0,
            settings: Settings::new(),
            files: Settings::new(),
            templates: TemplateNames::default(),
            attributes: HostReconcileAttributes::default(),
        }
    }

    /// Host name
    pub fn name(&self) -> &str {
        &self.address.host_name
    }

    /// Namespace of the host's objects
    pub fn namespace(&self) -> &str {
        &self.address.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_requires_a_common_flag() {
        let host = HostReconcileAttributes::new().set_add().set_found();
        let exclude = HostReconcileAttributes::new().set_add().set_remove();

        assert!(host.intersects(&exclude));
        assert!(!HostReconcileAttributes::new()
            .set_ready()
            .intersects(&exclude));
        assert!(!host.intersects(&HostReconcileAttributes::new()));
    }

    #[test]
    fn any_reports_set_flags() {
        assert!(!HostReconcileAttributes::new().any());
        assert!(HostReconcileAttributes::new().set_modify().any());
    }

    #[test]
    fn attributes_display_lists_set_flags() {
        let attrs = HostReconcileAttributes::new().set_add().set_ready();
        assert_eq!(attrs.to_string(), "[add,ready]");
    }
}
