//! Per-call generator options
//!
//! Built fresh for every generation call and never stored.

use std::fmt;

use crate::model::{Host, HostId, HostReconcileAttributes};

/// Which hosts to leave out of the peer list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteServersGeneratorOptions {
    excluded_hosts: Vec<HostId>,
    excluded_attributes: HostReconcileAttributes,
}

impl RemoteServersGeneratorOptions {
    /// Options that exclude nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude one host
    pub fn exclude_host(mut self, host: &Host) -> Self {
        self.excluded_hosts.push(host.id);
        self
    }

    /// Exclude several hosts
    pub fn exclude_hosts<'a>(mut self, hosts: impl IntoIterator<Item = &'a Host>) -> Self {
        self.excluded_hosts.extend(hosts.into_iter().map(|h| h.id));
        self
    }

    /// Exclude hosts by id
    pub fn exclude_host_ids(mut self, ids: impl IntoIterator<Item = HostId>) -> Self {
        self.excluded_hosts.extend(ids);
        self
    }

    /// Exclude every host carrying any flag set in `attributes`
    pub fn exclude_reconcile_attributes(mut self, attributes: HostReconcileAttributes) -> Self {
        self.excluded_attributes = attributes;
        self
    }

    /// True if the host must not be listed as a peer
    pub fn exclude(&self, host: &Host) -> bool {
        host.attributes.intersects(&self.excluded_attributes)
            || self.excluded_hosts.contains(&host.id)
    }

    /// True if the host is listed as a peer; always `!exclude(host)`
    pub fn include(&self, host: &Host) -> bool {
        !self.exclude(host)
    }
}

impl fmt::Display for RemoteServersGeneratorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<String> = self.excluded_hosts.iter().map(HostId::to_string).collect();
        write!(
            f,
            "exclude hosts: [{}], attributes: {}",
            hosts.join(","),
            self.excluded_attributes
        )
    }
}

/// Options for one files-generation call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigGeneratorOptions {
    /// Peer-list exclusions
    pub remote_servers: RemoteServersGeneratorOptions,
}

impl ConfigGeneratorOptions {
    /// Options with the given peer-list exclusions
    pub fn with_remote_servers(remote_servers: RemoteServersGeneratorOptions) -> Self {
        Self { remote_servers }
    }
}
