//! Installation: the root of the cluster tree

use crate::crd::{TemplateNames, Templates, ZookeeperConfig};
use crate::settings::Settings;
use crate::Result;

use super::cluster::Cluster;
use super::host::{Host, HostId};
use super::{Locator, WalkResults};

/// Normalized ClickHouseInstallation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Installation {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
    /// UID of the custom resource, used for owner references
    pub uid: Option<String>,
    /// Generation of the custom resource
    pub generation: Option<i64>,
    /// Scale workloads to zero
    pub stop: bool,
    /// Installation-wide server settings
    pub settings: Settings,
    /// Installation-wide files (all sections)
    pub files: Settings,
    /// User definitions
    pub users: Settings,
    /// Settings profiles
    pub profiles: Settings,
    /// Quotas
    pub quotas: Settings,
    /// Coordination service
    pub zookeeper: ZookeeperConfig,
    /// Default template names
    pub defaults: TemplateNames,
    /// Template definitions
    pub templates: Templates,
    /// Clusters in index order
    pub clusters: Vec<Cluster>,
    /// Hosts observed on the platform with no place in the spec
    pub removed: Vec<Host>,
}

impl Installation {
    /// Visit every cluster
    pub fn walk_clusters<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(&Cluster) -> Result<()>,
    {
        self.clusters.iter().map(|cluster| f(cluster)).collect()
    }

    /// Visit every host, cluster by cluster
    pub fn walk_hosts<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(&Host) -> Result<()>,
    {
        self.hosts().map(|host| f(host)).collect()
    }

    /// Visit every host mutably, cluster by cluster
    pub fn walk_hosts_mut<F>(&mut self, mut f: F) -> WalkResults
    where
        F: FnMut(&mut Host) -> Result<()>,
    {
        let mut results = WalkResults::default();
        for cluster in &mut self.clusters {
            results.extend(cluster.hosts_mut().map(|host| f(host)));
        }
        results
    }

    /// Every host in cluster, shard, replica order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.clusters.iter().flat_map(Cluster::hosts)
    }

    /// Cluster matching the locator
    pub fn find_cluster(&self, locator: Locator<'_>) -> Option<&Cluster> {
        match locator {
            Locator::Name(name) => self.clusters.iter().find(|c| c.name == name),
            Locator::Index(index) => self.clusters.get(index),
        }
    }

    /// Resolve a host back-reference
    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.clusters.get(id.cluster)?.host(id.shard, id.replica)
    }

    /// Resolve a host back-reference mutably
    pub fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.clusters
            .get_mut(id.cluster)?
            .host_mut(id.shard, id.replica)
    }

    /// Owning cluster of a host
    pub fn cluster_of(&self, host: &Host) -> Option<&Cluster> {
        self.clusters.get(host.id.cluster)
    }

    /// First host of the first cluster that has one
    pub fn first_host(&self) -> Option<&Host> {
        self.hosts().next()
    }

    /// Number of hosts across all clusters
    pub fn hosts_count(&self) -> usize {
        let mut count = 0;
        let _ = self.walk_hosts(|_| {
            count += 1;
            Ok(())
        });
        count
    }

    /// Number of shards across all clusters
    pub fn shards_count(&self) -> usize {
        self.clusters.iter().map(|c| c.shards.len()).sum()
    }
}
