//! Cluster, shard and replica nodes

use crate::crd::TemplateNames;
use crate::settings::{MergeType, Settings, SettingsSection};
use crate::Result;

use super::host::{Host, HostAddress, HostId};
use super::{Locator, WalkResults};

/// A shard: one row of the host matrix
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shard {
    /// Shard name
    pub name: String,
    /// Shard index
    pub index: usize,
    /// Weight in `remote_servers`
    pub weight: Option<u32>,
    /// `internal_replication` in `remote_servers`
    pub internal_replication: Option<bool>,
    /// Host-scoped settings for hosts of this shard
    pub settings: Settings,
    /// Host-section files for hosts of this shard
    pub files: Settings,
    /// Template names for hosts of this shard
    pub templates: TemplateNames,
}

impl Shard {
    fn new(index: usize) -> Self {
        Self {
            name: index.to_string(),
            index,
            ..Default::default()
        }
    }
}

/// A replica: one column of the host matrix
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Replica {
    /// Replica name
    pub name: String,
    /// Replica index
    pub index: usize,
    /// Host-scoped settings for hosts of this replica
    pub settings: Settings,
    /// Host-section files for hosts of this replica
    pub files: Settings,
    /// Template names for hosts of this replica
    pub templates: TemplateNames,
}

impl Replica {
    fn new(index: usize) -> Self {
        Self {
            name: index.to_string(),
            index,
            ..Default::default()
        }
    }
}

/// A named cluster of hosts
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cluster {
    /// Cluster name
    pub name: String,
    /// Cluster index in the installation
    pub index: usize,
    /// Namespace of the owning installation
    pub namespace: String,
    /// Name of the owning installation
    pub installation_name: String,
    /// Settings inherited by every host
    pub settings: Settings,
    /// Files inherited by every host
    pub files: Settings,
    /// Template names inherited by every host
    pub templates: TemplateNames,
    /// Shards in index order
    pub shards: Vec<Shard>,
    /// Replicas in index order
    pub replicas: Vec<Replica>,
    hosts: Vec<Vec<Option<Host>>>,
}

impl Cluster {
    /// Create an empty cluster
    pub fn new(
        namespace: impl Into<String>,
        installation_name: impl Into<String>,
        name: impl Into<String>,
        index: usize,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            namespace: namespace.into(),
            installation_name: installation_name.into(),
            ..Default::default()
        }
    }

    /// Inherit the installation's host-section files, keeping the cluster's own
    pub fn inherit_files_from(&mut self, installation_files: &Settings) {
        self.files.merge_from_cb(installation_files, |path, _| {
            matches!(SettingsSection::from_path(path), Ok(SettingsSection::Host))
        });
    }

    /// Inherit installation default templates, keeping the cluster's own
    pub fn inherit_templates_from(&mut self, defaults: &TemplateNames) {
        self.templates.merge_from(defaults, MergeType::FillEmptyOnly);
    }

    /// Shard at `index`, created with default name if missing
    pub fn get_or_create_shard(&mut self, index: usize) -> &mut Shard {
        while self.shards.len() <= index {
            let next = self.shards.len();
            self.shards.push(Shard::new(next));
        }
        &mut self.shards[index]
    }

    /// Replica at `index`, created with default name if missing
    pub fn get_or_create_replica(&mut self, index: usize) -> &mut Replica {
        while self.replicas.len() <= index {
            let next = self.replicas.len();
            self.replicas.push(Replica::new(next));
        }
        &mut self.replicas[index]
    }

    /// Host at (`shard`, `replica`), creating shard, replica and host as needed.
    ///
    /// Idempotent: a second call returns the existing host unchanged.
    pub fn get_or_create_host(&mut self, shard: usize, replica: usize) -> &mut Host {
        self.get_or_create_shard(shard);
        self.get_or_create_replica(replica);
        while self.hosts.len() <= shard {
            self.hosts.push(Vec::new());
        }

        let address = HostAddress {
            namespace: self.namespace.clone(),
            installation_name: self.installation_name.clone(),
            cluster_name: self.name.clone(),
            cluster_index: self.index,
            shard_name: self.shards[shard].name.clone(),
            shard_index: shard,
            replica_name: self.replicas[replica].name.clone(),
            replica_index: replica,
            host_name: format!("{}-{}", self.shards[shard].name, self.replicas[replica].name),
        };
        let id = HostId::new(self.index, shard, replica);

        let row = &mut self.hosts[shard];
        while row.len() <= replica {
            row.push(None);
        }
        row[replica].get_or_insert_with(|| Host::new(id, address))
    }

    /// Host at (`shard`, `replica`), if materialized
    pub fn host(&self, shard: usize, replica: usize) -> Option<&Host> {
        self.hosts.get(shard)?.get(replica)?.as_ref()
    }

    /// Mutable host at (`shard`, `replica`), if materialized
    pub fn host_mut(&mut self, shard: usize, replica: usize) -> Option<&mut Host> {
        self.hosts.get_mut(shard)?.get_mut(replica)?.as_mut()
    }

    /// Hosts of one shard in replica order
    pub fn shard_hosts(&self, shard: usize) -> impl Iterator<Item = &Host> {
        self.hosts
            .get(shard)
            .into_iter()
            .flat_map(|row| row.iter().flatten())
    }

    /// Hosts of one replica in shard order
    pub fn replica_hosts(&self, replica: usize) -> impl Iterator<Item = &Host> + '_ {
        self.hosts
            .iter()
            .filter_map(move |row| row.get(replica).and_then(Option::as_ref))
    }

    /// Every host in shard-then-replica order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter().flat_map(|row| row.iter().flatten())
    }

    /// Every host in shard-then-replica order, mutably
    pub fn hosts_mut(&mut self) -> impl Iterator<Item = &mut Host> {
        self.hosts.iter_mut().flat_map(|row| row.iter_mut().flatten())
    }

    /// Visit every shard
    pub fn walk_shards<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(usize, &Shard) -> Result<()>,
    {
        self.shards
            .iter()
            .enumerate()
            .map(|(index, shard)| f(index, shard))
            .collect()
    }

    /// Visit every replica
    pub fn walk_replicas<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(usize, &Replica) -> Result<()>,
    {
        self.replicas
            .iter()
            .enumerate()
            .map(|(index, replica)| f(index, replica))
            .collect()
    }

    /// Visit every host in shard-then-replica order
    pub fn walk_hosts<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(&Host) -> Result<()>,
    {
        self.hosts().map(|host| f(host)).collect()
    }

    /// Visit every host mutably in shard-then-replica order
    pub fn walk_hosts_mut<F>(&mut self, mut f: F) -> WalkResults
    where
        F: FnMut(&mut Host) -> Result<()>,
    {
        self.hosts_mut().map(|host| f(host)).collect()
    }

    /// Visit every host shard by shard, passing (shard, replica) indices
    pub fn walk_hosts_by_shards<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(usize, usize, &Host) -> Result<()>,
    {
        self.hosts()
            .map(|host| f(host.id.shard, host.id.replica, host))
            .collect()
    }

    /// Visit every host replica by replica, passing (shard, replica) indices
    pub fn walk_hosts_by_replicas<F>(&self, mut f: F) -> WalkResults
    where
        F: FnMut(usize, usize, &Host) -> Result<()>,
    {
        let width = self.hosts.iter().map(Vec::len).max().unwrap_or(0);
        (0..width)
            .flat_map(|replica| self.replica_hosts(replica).collect::<Vec<_>>())
            .map(|host| f(host.id.shard, host.id.replica, host))
            .collect()
    }

    /// First shard matching the locator
    pub fn find_shard(&self, locator: Locator<'_>) -> Option<&Shard> {
        match locator {
            Locator::Name(name) => self.shards.iter().find(|s| s.name == name),
            Locator::Index(index) => self.shards.get(index),
        }
    }

    /// Host within a shard; the host is located by host name or replica index
    pub fn find_host(&self, shard: Locator<'_>, host: Locator<'_>) -> Option<&Host> {
        let shard = self.find_shard(shard)?.index;
        match host {
            Locator::Name(name) => self.shard_hosts(shard).find(|h| h.name() == name),
            Locator::Index(index) => self.host(shard, index),
        }
    }

    /// First host in shard-then-replica order
    pub fn first_host(&self) -> Option<&Host> {
        self.hosts().next()
    }

    /// Number of hosts
    pub fn hosts_count(&self) -> usize {
        let mut count = 0;
        let _ = self.walk_hosts(|_| {
            count += 1;
            Ok(())
        });
        count
    }
}
