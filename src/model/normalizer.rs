//! Builds the cluster object model from a ClickHouseInstallation

use std::collections::HashSet;

use kube::ResourceExt;
use tracing::debug;

use crate::config::DefaultsConfig;
use crate::crd::{ClickHouseInstallation, ClusterSpec, HostSpec, TemplateNames};
use crate::settings::{MergeType, Settings, SettingsSection};
use crate::{Error, Result};

use super::cluster::Cluster;
use super::host::Host;
use super::installation::Installation;

/// Level a host inherits from directly
struct Parent<'a> {
    settings: &'a Settings,
    files: &'a Settings,
    templates: &'a TemplateNames,
}

fn is_host_section(path: &str) -> bool {
    matches!(SettingsSection::from_path(path), Ok(SettingsSection::Host))
}

/// Turns a custom resource into an [`Installation`]
pub struct Normalizer<'a> {
    defaults: &'a DefaultsConfig,
}

impl<'a> Normalizer<'a> {
    /// Create a normalizer applying the given operator defaults
    pub fn new(defaults: &'a DefaultsConfig) -> Self {
        Self { defaults }
    }

    /// Normalize a resource
    pub fn normalize(&self, chi: &ClickHouseInstallation) -> Result<Installation> {
        let name = chi.name_any();
        let namespace = chi
            .namespace()
            .ok_or_else(|| Error::validation(&name, "installation has no namespace"))?;
        let spec = &chi.spec;
        let configuration = &spec.configuration;

        let mut installation = Installation {
            namespace,
            name,
            uid: chi.uid(),
            generation: chi.metadata.generation,
            stop: spec.stop,
            settings: configuration.settings.clone(),
            files: configuration.files.clone(),
            users: configuration.users.clone(),
            profiles: configuration.profiles.clone(),
            quotas: configuration.quotas.clone(),
            zookeeper: configuration.zookeeper.clone().unwrap_or_default(),
            defaults: spec
                .defaults
                .as_ref()
                .and_then(|d| d.templates.clone())
                .unwrap_or_default(),
            templates: spec.templates.clone().unwrap_or_default(),
            clusters: Vec::with_capacity(configuration.clusters.len()),
            removed: Vec::new(),
        };

        let mut seen = HashSet::new();
        for (index, cluster_spec) in configuration.clusters.iter().enumerate() {
            if cluster_spec.name.is_empty() {
                return Err(Error::validation(
                    &installation.name,
                    format!("cluster {index} has no name"),
                ));
            }
            if !seen.insert(cluster_spec.name.as_str()) {
                return Err(Error::validation(
                    &installation.name,
                    format!("duplicate cluster name '{}'", cluster_spec.name),
                ));
            }
            let cluster = self.normalize_cluster(&installation, cluster_spec, index)?;
            installation.clusters.push(cluster);
        }

        debug!(
            chi = %installation.name,
            namespace = %installation.namespace,
            clusters = installation.clusters.len(),
            hosts = installation.hosts_count(),
            "normalized installation"
        );
        Ok(installation)
    }

    fn normalize_cluster(
        &self,
        installation: &Installation,
        spec: &ClusterSpec,
        index: usize,
    ) -> Result<Cluster> {
        let mut cluster = Cluster::new(
            &installation.namespace,
            &installation.name,
            &spec.name,
            index,
        );
        cluster.settings = spec.settings.clone();
        cluster.files = spec.files.clone();
        cluster.templates = spec.templates.clone().unwrap_or_default();
        cluster.inherit_templates_from(&installation.defaults);
        cluster.inherit_files_from(&installation.files);

        let layout = &spec.layout;
        if !layout.shards.is_empty() || layout.replicas.is_empty() {
            self.build_shard_based(&mut cluster, spec);
        } else {
            self.build_replica_based(&mut cluster, spec);
        }
        check_unique_names(&installation.name, &cluster)?;
        Ok(cluster)
    }

    fn build_shard_based(&self, cluster: &mut Cluster, spec: &ClusterSpec) {
        let layout = &spec.layout;
        let shards_count = count(layout.shards_count, layout.shards.len());

        for shard_index in 0..shards_count {
            let shard_spec = layout.shards.get(shard_index);
            let replicas_count = shard_spec
                .map(|s| count(s.replicas_count, s.replicas.len()))
                .unwrap_or(1)
                .max(layout.replicas_count.unwrap_or(0) as usize);

            let parent_settings = cluster.settings.clone();
            let parent_files = cluster.files.clone();
            let parent_templates = cluster.templates.clone();
            let shard = cluster.get_or_create_shard(shard_index);
            if let Some(shard_spec) = shard_spec {
                if let Some(name) = shard_spec.name.as_ref().filter(|n| !n.is_empty()) {
                    shard.name = name.clone();
                }
                shard.weight = shard_spec.weight;
                shard.internal_replication = shard_spec.internal_replication;
                shard.settings = shard_spec.settings.clone();
                shard.files = shard_spec.files.clone();
                shard.templates = shard_spec.templates.clone().unwrap_or_default();
            }
            shard.settings.merge_from(&parent_settings, MergeType::FillEmptyOnly);
            shard.files.merge_from_cb(&parent_files, |path, _| is_host_section(path));
            shard.templates.merge_from(&parent_templates, MergeType::FillEmptyOnly);
            let shard = shard.clone();

            for replica_index in 0..replicas_count {
                cluster.get_or_create_replica(replica_index);
                let host_spec = shard_spec.and_then(|s| s.replicas.get(replica_index));
                let parent = Parent {
                    settings: &shard.settings,
                    files: &shard.files,
                    templates: &shard.templates,
                };
                let host = cluster.get_or_create_host(shard_index, replica_index);
                self.normalize_host(host, host_spec, &parent);
            }
        }
    }

    fn build_replica_based(&self, cluster: &mut Cluster, spec: &ClusterSpec) {
        let layout = &spec.layout;
        let replicas_count = count(layout.replicas_count, layout.replicas.len());

        for replica_index in 0..replicas_count {
            let replica_spec = layout.replicas.get(replica_index);
            let shards_count = replica_spec
                .map(|r| count(r.shards_count, r.shards.len()))
                .unwrap_or(1)
                .max(layout.shards_count.unwrap_or(0) as usize);

            let parent_settings = cluster.settings.clone();
            let parent_files = cluster.files.clone();
            let parent_templates = cluster.templates.clone();
            let replica = cluster.get_or_create_replica(replica_index);
            if let Some(replica_spec) = replica_spec {
                if let Some(name) = replica_spec.name.as_ref().filter(|n| !n.is_empty()) {
                    replica.name = name.clone();
                }
                replica.settings = replica_spec.settings.clone();
                replica.files = replica_spec.files.clone();
                replica.templates = replica_spec.templates.clone().unwrap_or_default();
            }
            replica.settings.merge_from(&parent_settings, MergeType::FillEmptyOnly);
            replica.files.merge_from_cb(&parent_files, |path, _| is_host_section(path));
            replica.templates.merge_from(&parent_templates, MergeType::FillEmptyOnly);
            let replica = replica.clone();

            for shard_index in 0..shards_count {
                cluster.get_or_create_shard(shard_index);
                let host_spec = replica_spec.and_then(|r| r.shards.get(shard_index));
                let parent = Parent {
                    settings: &replica.settings,
                    files: &replica.files,
                    templates: &replica.templates,
                };
                let host = cluster.get_or_create_host(shard_index, replica_index);
                self.normalize_host(host, host_spec, &parent);
            }
        }
    }

    fn normalize_host(&self, host: &mut Host, spec: Option<&HostSpec>, parent: &Parent<'_>) {
        if let Some(spec) = spec {
            if let Some(name) = spec.name.as_ref().filter(|n| !n.is_empty()) {
                host.address.host_name = name.clone();
            }
            host.tcp_port = spec.tcp_port.unwrap_or(0);
            host.http_port = spec.http_port.unwrap_or(0);
            host.interserver_http_port = spec.interserver_http_port.unwrap_or(0);
            host.settings = spec.settings.clone();
            host.files = spec.files.clone();
            host.templates = spec.templates.clone().unwrap_or_default();
        }

        if host.tcp_port == 0 {
            host.tcp_port = self.defaults.tcp_port;
        }
        if host.http_port == 0 {
            host.http_port = self.defaults.http_port;
        }
        if host.interserver_http_port == 0 {
            host.interserver_http_port = self.defaults.interserver_http_port;
        }

        host.settings.merge_from(parent.settings, MergeType::FillEmptyOnly);
        host.files.merge_from_cb(parent.files, |path, _| is_host_section(path));
        host.templates.merge_from(parent.templates, MergeType::FillEmptyOnly);
    }
}

/// Object names derive from shard and replica names, so two shards (or two
/// replicas) sharing a name would map two hosts onto one StatefulSet.
fn check_unique_names(installation: &str, cluster: &Cluster) -> Result<()> {
    let mut shards = HashSet::new();
    if let Some(shard) = cluster.shards.iter().find(|s| !shards.insert(s.name.as_str())) {
        return Err(Error::validation(
            installation,
            format!("duplicate shard name '{}' in cluster '{}'", shard.name, cluster.name),
        ));
    }
    let mut replicas = HashSet::new();
    if let Some(replica) = cluster.replicas.iter().find(|r| !replicas.insert(r.name.as_str())) {
        return Err(Error::validation(
            installation,
            format!("duplicate replica name '{}' in cluster '{}'", replica.name, cluster.name),
        ));
    }
    let mut hosts = HashSet::new();
    if let Some(host) = cluster.hosts().find(|h| !hosts.insert(h.name())) {
        return Err(Error::validation(
            installation,
            format!("duplicate host name '{}' in cluster '{}'", host.name(), cluster.name),
        ));
    }
    Ok(())
}

/// `max(explicit count, listed items, 1)`
fn count(explicit: Option<u32>, listed: usize) -> usize {
    (explicit.unwrap_or(0) as usize).max(listed).max(1)
}
