//! ClickHouse server configuration files

use std::collections::BTreeMap;

use crate::creator::names;
use crate::model::{Cluster, Host, Installation};
use crate::settings::{Settings, SettingsSection};

use super::options::{ConfigGeneratorOptions, RemoteServersGeneratorOptions};
use super::xml::XmlWriter;
use super::{
    ConfigFilesGenerator, FILE_HOSTNAME_PORTS, FILE_HOST_SETTINGS, FILE_MACROS, FILE_PROFILES,
    FILE_QUOTAS, FILE_REMOTE_SERVERS, FILE_SETTINGS, FILE_USERS, FILE_ZOOKEEPER,
};

/// Name of the generated cluster listing every host as its own shard
pub const ALL_SHARDED_CLUSTER: &str = "all-sharded";

const DEFAULT_ZOOKEEPER_PORT: i32 = 2181;

/// Generator for `clickhouse-server` files
#[derive(Clone, Copy, Debug, Default)]
pub struct ClickHouseFilesGenerator;

impl ClickHouseFilesGenerator {
    /// `remote_servers` section listing only included hosts
    pub fn remote_servers(
        &self,
        installation: &Installation,
        options: &RemoteServersGeneratorOptions,
    ) -> String {
        let mut w = XmlWriter::document();
        w.open_with("remote_servers", "replace", "true");

        for cluster in &installation.clusters {
            write_cluster(&mut w, cluster, options);
        }

        let included: Vec<&Host> = installation
            .hosts()
            .filter(|host| options.include(host))
            .collect();
        if !included.is_empty() {
            w.open(ALL_SHARDED_CLUSTER);
            for host in included {
                w.open("shard");
                w.element("internal_replication", false);
                write_replica(&mut w, host);
                w.close("shard");
            }
            w.close(ALL_SHARDED_CLUSTER);
        }

        w.close("remote_servers");
        w.finish()
    }

    fn zookeeper(&self, installation: &Installation) -> Option<String> {
        let zookeeper = &installation.zookeeper;
        if zookeeper.nodes.is_empty() {
            return None;
        }

        let mut w = XmlWriter::document();
        w.open("zookeeper");
        for node in &zookeeper.nodes {
            w.open("node");
            w.element("host", &node.host);
            w.element("port", node.port.unwrap_or(DEFAULT_ZOOKEEPER_PORT));
            w.close("node");
        }
        if let Some(timeout) = zookeeper.session_timeout_ms {
            w.element("session_timeout_ms", timeout);
        }
        if let Some(timeout) = zookeeper.operation_timeout_ms {
            w.element("operation_timeout_ms", timeout);
        }
        if let Some(root) = &zookeeper.root {
            w.element("root", root);
        }
        if let Some(identity) = &zookeeper.identity {
            w.element("identity", identity);
        }
        w.close("zookeeper");

        w.open("distributed_ddl");
        w.element(
            "path",
            format!("/clickhouse/{}/task_queue/ddl", installation.name),
        );
        w.close("distributed_ddl");
        Some(w.finish())
    }

    fn section(tag: &str, settings: &Settings) -> String {
        let mut w = XmlWriter::document();
        w.open(tag);
        w.settings(settings);
        w.close(tag);
        w.finish()
    }

    fn macros(&self, host: &Host) -> String {
        let address = &host.address;
        let mut w = XmlWriter::document();
        w.open("macros");
        w.element("installation", &address.installation_name);
        w.element("cluster", &address.cluster_name);
        w.element("shard", &address.shard_name);
        w.element("replica", names::host_service(address));
        w.close("macros");
        w.finish()
    }

    fn hostname_ports(&self, host: &Host) -> String {
        let mut w = XmlWriter::document();
        w.element("interserver_http_host", names::host_service(&host.address));
        w.element("http_port", host.http_port);
        w.element("tcp_port", host.tcp_port);
        w.element("interserver_http_port", host.interserver_http_port);
        w.finish()
    }
}

fn write_cluster(w: &mut XmlWriter, cluster: &Cluster, options: &RemoteServersGeneratorOptions) {
    let shards: Vec<(usize, Vec<&Host>)> = cluster
        .shards
        .iter()
        .map(|shard| {
            let hosts = cluster
                .shard_hosts(shard.index)
                .filter(|host| options.include(host))
                .collect::<Vec<_>>();
            (shard.index, hosts)
        })
        .filter(|(_, hosts)| !hosts.is_empty())
        .collect();
    if shards.is_empty() {
        return;
    }

    w.open(&cluster.name);
    for (index, hosts) in shards {
        let shard = &cluster.shards[index];
        let replicated = cluster.shard_hosts(index).count() > 1;
        w.open("shard");
        if let Some(weight) = shard.weight {
            w.element("weight", weight);
        }
        w.element(
            "internal_replication",
            shard.internal_replication.unwrap_or(replicated),
        );
        for host in hosts {
            write_replica(w, host);
        }
        w.close("shard");
    }
    w.close(&cluster.name);
}

fn write_replica(w: &mut XmlWriter, host: &Host) {
    w.open("replica");
    w.element("host", names::host_service(&host.address));
    w.element("port", host.tcp_port);
    w.close("replica");
}

impl ConfigFilesGenerator for ClickHouseFilesGenerator {
    fn common_files(
        &self,
        installation: &Installation,
        options: &ConfigGeneratorOptions,
    ) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert(
            FILE_REMOTE_SERVERS.to_string(),
            self.remote_servers(installation, &options.remote_servers),
        );
        if let Some(zookeeper) = self.zookeeper(installation) {
            files.insert(FILE_ZOOKEEPER.to_string(), zookeeper);
        }
        if !installation.settings.is_empty() {
            let mut w = XmlWriter::document();
            w.settings(&installation.settings);
            files.insert(FILE_SETTINGS.to_string(), w.finish());
        }
        files.extend(installation.files.section(SettingsSection::Common, true));
        files
    }

    fn users_files(&self, installation: &Installation) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert(
            FILE_USERS.to_string(),
            Self::section("users", &installation.users),
        );
        files.insert(
            FILE_PROFILES.to_string(),
            Self::section("profiles", &installation.profiles),
        );
        files.insert(
            FILE_QUOTAS.to_string(),
            Self::section("quotas", &installation.quotas),
        );
        files.extend(installation.files.section(SettingsSection::Users, false));
        files
    }

    fn host_files(&self, _installation: &Installation, host: &Host) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        files.insert(FILE_MACROS.to_string(), self.macros(host));
        files.insert(FILE_HOSTNAME_PORTS.to_string(), self.hostname_ports(host));
        if !host.settings.is_empty() {
            let mut w = XmlWriter::document();
            w.settings(&host.settings);
            files.insert(FILE_HOST_SETTINGS.to_string(), w.finish());
        }
        files.extend(host.files.section(SettingsSection::Host, false));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ZookeeperConfig, ZookeeperNode};
    use crate::model::{HostId, HostReconcileAttributes};

    fn installation(shards: usize, replicas: usize) -> Installation {
        let mut cluster = Cluster::new("ns", "demo", "main", 0);
        for shard in 0..shards {
            for replica in 0..replicas {
                let host = cluster.get_or_create_host(shard, replica);
                host.tcp_port = 9000;
                host.http_port = 8123;
                host.interserver_http_port = 9009;
            }
        }
        Installation {
            namespace: "ns".to_string(),
            name: "demo".to_string(),
            clusters: vec![cluster],
            ..Default::default()
        }
    }

    #[test]
    fn remote_servers_lists_every_shard_and_replica() {
        let chi = installation(2, 2);
        let options = RemoteServersGeneratorOptions::new();
        let xml = ClickHouseFilesGenerator.remote_servers(&chi, &options);

        assert!(xml.starts_with("<yandex>\n"));
        assert!(xml.contains("<remote_servers replace=\"true\">"));
        assert_eq!(xml.matches("<host>chi-demo-main-0-1</host>").count(), 2);
        assert!(xml.contains("<internal_replication>true</internal_replication>"));
        assert!(xml.contains("<all-sharded>"));
        assert_eq!(xml.matches("<shard>").count(), 2 + 4);
    }

    #[test]
    fn host_flagged_for_removal_disappears_from_peer_list() {
        let mut chi = installation(2, 1);
        let options = RemoteServersGeneratorOptions::new()
            .exclude_reconcile_attributes(HostReconcileAttributes::new().set_remove());

        let before = ClickHouseFilesGenerator.remote_servers(&chi, &options);
        chi.host_mut(HostId::new(0, 1, 0)).unwrap().attributes =
            HostReconcileAttributes::new().set_remove();
        let after = ClickHouseFilesGenerator.remote_servers(&chi, &options);

        assert!(before.contains("chi-demo-main-1-0"));
        assert!(!after.contains("chi-demo-main-1-0"));
        assert!(after.contains("chi-demo-main-0-0"));
        let removed: Vec<&str> = before
            .lines()
            .filter(|line| !after.lines().any(|l| l == *line))
            .collect();
        assert!(removed.iter().all(|line| !line.contains("chi-demo-main-0-0")));
    }

    #[test]
    fn fully_excluded_shard_is_omitted() {
        let chi = installation(2, 1);
        let excluded = chi.host(HostId::new(0, 1, 0)).unwrap();
        let options = RemoteServersGeneratorOptions::new().exclude_host(excluded);

        let xml = ClickHouseFilesGenerator.remote_servers(&chi, &options);
        assert_eq!(xml.matches("<shard>").count(), 1 + 1);
    }

    #[test]
    fn common_files_include_zookeeper_and_settings() {
        let mut chi = installation(1, 1);
        chi.zookeeper = ZookeeperConfig {
            nodes: vec![ZookeeperNode {
                host: "zk.zoo".to_string(),
                port: None,
            }],
            root: Some("/ch".to_string()),
            ..Default::default()
        };
        chi.settings = Settings::new().with("logger/level", "debug");
        chi.files = Settings::new()
            .with("config.d/storage.xml", "<yandex/>")
            .with("users.d/ro.xml", "<yandex/>");

        let files = ClickHouseFilesGenerator.common_files(&chi, &ConfigGeneratorOptions::default());

        let zk = &files[FILE_ZOOKEEPER];
        assert!(zk.contains("<host>zk.zoo</host>"));
        assert!(zk.contains("<port>2181</port>"));
        assert!(zk.contains("<root>/ch</root>"));
        assert!(zk.contains("/clickhouse/demo/task_queue/ddl"));
        assert!(files[FILE_SETTINGS].contains("<level>debug</level>"));
        assert!(files.contains_key("storage.xml"));
        assert!(!files.contains_key("ro.xml"));
    }

    #[test]
    fn zookeeper_file_is_absent_without_nodes() {
        let chi = installation(1, 1);
        let files = ClickHouseFilesGenerator.common_files(&chi, &ConfigGeneratorOptions::default());
        assert!(!files.contains_key(FILE_ZOOKEEPER));
        assert!(!files.contains_key(FILE_SETTINGS));
    }

    #[test]
    fn users_files_render_sections() {
        let mut chi = installation(1, 1);
        chi.users = Settings::new().with("app/password", "secret");
        chi.profiles = Settings::new().with("default/max_threads", "4");

        let files = ClickHouseFilesGenerator.users_files(&chi);

        assert!(files[FILE_USERS].contains("<password>secret</password>"));
        assert!(files[FILE_PROFILES].contains("<max_threads>4</max_threads>"));
        assert!(files.contains_key(FILE_QUOTAS));
    }

    #[test]
    fn host_files_carry_identity_and_ports() {
        let mut chi = installation(1, 1);
        {
            let host = chi.host_mut(HostId::new(0, 0, 0)).unwrap();
            host.tcp_port = 9001;
            host.settings = Settings::new().with("max_concurrent_queries", "50");
            host.files = Settings::new().with("host/extra.xml", "<yandex/>");
        }
        let host = chi.host(HostId::new(0, 0, 0)).unwrap();

        let files = ClickHouseFilesGenerator.host_files(&chi, host);

        assert!(files[FILE_MACROS].contains("<replica>chi-demo-main-0-0</replica>"));
        assert!(files[FILE_MACROS].contains("<shard>0</shard>"));
        assert!(files[FILE_HOSTNAME_PORTS].contains("<tcp_port>9001</tcp_port>"));
        assert!(files[FILE_HOST_SETTINGS]
            .contains("<max_concurrent_queries>50</max_concurrent_queries>"));
        assert_eq!(files["extra.xml"], "<yandex/>");
    }
}
