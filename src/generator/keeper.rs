//! ClickHouse Keeper configuration files
//!
//! Keeper hosts share one raft configuration listing every included host.
//! Server ids are 1-based positions in host order and do not depend on
//! exclusions, so a host keeps its id while a sibling is being replaced.

use std::collections::BTreeMap;

use crate::creator::names;
use crate::model::{Host, Installation};
use crate::settings::SettingsSection;

use super::options::ConfigGeneratorOptions;
use super::xml::XmlWriter;
use super::{ConfigFilesGenerator, FILE_KEEPER_CONFIG, FILE_KEEPER_SERVER_ID};

/// Raft port used between keeper hosts
pub const KEEPER_RAFT_PORT: i32 = 9444;

/// Generator for `clickhouse-keeper` files
#[derive(Clone, Copy, Debug, Default)]
pub struct KeeperFilesGenerator;

fn server_id(installation: &Installation, host: &Host) -> Option<usize> {
    installation
        .hosts()
        .position(|h| h.id == host.id)
        .map(|p| p + 1)
}

impl ConfigFilesGenerator for KeeperFilesGenerator {
    fn common_files(
        &self,
        installation: &Installation,
        options: &ConfigGeneratorOptions,
    ) -> BTreeMap<String, String> {
        let mut w = XmlWriter::document();
        w.open("keeper_server");
        w.element("log_storage_path", "/var/lib/clickhouse-keeper/coordination/logs");
        w.element(
            "snapshot_storage_path",
            "/var/lib/clickhouse-keeper/coordination/snapshots",
        );
        w.open("raft_configuration");
        for (position, host) in installation.hosts().enumerate() {
            if options.remote_servers.exclude(host) {
                continue;
            }
            w.open("server");
            w.element("id", position + 1);
            w.element("hostname", names::host_service(&host.address));
            w.element("port", KEEPER_RAFT_PORT);
            w.close("server");
        }
        w.close("raft_configuration");
        w.close("keeper_server");

        let mut files = BTreeMap::new();
        files.insert(FILE_KEEPER_CONFIG.to_string(), w.finish());
        files.extend(installation.files.section(SettingsSection::Common, true));
        files
    }

    fn users_files(&self, _installation: &Installation) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn host_files(&self, installation: &Installation, host: &Host) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        if let Some(id) = server_id(installation, host) {
            let mut w = XmlWriter::document();
            w.open("keeper_server");
            w.element("server_id", id);
            w.element("tcp_port", host.tcp_port);
            w.close("keeper_server");
            files.insert(FILE_KEEPER_SERVER_ID.to_string(), w.finish());
        }
        files.extend(host.files.section(SettingsSection::Host, false));
        files
    }
}
