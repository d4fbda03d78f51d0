//! Configuration file generation
//!
//! Derives file name → file content maps from the cluster object model.
//! Three groups are produced: common files (`config.d`), common users files
//! (`users.d`) and per-host files (`conf.d`).

mod files;
mod keeper;
mod options;
pub mod xml;

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

pub use files::{ClickHouseFilesGenerator, ALL_SHARDED_CLUSTER};
pub use keeper::{KeeperFilesGenerator, KEEPER_RAFT_PORT};
pub use options::{ConfigGeneratorOptions, RemoteServersGeneratorOptions};

use crate::model::{Host, Installation};

/// Peer list
pub const FILE_REMOTE_SERVERS: &str = "chop-generated-remote_servers.xml";
/// Coordination service and distributed DDL
pub const FILE_ZOOKEEPER: &str = "chop-generated-zookeeper.xml";
/// Installation settings
pub const FILE_SETTINGS: &str = "chop-generated-settings.xml";
/// Users
pub const FILE_USERS: &str = "chop-generated-users.xml";
/// Settings profiles
pub const FILE_PROFILES: &str = "chop-generated-profiles.xml";
/// Quotas
pub const FILE_QUOTAS: &str = "chop-generated-quotas.xml";
/// Host macros
pub const FILE_MACROS: &str = "chop-generated-macros.xml";
/// Host name and ports
pub const FILE_HOSTNAME_PORTS: &str = "chop-generated-hostname-ports.xml";
/// Host settings
pub const FILE_HOST_SETTINGS: &str = "chop-generated-host-settings.xml";
/// Keeper raft configuration
pub const FILE_KEEPER_CONFIG: &str = "keeper_config.xml";
/// Keeper server id
pub const FILE_KEEPER_SERVER_ID: &str = "chop-generated-keeper-server-id.xml";

/// Produces configuration files for one kind of server
#[cfg_attr(test, automock)]
pub trait ConfigFilesGenerator: Send + Sync {
    /// Files shared by every host
    fn common_files(
        &self,
        installation: &Installation,
        options: &ConfigGeneratorOptions,
    ) -> BTreeMap<String, String>;

    /// Users, profiles and quotas shared by every host
    fn users_files(&self, installation: &Installation) -> BTreeMap<String, String>;

    /// Files specific to one host
    fn host_files(&self, installation: &Installation, host: &Host) -> BTreeMap<String, String>;
}

/// Server flavour to generate files for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilesGeneratorKind {
    /// `clickhouse-server`
    #[default]
    ClickHouse,
    /// `clickhouse-keeper`
    Keeper,
}

/// Generator for the given flavour
pub fn files_generator(kind: FilesGeneratorKind) -> Box<dyn ConfigFilesGenerator> {
    match kind {
        FilesGeneratorKind::ClickHouse => Box::new(ClickHouseFilesGenerator),
        FilesGeneratorKind::Keeper => Box::new(KeeperFilesGenerator),
    }
}
