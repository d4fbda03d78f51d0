//! ClickHouse operator - converges ClickHouseInstallation resources
//!
//! A ClickHouseInstallation describes clusters of ClickHouse hosts laid out
//! as shard × replica matrices. The operator normalizes that description
//! into a cluster object model, generates configuration files, builds the
//! Services, ConfigMaps and StatefulSets every host needs, and reconciles
//! them against the cluster host by host.
//!
//! # Modules
//!
//! - [`crd`] - the ClickHouseInstallation custom resource
//! - [`settings`] - layered settings with merge rules
//! - [`model`] - normalized cluster object model
//! - [`generator`] - configuration file generation
//! - [`creator`] - desired platform objects
//! - [`controller`] - task queue, reconcile worker and watcher
//! - [`clickhouse`] - administrative SQL over the HTTP interface
//! - [`config`] - operator configuration
//! - [`telemetry`] - tracing setup
//! - [`error`] - error types for the operator

#![deny(missing_docs)]

pub mod clickhouse;
pub mod config;
pub mod controller;
pub mod creator;
pub mod crd;
pub mod error;
pub mod generator;
pub mod model;
pub mod settings;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Native protocol port
pub const DEFAULT_TCP_PORT: i32 = 9000;

/// HTTP interface port
pub const DEFAULT_HTTP_PORT: i32 = 8123;

/// Interserver (replication) HTTP port
pub const DEFAULT_INTERSERVER_HTTP_PORT: i32 = 9009;

/// Server image used by the default pod template
pub const DEFAULT_CLICKHOUSE_IMAGE: &str = "clickhouse/clickhouse-server:24.3";

/// Image of the log sidecar
pub const DEFAULT_LOG_IMAGE: &str = "busybox";

/// Container port name of the HTTP interface
pub const PORT_NAME_HTTP: &str = "http";

/// Container port name of the native protocol
pub const PORT_NAME_TCP: &str = "tcp";

/// Container port name of the interserver port
pub const PORT_NAME_INTERSERVER_HTTP: &str = "interserver-http";

/// Mount point of common configuration files
pub const DIR_CONFIG_D: &str = "/etc/clickhouse-server/config.d/";

/// Mount point of common users files
pub const DIR_USERS_D: &str = "/etc/clickhouse-server/users.d/";

/// Mount point of per-host configuration files
pub const DIR_CONF_D: &str = "/etc/clickhouse-server/conf.d/";

/// Data directory
pub const DIR_CLICKHOUSE_DATA: &str = "/var/lib/clickhouse";

/// Log directory
pub const DIR_CLICKHOUSE_LOG: &str = "/var/log/clickhouse-server";

/// Field manager for server-side apply and status patches
pub const FIELD_MANAGER: &str = "clickhouse-operator";
