//! Administrative SQL access to running ClickHouse hosts
//!
//! Commands go over the HTTP interface. Connections are opened lazily and
//! cached per [`EndpointConnectionParams`] in a [`ConnectionPool`]; a failed
//! connect only fails the call that triggered it.

mod connection;
mod pool;

pub use connection::{
    parse_tab_separated, Connection, EndpointConnectionParams, QueryOptions, QueryResult,
};
pub use pool::{ClusterAdmin, ConnectionPool, SqlClusterAdmin, SQL_DROP_DNS_CACHE};

#[cfg(test)]
pub use pool::MockClusterAdmin;
