//! Connection cache and cluster-level administrative commands

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::config::ClickHouseAccessConfig;
use crate::Result;

use super::connection::{Connection, EndpointConnectionParams, QueryOptions};

/// Flushes the server's DNS cache so renamed peers resolve again
pub const SQL_DROP_DNS_CACHE: &str = "SYSTEM DROP DNS CACHE";

/// Connections keyed by their parameters
#[derive(Default)]
pub struct ConnectionPool {
    connections: DashMap<EndpointConnectionParams, Arc<Connection>>,
}

impl ConnectionPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached connection for `params`, created on first use
    pub fn get(&self, params: &EndpointConnectionParams) -> Arc<Connection> {
        self.connections
            .entry(params.clone())
            .or_insert_with(|| Arc::new(Connection::new(params.clone())))
            .clone()
    }

    /// Drop every connection to `hostname`; returns how many were cached
    pub fn evict_host(&self, hostname: &str) -> usize {
        let before = self.connections.len();
        self.connections.retain(|params, _| params.hostname != hostname);
        before.saturating_sub(self.connections.len())
    }

    /// Number of cached connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Administrative commands the reconcile worker issues against hosts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Run `SYSTEM DROP DNS CACHE` on one host
    async fn drop_dns_cache(&self, cancel: &CancellationToken, hostname: &str) -> Result<()>;

    /// Release cached state for a host that no longer exists
    fn forget_host(&self, hostname: &str);
}

/// [`ClusterAdmin`] over the HTTP interface
pub struct SqlClusterAdmin {
    pool: Arc<ConnectionPool>,
    access: ClickHouseAccessConfig,
}

impl SqlClusterAdmin {
    /// Create an admin sharing `pool`
    pub fn new(pool: Arc<ConnectionPool>, access: ClickHouseAccessConfig) -> Self {
        Self { pool, access }
    }
}

#[async_trait]
impl ClusterAdmin for SqlClusterAdmin {
    async fn drop_dns_cache(&self, cancel: &CancellationToken, hostname: &str) -> Result<()> {
        let params = EndpointConnectionParams::new(hostname, &self.access);
        self.pool
            .get(&params)
            .exec(cancel, SQL_DROP_DNS_CACHE, QueryOptions::default())
            .await
    }

    fn forget_host(&self, hostname: &str) {
        let evicted = self.pool.evict_host(hostname);
        if evicted > 0 {
            debug!(%hostname, evicted, "connections evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_params_share_one_connection() {
        let pool = ConnectionPool::new();
        let access = ClickHouseAccessConfig::default();
        let a = EndpointConnectionParams::new("chi-demo-main-0-0", &access);
        let b = EndpointConnectionParams::new("chi-demo-main-1-0", &access);

        let first = pool.get(&a);
        let again = pool.get(&a);
        let other = pool.get(&b);

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn evicting_a_host_drops_only_its_connections() {
        let pool = Arc::new(ConnectionPool::new());
        let mut access = ClickHouseAccessConfig::default();
        pool.get(&EndpointConnectionParams::new("gone", &access));
        pool.get(&EndpointConnectionParams::new("kept", &access));
        access.username = "admin".to_string();
        pool.get(&EndpointConnectionParams::new("gone", &access));

        let admin = SqlClusterAdmin::new(pool.clone(), access);
        admin.forget_host("gone");

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.evict_host("gone"), 0);
        assert_eq!(pool.evict_host("kept"), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn different_credentials_get_separate_connections() {
        let pool = ConnectionPool::new();
        let mut access = ClickHouseAccessConfig::default();
        let a = EndpointConnectionParams::new("h", &access);
        access.username = "admin".to_string();
        let b = EndpointConnectionParams::new("h", &access);

        assert!(!Arc::ptr_eq(&pool.get(&a), &pool.get(&b)));
    }
}
