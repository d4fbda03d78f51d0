//! Cluster object model
//!
//! The normalized tree built from a ClickHouseInstallation: installation →
//! clusters → shards/replicas → hosts. Hosts are stored once, in each
//! cluster's shard × replica matrix; shards and replicas carry only their own
//! metadata. Back-references are indices ([`HostId`]), never pointers.
//!
//! Walk functions visit every element and return one outcome per visit. They
//! never stop at the first error.

mod cluster;
mod host;
mod installation;
mod normalizer;

pub use cluster::{Cluster, Replica, Shard};
pub use host::{Host, HostAddress, HostId, HostReconcileAttributes};
pub use installation::Installation;
pub use normalizer::Normalizer;

use crate::{Error, Result};

/// Lookup key for shards, replicas and hosts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locator<'a> {
    /// Match by name
    Name(&'a str),
    /// Match by position
    Index(usize),
}

impl<'a> From<&'a str> for Locator<'a> {
    fn from(name: &'a str) -> Self {
        Locator::Name(name)
    }
}

impl From<usize> for Locator<'_> {
    fn from(index: usize) -> Self {
        Locator::Index(index)
    }
}

/// Ordered per-element outcomes of a walk
#[derive(Debug, Default)]
pub struct WalkResults(Vec<Result<()>>);

impl WalkResults {
    /// Number of visited elements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was visited
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every visit succeeded
    pub fn all_ok(&self) -> bool {
        self.0.iter().all(Result::is_ok)
    }

    /// Outcomes in visit order
    pub fn outcomes(&self) -> &[Result<()>] {
        &self.0
    }

    /// Failed visits, in visit order
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.0.iter().filter_map(|r| r.as_ref().err())
    }

    /// Consume into the failed visits
    pub fn into_errors(self) -> Vec<Error> {
        self.0.into_iter().filter_map(Result::err).collect()
    }
}

impl FromIterator<Result<()>> for WalkResults {
    fn from_iter<T: IntoIterator<Item = Result<()>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Result<()>> for WalkResults {
    fn extend<T: IntoIterator<Item = Result<()>>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
