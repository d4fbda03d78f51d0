//! Reconcile controller for ClickHouseInstallation resources
//!
//! The watcher feeds a coalescing [`TaskQueue`]; a pool of workers drains it
//! and each pass converges one installation through [`Worker::reconcile`].
//! Platform access, events and status writes sit behind traits so a pass can
//! run against in-memory fakes.

mod events;
mod migrate;
mod objects;
mod queue;
mod runner;
mod status;
mod worker;

pub use events::{
    actions, object_note, reasons, EventPublisher, KubeEventPublisher, NoopEventPublisher,
};
pub use migrate::{migrate_meta, migrate_object, migrate_service};
pub use objects::{kind_of, KubeObjects, ObjectStore, ObjectStores};
pub use queue::{InstallationKey, TaskQueue};
pub use runner::{
    handle_event, run_worker, DelayedRequeue, InstallationCache, Runner, RETRY_DELAY,
};
pub use status::{KubeStatusWriter, StatusWriter};
pub use worker::{ObjectOutcome, PassReport, Plan, Worker};

#[cfg(test)]
pub use events::MockEventPublisher;
#[cfg(test)]
pub use status::MockStatusWriter;
