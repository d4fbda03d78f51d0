//! Kubernetes Events for installations
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! a reconcile pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Publishes Events on an installation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one Event.
    ///
    /// * `resource_ref` - installation the Event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - one of [`reasons`]
    /// * `action` - one of [`actions`]
    /// * `note` - human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// [`EventPublisher`] wrapping a kube [`Recorder`]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        // Pod name distinguishes replicas of the operator in event sources
        let instance = std::env::var("POD_NAME").ok();
        let recorder = Recorder::new(
            client,
            Reporter {
                controller: controller_name.to_string(),
                instance,
            },
        );
        Self { recorder }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let published = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                resource_ref,
            )
            .await;
        if let Err(e) = published {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

/// Drops every Event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons
pub mod reasons {
    /// A pass started
    pub const RECONCILE_STARTED: &str = "ReconcileStarted";
    /// A pass finished without failures
    pub const RECONCILE_COMPLETED: &str = "ReconcileCompleted";
    /// A pass finished with failures
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    /// Object created
    pub const CREATE_COMPLETED: &str = "CreateCompleted";
    /// Object could not be created
    pub const CREATE_FAILED: &str = "CreateFailed";
    /// Object updated in place
    pub const UPDATE_COMPLETED: &str = "UpdateCompleted";
    /// Object could not be updated
    pub const UPDATE_FAILED: &str = "UpdateFailed";
    /// Object deleted
    pub const DELETE_COMPLETED: &str = "DeleteCompleted";
    /// Object could not be deleted
    pub const DELETE_FAILED: &str = "DeleteFailed";
    /// Current state of an object could not be read
    pub const GET_FAILED: &str = "GetFailed";
}

/// Event actions
pub mod actions {
    /// Whole pass
    pub const RECONCILE: &str = "Reconcile";
    /// Object creation
    pub const CREATE: &str = "Create";
    /// In-place update
    pub const UPDATE: &str = "Update";
    /// Deletion
    pub const DELETE: &str = "Delete";
    /// Lookup of current state
    pub const GET: &str = "Get";
}

/// Event note naming one managed object
pub fn object_note(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind} {namespace}/{name}")
}
