//! Leadership event publishing.
//!
//! Publishing is best-effort: the coordinator logs publisher failures and
//! carries on, so a broken sink never affects who holds leadership.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::context::LeadershipContext;

/// Default capacity of a [`BroadcastEventPublisher`] channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Error returned by a [`LeaderEventPublisher`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to publish leader event: {reason}")]
pub struct PublishError {
    pub reason: String,
}

impl PublishError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Sink for leadership notifications.
///
/// Called from the election worker right after the matching candidate
/// callback. Implementations should return quickly.
pub trait LeaderEventPublisher: Send + Sync {
    fn publish_on_granted(&self, source: &str, ctx: &LeadershipContext) -> Result<(), PublishError>;

    fn publish_on_revoked(&self, source: &str, ctx: &LeadershipContext) -> Result<(), PublishError>;
}

/// Kind of a [`LeaderEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderEventKind {
    Granted,
    Revoked,
}

/// A leadership transition as seen by in-process subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderEvent {
    pub kind: LeaderEventKind,
    /// Name of the coordinator that published the event.
    pub source: String,
    pub role: String,
    pub candidate_id: String,
}

impl LeaderEvent {
    fn from_context(kind: LeaderEventKind, source: &str, ctx: &LeadershipContext) -> Self {
        Self {
            kind,
            source: source.to_string(),
            role: ctx.role().to_string(),
            candidate_id: ctx.candidate_id().to_string(),
        }
    }
}

/// Publishes [`LeaderEvent`]s on a tokio broadcast channel.
///
/// Having no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<LeaderEvent>,
}

impl BroadcastEventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LeaderEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: LeaderEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderEventPublisher for BroadcastEventPublisher {
    fn publish_on_granted(&self, source: &str, ctx: &LeadershipContext) -> Result<(), PublishError> {
        self.publish(LeaderEvent::from_context(LeaderEventKind::Granted, source, ctx));
        Ok(())
    }

    fn publish_on_revoked(&self, source: &str, ctx: &LeadershipContext) -> Result<(), PublishError> {
        self.publish(LeaderEvent::from_context(LeaderEventKind::Revoked, source, ctx));
        Ok(())
    }
}
