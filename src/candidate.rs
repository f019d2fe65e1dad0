//! Leadership candidates.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::context::LeadershipContext;

/// Role used by [`DefaultCandidate`] when none is given.
pub const DEFAULT_ROLE: &str = "leader";

/// A contender for leadership of one role.
///
/// Callbacks run on the coordinator's election worker, one at a time: grant
/// and revoke strictly alternate. They must not call `stop()` on their own
/// coordinator (the worker would wait on itself); use
/// [`LeadershipContext::yield_leadership`] to step down instead.
#[async_trait]
pub trait Candidate: Send + Sync {
    /// Role this candidate contends for.
    fn role(&self) -> &str;

    /// Unique id of this candidate, written to the ownership record.
    fn id(&self) -> &str;

    /// Called after the lock is acquired and the ownership record written.
    async fn on_granted(&self, ctx: &LeadershipContext);

    /// Called after the ownership record is removed and the lock released.
    async fn on_revoked(&self, ctx: &LeadershipContext);
}

/// Candidate with a random id whose callbacks only log.
#[derive(Debug, Clone)]
pub struct DefaultCandidate {
    role: String,
    id: String,
}

impl DefaultCandidate {
    /// Create a candidate for [`DEFAULT_ROLE`] with a random UUID.
    pub fn new() -> Self {
        Self::with_role(DEFAULT_ROLE)
    }

    /// Create a candidate for `role` with a random UUID.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a candidate with an explicit id.
    pub fn with_id(role: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            id: id.into(),
        }
    }
}

impl Default for DefaultCandidate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Candidate for DefaultCandidate {
    fn role(&self) -> &str {
        &self.role
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn on_granted(&self, ctx: &LeadershipContext) {
        info!(role = %self.role, candidate = %self.id, context = %ctx, "leadership granted");
    }

    async fn on_revoked(&self, ctx: &LeadershipContext) {
        info!(role = %self.role, candidate = %self.id, context = %ctx, "leadership revoked");
    }
}
