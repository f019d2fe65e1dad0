//! Error types for the election coordinator.

use snafu::Snafu;

use crate::api::LockServiceError;

/// Errors raised by the election coordinator.
///
/// Only [`ElectionError::RegionUnavailable`] ever reaches callers (from
/// `start()`); the others are produced inside the election loop, logged, and
/// recovered from by retrying.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ElectionError {
    /// The lock region could not be obtained from the lock service.
    #[snafu(display("lock region '{name}' unavailable: {source}"))]
    RegionUnavailable {
        /// Region name.
        name: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// Acquiring the distributed lock failed.
    #[snafu(display("failed to acquire leadership lock for role '{role}': {source}"))]
    Acquire {
        /// Candidate role.
        role: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// Writing or removing the ownership record failed.
    #[snafu(display("failed to update ownership record for role '{role}': {source}"))]
    Ownership {
        /// Candidate role.
        role: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// Releasing the distributed lock failed.
    #[snafu(display("failed to release leadership lock for role '{role}': {source}"))]
    Release {
        /// Candidate role.
        role: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// The backend reported that the hold was lost.
    #[snafu(display("leadership lock for role '{role}' lost: {source}"))]
    LockLost {
        /// Candidate role.
        role: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// Renewing the hold failed.
    #[snafu(display("failed to renew leadership lock for role '{role}': {source}"))]
    RenewFailed {
        /// Candidate role.
        role: String,
        /// The underlying error.
        source: LockServiceError,
    },

    /// A candidate callback panicked.
    #[snafu(display("candidate callback '{callback}' panicked for role '{role}'"))]
    CallbackPanicked {
        /// Candidate role.
        role: String,
        /// Which callback panicked.
        callback: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_region_unavailable_display_and_source() {
        let err = ElectionError::RegionUnavailable {
            name: "cluster".to_string(),
            source: LockServiceError::Unavailable {
                reason: "no locator".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("'cluster'"));
        assert!(text.contains("no locator"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_callback_panicked_has_no_source() {
        let err = ElectionError::CallbackPanicked {
            role: "leader".to_string(),
            callback: "on_granted",
        };
        assert!(err.source().is_none());
        assert!(err.to_string().contains("on_granted"));
    }
}
