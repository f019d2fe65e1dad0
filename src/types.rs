//! Shared types for the election coordinator.

use std::fmt;

/// Phase of a coordinator's election worker.
///
/// ```text
/// Stopped -> Seeking -> Holding -> Releasing -> Seeking ...
///               |          |           |
///               +----------+-----------+--> Stopped (on stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionPhase {
    /// No worker is running.
    Stopped,
    /// Waiting to acquire the distributed lock.
    Seeking,
    /// Holding the lock; the candidate has been granted leadership.
    Holding,
    /// Giving the lock back after a hold ended.
    Releasing,
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElectionPhase::Stopped => "stopped",
            ElectionPhase::Seeking => "seeking",
            ElectionPhase::Holding => "holding",
            ElectionPhase::Releasing => "releasing",
        };
        f.write_str(name)
    }
}
