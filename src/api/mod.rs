//! Interfaces to the distributed lock service the coordinator contends on.
//!
//! The coordinator never talks to a concrete store. Any backend that can hand
//! out a named region with a cluster-wide lock and a small key-value map can be
//! plugged in by implementing [`LockService`], [`LockRegion`] and
//! [`DistributedLock`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod inmemory;
pub use inmemory::DeterministicLock;
pub use inmemory::DeterministicLockService;
pub use inmemory::DeterministicRegion;

/// Errors surfaced by a lock service backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockServiceError {
    #[error("lock service unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("lock '{name}' is not held by this handle")]
    NotHeld { name: String },
    #[error("lock '{name}' was lost: {reason}")]
    Lost { name: String, reason: String },
    #[error("operation failed: {reason}")]
    Failed { reason: String },
}

/// Entry point of a lock service backend.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Obtain (or create) the named region that carries the leadership lock.
    async fn create_lock_region(&self, name: &str) -> Result<Arc<dyn LockRegion>, LockServiceError>;
}

#[async_trait]
impl<T: LockService + ?Sized> LockService for Arc<T> {
    async fn create_lock_region(&self, name: &str) -> Result<Arc<dyn LockRegion>, LockServiceError> {
        (**self).create_lock_region(name).await
    }
}

/// A cluster-wide region: one distributed lock plus a key-value map visible to
/// every member.
#[async_trait]
pub trait LockRegion: Send + Sync {
    /// Name of the region.
    fn name(&self) -> &str;

    /// Get a handle on the region's distributed lock.
    ///
    /// Every handle contends for the same lock. Ownership belongs to the handle
    /// that completed [`DistributedLock::lock`].
    fn distributed_lock(&self) -> Arc<dyn DistributedLock>;

    async fn put(&self, key: &str, value: &str) -> Result<(), LockServiceError>;

    /// Remove a key, returning the previous value if there was one.
    async fn remove(&self, key: &str) -> Result<Option<String>, LockServiceError>;

    async fn get(&self, key: &str) -> Result<Option<String>, LockServiceError>;
}

/// Handle on a cluster-wide mutual-exclusion lock.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Block until the lock is acquired.
    ///
    /// Must be cancel-safe: if the returned future is dropped before it
    /// completes, the lock is not held by this handle.
    async fn lock(&self) -> Result<(), LockServiceError>;

    async fn unlock(&self) -> Result<(), LockServiceError>;

    /// Extend the hold on a lease-based backend.
    async fn renew(&self) -> Result<(), LockServiceError> {
        Ok(())
    }

    /// Resolve once the backend knows the hold has been lost (session expiry,
    /// connectivity loss). Backends without such a signal never resolve.
    async fn lost(&self) -> LockServiceError {
        std::future::pending().await
    }
}
