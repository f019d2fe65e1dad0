//! Single-leader election over a distributed lock service.
//!
//! A [`LeaderCoordinator`] repeatedly contends for a cluster-wide lock on
//! behalf of one [`Candidate`]. While it holds the lock, the candidate is the
//! leader for its role: an ownership record `role -> candidate id` is written
//! to the lock region, `on_granted` is called and an optional
//! [`LeaderEventPublisher`] is notified. Leadership ends on `stop()`, on
//! [`LeadershipContext::yield_leadership`], or when the backend reports the
//! lock lost; the record is removed, the lock released and `on_revoked` called
//! before the coordinator contends again.
//!
//! The lock service is abstract ([`LockService`]); an in-memory
//! [`DeterministicLockService`] is provided for tests and single-process use.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use aspen_leader::{BroadcastEventPublisher, CoordinatorConfig, DefaultCandidate, LeaderCoordinator};
//!
//! let publisher = Arc::new(BroadcastEventPublisher::new());
//! let mut events = publisher.subscribe();
//!
//! let coordinator = LeaderCoordinator::new(service, Arc::new(DefaultCandidate::new()), CoordinatorConfig::load()?)
//!     .with_event_publisher(publisher);
//! coordinator.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{:?} for role {}", event.kind, event.role);
//! }
//! ```

pub mod api;
mod candidate;
mod config;
mod context;
mod coordinator;
mod error;
mod events;
mod types;

pub use api::DeterministicLockService;
pub use api::DistributedLock;
pub use api::LockRegion;
pub use api::LockService;
pub use api::LockServiceError;
pub use candidate::Candidate;
pub use candidate::DEFAULT_ROLE;
pub use candidate::DefaultCandidate;
pub use config::ConfigError;
pub use config::CoordinatorConfig;
pub use context::LeadershipContext;
pub use coordinator::LeaderCoordinator;
pub use error::ElectionError;
pub use events::BroadcastEventPublisher;
pub use events::DEFAULT_EVENT_CAPACITY;
pub use events::LeaderEvent;
pub use events::LeaderEventKind;
pub use events::LeaderEventPublisher;
pub use events::PublishError;
pub use types::ElectionPhase;
