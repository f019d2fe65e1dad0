//! Leader election coordinator.
//!
//! A [`LeaderCoordinator`] runs one background task per instance that loops
//! over seek, hold and release of a cluster-wide lock, telling its
//! [`Candidate`] when leadership is granted and revoked.
//!
//! # Guarantees
//!
//! 1. **Single Leader**: the leader flag is only set while the lock is held,
//!    so two coordinators on the same lock never both report leadership.
//! 2. **Alternation**: grant and revoke callbacks strictly alternate, and a
//!    revoke finishes before the next acquisition starts.
//! 3. **Stop Barrier**: when `stop()` returns, a held lock has been released
//!    and `on_revoked` has run.
//! 4. **Paired Records**: every ownership record written on acquisition is
//!    removed exactly once on release.

mod worker;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use snafu::ResultExt;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use self::worker::ElectionWorker;
use crate::api::LockRegion;
use crate::api::LockService;
use crate::candidate::Candidate;
use crate::config::CoordinatorConfig;
use crate::context::ElectionShared;
use crate::context::LeadershipContext;
use crate::error::ElectionError;
use crate::error::OwnershipSnafu;
use crate::error::RegionUnavailableSnafu;
use crate::events::LeaderEventPublisher;
use crate::types::ElectionPhase;

struct WorkerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    worker: Option<WorkerHandle>,
    /// Worker left running by a `shutdown()` that timed out. It is still
    /// releasing leadership and must finish before another worker starts.
    draining: Option<JoinHandle<()>>,
}

/// Drives one [`Candidate`] through repeated leader elections.
///
/// # Example
///
/// ```ignore
/// use aspen_leader::{CoordinatorConfig, DefaultCandidate, DeterministicLockService, LeaderCoordinator};
///
/// let service = DeterministicLockService::new();
/// let coordinator = LeaderCoordinator::new(service, Arc::new(DefaultCandidate::new()), CoordinatorConfig::default());
///
/// coordinator.start().await?;
/// if coordinator.is_leader() {
///     // leader-only work
/// }
/// coordinator.stop().await;
/// ```
pub struct LeaderCoordinator<S: LockService + ?Sized + 'static> {
    service: Arc<S>,
    candidate: Arc<dyn Candidate>,
    publisher: Option<Arc<dyn LeaderEventPublisher>>,
    config: CoordinatorConfig,
    shared: Arc<ElectionShared>,
    region: SyncMutex<Option<Arc<dyn LockRegion>>>,
    /// Serializes `start`/`stop`/`shutdown`.
    lifecycle: Mutex<Lifecycle>,
}

impl<S: LockService + ?Sized + 'static> LeaderCoordinator<S> {
    /// Create a coordinator for `candidate` over `service`. Nothing happens
    /// until [`start`](Self::start) is called.
    pub fn new(service: Arc<S>, candidate: Arc<dyn Candidate>, config: CoordinatorConfig) -> Self {
        let shared = ElectionShared::new(candidate.role(), candidate.id());
        Self {
            service,
            candidate,
            publisher: None,
            config,
            shared,
            region: SyncMutex::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Attach an event publisher notified after each grant and revoke.
    pub fn with_event_publisher(mut self, publisher: Arc<dyn LeaderEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Register the candidate for election.
    ///
    /// No-op when already running. Fails with
    /// [`ElectionError::RegionUnavailable`] if the lock region cannot be
    /// obtained, in which case the coordinator stays stopped. If an earlier
    /// `shutdown()` timed out, waits for that worker to finish releasing first.
    pub async fn start(&self) -> Result<(), ElectionError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.worker.is_some() {
            return Ok(());
        }
        if let Some(task) = lifecycle.draining.take() {
            self.join_draining(task).await;
        }

        let name = self.config.region_name.as_str();
        let region = self.service.create_lock_region(name).await.context(RegionUnavailableSnafu { name })?;
        *self.region.lock() = Some(region.clone());

        let stop = CancellationToken::new();
        let worker = ElectionWorker {
            region,
            candidate: self.candidate.clone(),
            publisher: self.publisher.clone(),
            shared: self.shared.clone(),
            config: self.config.clone(),
            stop: stop.clone(),
        };

        self.shared.set_running(true);
        self.shared.set_phase(ElectionPhase::Seeking);
        let task = tokio::spawn(worker.run());
        lifecycle.worker = Some(WorkerHandle { stop, task });

        info!(
            role = %self.candidate.role(),
            candidate = %self.candidate.id(),
            region = %name,
            "leader coordinator started"
        );
        Ok(())
    }

    /// Withdraw the candidate from election.
    ///
    /// When not running, only waits for a worker left releasing by a timed-out
    /// `shutdown()`. Otherwise cancels the worker and waits for it
    /// to finish, so leadership has been released (and `on_revoked` has run)
    /// by the time this returns. Must not be called from a candidate callback
    /// of the same coordinator.
    pub async fn stop(&self) {
        self.halt(None).await;
    }

    /// Stop with a bounded wait.
    ///
    /// Waits at most `shutdown_timeout` for the worker to release leadership.
    /// A worker that is still releasing after that keeps running in the
    /// background until it has removed the ownership record, unlocked and
    /// called `on_revoked`.
    pub async fn shutdown(&self) {
        self.halt(Some(self.config.shutdown_timeout())).await;
    }

    async fn halt(&self, limit: Option<Duration>) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(mut worker) = lifecycle.worker.take() else {
            if limit.is_none() {
                if let Some(task) = lifecycle.draining.take() {
                    self.join_draining(task).await;
                }
            }
            return;
        };

        self.shared.set_running(false);
        worker.stop.cancel();

        let joined = match limit {
            None => Some((&mut worker.task).await),
            Some(limit) => tokio::time::timeout(limit, &mut worker.task).await.ok(),
        };

        match joined {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(role = %self.candidate.role(), error = %e, "election worker terminated abnormally");
                // The worker never reached its own exit path.
                self.shared.set_leader(false);
                self.shared.set_phase(ElectionPhase::Stopped);
            }
            None => {
                warn!(
                    role = %self.candidate.role(),
                    timeout_ms = self.config.shutdown_timeout_ms,
                    phase = %self.shared.phase(),
                    "election worker did not stop in time, leaving it to finish releasing"
                );
                lifecycle.draining = Some(worker.task);
            }
        }

        info!(role = %self.candidate.role(), candidate = %self.candidate.id(), "leader coordinator stopped");
    }

    async fn join_draining(&self, task: JoinHandle<()>) {
        if !task.is_finished() {
            debug!(role = %self.candidate.role(), "waiting for previous election worker to finish releasing");
        }
        if let Err(e) = task.await {
            warn!(role = %self.candidate.role(), error = %e, "election worker terminated abnormally");
            self.shared.set_leader(false);
            self.shared.set_phase(ElectionPhase::Stopped);
        }
    }

    /// Whether the candidate is registered for election.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Whether this coordinator currently holds leadership.
    pub fn is_leader(&self) -> bool {
        self.shared.is_leader()
    }

    /// A live leadership context, identical to the one passed to callbacks.
    pub fn context(&self) -> LeadershipContext {
        LeadershipContext::new(self.shared.clone())
    }

    /// Current phase of the election worker.
    pub fn phase(&self) -> ElectionPhase {
        self.shared.phase()
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ElectionPhase> {
        self.shared.subscribe()
    }

    /// The candidate this coordinator runs elections for.
    pub fn candidate(&self) -> &Arc<dyn Candidate> {
        &self.candidate
    }

    /// Configuration the coordinator was built with.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Read the ownership record for the candidate's role.
    ///
    /// Returns the id of whichever candidate in the cluster currently leads
    /// the role, or `None` if nobody does or the coordinator was never started.
    pub async fn current_leader(&self) -> Result<Option<String>, ElectionError> {
        let region = self.region.lock().clone();
        let Some(region) = region else {
            return Ok(None);
        };
        let role = self.candidate.role();
        region.get(role).await.context(OwnershipSnafu { role })
    }
}

impl<S: LockService + ?Sized + 'static> Drop for LeaderCoordinator<S> {
    fn drop(&mut self) {
        // Cannot wait here; the worker releases leadership on its own.
        if let Some(worker) = self.lifecycle.get_mut().worker.take() {
            self.shared.set_running(false);
            worker.stop.cancel();
            debug!(role = %self.candidate.role(), "coordinator dropped while running, worker signalled to stop");
        }
    }
}
