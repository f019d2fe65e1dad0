//! The election loop run by a coordinator's background task.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use snafu::ResultExt;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api::DistributedLock;
use crate::api::LockRegion;
use crate::candidate::Candidate;
use crate::config::CoordinatorConfig;
use crate::context::ElectionShared;
use crate::context::LeadershipContext;
use crate::error::AcquireSnafu;
use crate::error::ElectionError;
use crate::error::OwnershipSnafu;
use crate::error::ReleaseSnafu;
use crate::error::RenewFailedSnafu;
use crate::events::LeaderEventKind;
use crate::events::LeaderEventPublisher;
use crate::types::ElectionPhase;

/// First retry delay after a failed iteration; doubles up to `retry_backoff_ms`.
const INITIAL_RETRY_BACKOFF_MS: u64 = 50;

/// Exponential delay between failed election iterations.
#[derive(Debug, Clone, Copy)]
struct RetryBackoff {
    current_ms: u64,
    max_ms: u64,
}

impl RetryBackoff {
    fn new(max_ms: u64) -> Self {
        Self {
            current_ms: INITIAL_RETRY_BACKOFF_MS.min(max_ms),
            max_ms,
        }
    }

    fn reset(&mut self) {
        self.current_ms = INITIAL_RETRY_BACKOFF_MS.min(self.max_ms);
    }

    /// Delay for this failure; the following one waits twice as long.
    fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.current_ms);
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        delay
    }
}

/// What happened between acquiring the lock and releasing it.
#[derive(Debug, Default, Clone, Copy)]
struct Tenure {
    /// The ownership record was (possibly) written.
    recorded: bool,
    /// `on_granted` was invoked.
    granted: bool,
}

pub(crate) struct ElectionWorker {
    pub(crate) region: Arc<dyn LockRegion>,
    pub(crate) candidate: Arc<dyn Candidate>,
    pub(crate) publisher: Option<Arc<dyn LeaderEventPublisher>>,
    pub(crate) shared: Arc<ElectionShared>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) stop: CancellationToken,
}

impl ElectionWorker {
    /// Contend for leadership until the stop token fires.
    pub(crate) async fn run(self) {
        let ctx = LeadershipContext::new(self.shared.clone());
        info!(
            role = %self.candidate.role(),
            candidate = %self.candidate.id(),
            region = %self.region.name(),
            "election worker started"
        );

        let mut backoff = RetryBackoff::new(self.config.retry_backoff_ms);
        while !self.stop.is_cancelled() {
            let attempt = self.shared.begin_attempt(&self.stop);
            let mut tenure = Tenure::default();
            let result = self.run_attempt(&ctx, &attempt, &mut tenure).await;
            self.shared.end_attempt();

            if tenure.granted {
                backoff.reset();
            }
            if let Err(e) = result {
                let delay = backoff.next_delay();
                warn!(
                    role = %self.candidate.role(),
                    candidate = %self.candidate.id(),
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "election iteration failed, retrying"
                );
                self.pause(delay).await;
            }
        }

        self.shared.set_phase(ElectionPhase::Stopped);
        info!(role = %self.candidate.role(), candidate = %self.candidate.id(), "election worker stopped");
    }

    /// One seek/hold/release cycle.
    async fn run_attempt(
        &self,
        ctx: &LeadershipContext,
        attempt: &CancellationToken,
        tenure: &mut Tenure,
    ) -> Result<(), ElectionError> {
        let role = self.candidate.role();
        self.shared.set_phase(ElectionPhase::Seeking);
        debug!(role = %role, candidate = %self.candidate.id(), "seeking leadership lock");

        let lock = self.region.distributed_lock();
        tokio::select! {
            biased;
            _ = attempt.cancelled() => {
                debug!(role = %role, "election attempt cancelled while seeking");
                return Ok(());
            }
            acquired = lock.lock() => acquired.context(AcquireSnafu { role })?,
        }

        // From here on the lock is held and release must run on every path.
        let held = self.hold(ctx, attempt, lock.as_ref(), tenure).await;
        let released = self.release(ctx, lock.as_ref(), *tenure).await;
        held.and(released)
    }

    async fn hold(
        &self,
        ctx: &LeadershipContext,
        attempt: &CancellationToken,
        lock: &dyn DistributedLock,
        tenure: &mut Tenure,
    ) -> Result<(), ElectionError> {
        let role = self.candidate.role();
        if attempt.is_cancelled() {
            debug!(role = %role, "election attempt cancelled before grant");
            return Ok(());
        }

        tenure.recorded = true;
        self.region.put(role, self.candidate.id()).await.context(OwnershipSnafu { role })?;

        self.shared.set_leader(true);
        self.shared.set_phase(ElectionPhase::Holding);
        tenure.granted = true;
        info!(role = %role, candidate = %self.candidate.id(), "leadership granted");

        let callback = self.invoke("on_granted", self.candidate.on_granted(ctx)).await;
        self.publish(LeaderEventKind::Granted, ctx);
        callback?;

        self.wait_while_held(attempt, lock).await
    }

    /// Block until the attempt is cancelled or the hold fails.
    async fn wait_while_held(
        &self,
        attempt: &CancellationToken,
        lock: &dyn DistributedLock,
    ) -> Result<(), ElectionError> {
        let role = self.candidate.role();
        let mut renewals = self.config.renew_interval().map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                biased;
                _ = attempt.cancelled() => return Ok(()),
                source = lock.lost() => {
                    return Err(ElectionError::LockLost { role: role.to_string(), source });
                }
                _ = next_tick(&mut renewals) => {
                    lock.renew().await.context(RenewFailedSnafu { role })?;
                    debug!(role = %role, "leadership lock renewed");
                }
            }
        }
    }

    async fn release(
        &self,
        ctx: &LeadershipContext,
        lock: &dyn DistributedLock,
        tenure: Tenure,
    ) -> Result<(), ElectionError> {
        let role = self.candidate.role();
        self.shared.set_phase(ElectionPhase::Releasing);
        // Cleared before unlocking so the flag never outlives the lock.
        self.shared.set_leader(false);

        let mut result = Ok(());
        if tenure.recorded {
            result = self.region.remove(role).await.map(|_| ()).context(OwnershipSnafu { role });
        }
        result = result.and(lock.unlock().await.context(ReleaseSnafu { role }));

        if tenure.granted {
            info!(role = %role, candidate = %self.candidate.id(), "leadership revoked");
            let callback = self.invoke("on_revoked", self.candidate.on_revoked(ctx)).await;
            self.publish(LeaderEventKind::Revoked, ctx);
            result = result.and(callback);
        }
        result
    }

    async fn invoke<F>(&self, callback: &'static str, fut: F) -> Result<(), ElectionError>
    where
        F: Future<Output = ()> + Send,
    {
        AssertUnwindSafe(fut).catch_unwind().await.map_err(|_| ElectionError::CallbackPanicked {
            role: self.candidate.role().to_string(),
            callback,
        })
    }

    /// Best-effort notification; failures are logged and dropped.
    fn publish(&self, kind: LeaderEventKind, ctx: &LeadershipContext) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let source = self.config.source_name.as_str();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| match kind {
            LeaderEventKind::Granted => publisher.publish_on_granted(source, ctx),
            LeaderEventKind::Revoked => publisher.publish_on_revoked(source, ctx),
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(role = %ctx.role(), event = ?kind, error = %e, "leader event publisher failed"),
            Err(_) => warn!(role = %ctx.role(), event = ?kind, "leader event publisher panicked"),
        }
    }

    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
