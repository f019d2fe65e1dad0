//! Leadership context handed to candidates.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::ElectionPhase;

/// State shared between a coordinator, its worker and every context it hands
/// out. Only the worker writes the leader flag.
pub(crate) struct ElectionShared {
    role: String,
    candidate_id: String,
    leader: AtomicBool,
    running: AtomicBool,
    /// Cancellation token of the election attempt in progress.
    attempt: SyncMutex<Option<CancellationToken>>,
    phase_tx: watch::Sender<ElectionPhase>,
}

impl ElectionShared {
    pub(crate) fn new(role: impl Into<String>, candidate_id: impl Into<String>) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(ElectionPhase::Stopped);
        Arc::new(Self {
            role: role.into(),
            candidate_id: candidate_id.into(),
            leader: AtomicBool::new(false),
            running: AtomicBool::new(false),
            attempt: SyncMutex::new(None),
            phase_tx,
        })
    }

    pub(crate) fn role(&self) -> &str {
        &self.role
    }

    pub(crate) fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    pub(crate) fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn phase(&self) -> ElectionPhase {
        *self.phase_tx.borrow()
    }

    pub(crate) fn set_phase(&self, phase: ElectionPhase) {
        self.phase_tx.send_replace(phase);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ElectionPhase> {
        self.phase_tx.subscribe()
    }

    /// Register a fresh attempt token derived from the worker's stop token.
    pub(crate) fn begin_attempt(&self, stop: &CancellationToken) -> CancellationToken {
        let token = stop.child_token();
        *self.attempt.lock() = Some(token.clone());
        token
    }

    pub(crate) fn end_attempt(&self) {
        self.attempt.lock().take();
    }

    /// Cancel the attempt in progress. Returns false when there is none.
    pub(crate) fn cancel_attempt(&self) -> bool {
        match self.attempt.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Live view of a coordinator's leadership, passed to [`Candidate`] callbacks.
///
/// All contexts from one coordinator read the same state, so `is_leader()`
/// reflects the truth at call time rather than at creation. Capture the value
/// once if a consistent snapshot is needed; it may race with an in-flight
/// revoke.
///
/// [`Candidate`]: crate::Candidate
#[derive(Clone)]
pub struct LeadershipContext {
    shared: Arc<ElectionShared>,
}

impl LeadershipContext {
    pub(crate) fn new(shared: Arc<ElectionShared>) -> Self {
        Self { shared }
    }

    /// Whether the owning coordinator currently holds leadership.
    pub fn is_leader(&self) -> bool {
        self.shared.is_leader()
    }

    /// Voluntarily give up leadership.
    ///
    /// Cancels the current election attempt: a hold is released (one revoke
    /// fires) and the coordinator re-enters the election while it is still
    /// running. A pending acquisition is simply restarted. No-op when the
    /// coordinator is not running.
    pub fn yield_leadership(&self) {
        if self.shared.cancel_attempt() {
            debug!(
                role = %self.shared.role(),
                candidate = %self.shared.candidate_id(),
                "leadership yield requested"
            );
        }
    }

    pub fn role(&self) -> &str {
        self.shared.role()
    }

    pub fn candidate_id(&self) -> &str {
        self.shared.candidate_id()
    }
}

impl fmt::Debug for LeadershipContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeadershipContext")
            .field("role", &self.role())
            .field("id", &self.candidate_id())
            .field("is_leader", &self.is_leader())
            .finish()
    }
}

impl fmt::Display for LeadershipContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeadershipContext{{role={}, id={}, is_leader={}}}",
            self.role(),
            self.candidate_id(),
            self.is_leader()
        )
    }
}
