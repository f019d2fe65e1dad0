//! Shared fixtures for election integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use aspen_leader::Candidate;
use aspen_leader::CoordinatorConfig;
use aspen_leader::DeterministicLockService;
use aspen_leader::DistributedLock;
use aspen_leader::LeaderEventPublisher;
use aspen_leader::LeadershipContext;
use aspen_leader::LockRegion;
use aspen_leader::LockService;
use aspen_leader::LockServiceError;
use aspen_leader::PublishError;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("aspen_leader=debug").with_test_writer().try_init();
}

/// Config with a short retry backoff so failure tests converge quickly.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        retry_backoff_ms: 10,
        shutdown_timeout_ms: 1_000,
        ..Default::default()
    }
}

/// Poll `cond` until it holds, panicking after [`WAIT`].
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let reached = tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Granted,
    Revoked,
}

/// What a candidate saw when one of its callbacks ran.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub callback: Callback,
    pub is_leader: bool,
    pub lock_held: bool,
}

/// Candidate that records every callback and can misbehave on demand.
pub struct RecordingCandidate {
    role: String,
    id: String,
    service: Arc<DeterministicLockService>,
    region_name: String,
    observations: Mutex<Vec<Observation>>,
    /// Number of upcoming grants to yield from inside `on_granted`.
    yield_on_grant: AtomicU64,
    /// Number of upcoming grants to panic in.
    panic_on_grant: AtomicU64,
}

impl RecordingCandidate {
    pub fn new(id: &str, service: Arc<DeterministicLockService>) -> Arc<Self> {
        Arc::new(Self {
            role: "leader".to_string(),
            id: id.to_string(),
            service,
            region_name: "cluster".to_string(),
            observations: Mutex::new(Vec::new()),
            yield_on_grant: AtomicU64::new(0),
            panic_on_grant: AtomicU64::new(0),
        })
    }

    pub fn yield_on_next_grants(&self, count: u64) {
        self.yield_on_grant.store(count, Ordering::SeqCst);
    }

    pub fn panic_on_next_grants(&self, count: u64) {
        self.panic_on_grant.store(count, Ordering::SeqCst);
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    pub fn callbacks(&self) -> Vec<Callback> {
        self.observations.lock().iter().map(|o| o.callback).collect()
    }

    pub fn grants(&self) -> usize {
        self.count(Callback::Granted)
    }

    pub fn revokes(&self) -> usize {
        self.count(Callback::Revoked)
    }

    fn count(&self, callback: Callback) -> usize {
        self.observations.lock().iter().filter(|o| o.callback == callback).count()
    }

    fn observe(&self, callback: Callback, ctx: &LeadershipContext) {
        let lock_held = self.service.region(&self.region_name).map(|r| r.is_locked()).unwrap_or(false);
        self.observations.lock().push(Observation {
            callback,
            is_leader: ctx.is_leader(),
            lock_held,
        });
    }
}

fn take_one(counter: &AtomicU64) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

#[async_trait]
impl Candidate for RecordingCandidate {
    fn role(&self) -> &str {
        &self.role
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn on_granted(&self, ctx: &LeadershipContext) {
        self.observe(Callback::Granted, ctx);
        if take_one(&self.panic_on_grant) {
            panic!("candidate {} refuses leadership", self.id);
        }
        if take_one(&self.yield_on_grant) {
            ctx.yield_leadership();
        }
    }

    async fn on_revoked(&self, ctx: &LeadershipContext) {
        self.observe(Callback::Revoked, ctx);
    }
}

/// Assert grant/revoke strictly alternate, starting with a grant.
pub fn assert_alternating(callbacks: &[Callback]) {
    for (i, callback) in callbacks.iter().enumerate() {
        let expected = if i % 2 == 0 { Callback::Granted } else { Callback::Revoked };
        assert_eq!(*callback, expected, "callback #{i} out of order in {callbacks:?}");
    }
}

/// Publisher that fails every call, by error or by panic.
pub struct BrokenPublisher {
    panic: bool,
    calls: AtomicU64,
}

impl BrokenPublisher {
    pub fn erroring() -> Arc<Self> {
        Arc::new(Self {
            panic: false,
            calls: AtomicU64::new(0),
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic: true,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("publisher exploded");
        }
        Err(PublishError::new("sink offline"))
    }
}

impl LeaderEventPublisher for BrokenPublisher {
    fn publish_on_granted(&self, _source: &str, _ctx: &LeadershipContext) -> Result<(), PublishError> {
        self.fail()
    }

    fn publish_on_revoked(&self, _source: &str, _ctx: &LeadershipContext) -> Result<(), PublishError> {
        self.fail()
    }
}

/// Lease-style backend wrapper whose renewals can be made to fail.
pub struct RenewingLockService {
    inner: Arc<DeterministicLockService>,
    renewals: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

impl RenewingLockService {
    pub fn new(inner: Arc<DeterministicLockService>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            renewals: Arc::new(AtomicU64::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LockService for RenewingLockService {
    async fn create_lock_region(&self, name: &str) -> Result<Arc<dyn LockRegion>, LockServiceError> {
        let inner = self.inner.create_lock_region(name).await?;
        Ok(Arc::new(RenewingRegion {
            inner,
            renewals: self.renewals.clone(),
            failing: self.failing.clone(),
        }))
    }
}

struct RenewingRegion {
    inner: Arc<dyn LockRegion>,
    renewals: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl LockRegion for RenewingRegion {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn distributed_lock(&self) -> Arc<dyn DistributedLock> {
        Arc::new(RenewingLock {
            inner: self.inner.distributed_lock(),
            renewals: self.renewals.clone(),
            failing: self.failing.clone(),
        })
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), LockServiceError> {
        self.inner.put(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, LockServiceError> {
        self.inner.remove(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockServiceError> {
        self.inner.get(key).await
    }
}

struct RenewingLock {
    inner: Arc<dyn DistributedLock>,
    renewals: Arc<AtomicU64>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl DistributedLock for RenewingLock {
    async fn lock(&self) -> Result<(), LockServiceError> {
        self.inner.lock().await
    }

    async fn unlock(&self) -> Result<(), LockServiceError> {
        self.inner.unlock().await
    }

    async fn renew(&self) -> Result<(), LockServiceError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LockServiceError::Failed {
                reason: "lease expired".to_string(),
            });
        }
        Ok(())
    }

    async fn lost(&self) -> LockServiceError {
        self.inner.lost().await
    }
}
