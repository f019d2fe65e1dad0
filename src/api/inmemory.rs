//! In-memory implementation of [`LockService`] for testing.
//!
//! Provides a deterministic, non-persistent lock service that behaves like a
//! single-holder cluster lock without network or disk I/O. Fault switches let
//! tests make the service unreachable, fail region writes, or revoke the
//! current holder.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::watch;

use super::DistributedLock;
use super::LockRegion;
use super::LockService;
use super::LockServiceError;

#[derive(Debug, Default)]
struct Faults {
    unreachable: AtomicBool,
    fail_puts: AtomicBool,
    remove_delay_ms: AtomicU64,
}

/// In-memory deterministic implementation of [`LockService`].
///
/// Regions are created on first use and shared by every coordinator that uses
/// the same service, so several coordinators contending through one
/// `DeterministicLockService` behave like separate cluster members.
///
/// # Example
///
/// ```ignore
/// let service = DeterministicLockService::new();
/// let region = service.create_lock_region("cluster").await?;
/// let lock = region.distributed_lock();
/// lock.lock().await?;
/// region.put("leader", "node-1").await?;
/// ```
#[derive(Clone, Default)]
pub struct DeterministicLockService {
    regions: Arc<SyncMutex<HashMap<String, Arc<DeterministicRegion>>>>,
    faults: Arc<Faults>,
}

impl DeterministicLockService {
    /// Create a new, reachable lock service with no regions.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `create_lock_region` fail with [`LockServiceError::Unavailable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make every region `put` fail with [`LockServiceError::Failed`].
    pub fn set_fail_puts(&self, fail: bool) {
        self.faults.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Delay every region `remove` by `delay`, like a slow cluster round trip.
    pub fn set_remove_delay(&self, delay: Duration) {
        self.faults.remove_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Look up a region that has already been created.
    pub fn region(&self, name: &str) -> Option<Arc<DeterministicRegion>> {
        self.regions.lock().get(name).cloned()
    }
}

#[async_trait]
impl LockService for DeterministicLockService {
    async fn create_lock_region(&self, name: &str) -> Result<Arc<dyn LockRegion>, LockServiceError> {
        if self.faults.unreachable.load(Ordering::SeqCst) {
            return Err(LockServiceError::Unavailable {
                reason: format!("cannot reach cluster to create region '{name}'"),
            });
        }

        let mut regions = self.regions.lock();
        let region = regions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(DeterministicRegion::new(name, self.faults.clone())))
            .clone();
        Ok(region)
    }
}

struct LockCell {
    name: String,
    permits: Arc<Semaphore>,
    holder: SyncMutex<Option<u64>>,
    next_handle: AtomicU64,
    lost_tx: watch::Sender<Option<u64>>,
}

/// Region of a [`DeterministicLockService`].
pub struct DeterministicRegion {
    name: String,
    entries: SyncMutex<HashMap<String, String>>,
    lock: Arc<LockCell>,
    faults: Arc<Faults>,
    puts: AtomicU64,
    removes: AtomicU64,
}

impl DeterministicRegion {
    fn new(name: &str, faults: Arc<Faults>) -> Self {
        let (lost_tx, _) = watch::channel(None);
        Self {
            name: name.to_string(),
            entries: SyncMutex::new(HashMap::new()),
            lock: Arc::new(LockCell {
                name: name.to_string(),
                permits: Arc::new(Semaphore::new(1)),
                holder: SyncMutex::new(None),
                next_handle: AtomicU64::new(1),
                lost_tx,
            }),
            faults,
            puts: AtomicU64::new(0),
            removes: AtomicU64::new(0),
        }
    }

    /// Whether some handle currently holds the region lock.
    pub fn is_locked(&self) -> bool {
        self.lock.holder.lock().is_some()
    }

    /// Id of the handle holding the region lock.
    pub fn holder(&self) -> Option<u64> {
        *self.lock.holder.lock()
    }

    /// Signal the current holder that its hold was lost.
    ///
    /// Returns `false` when nobody holds the lock.
    pub fn force_loss(&self) -> bool {
        let holder = *self.lock.holder.lock();
        match holder {
            Some(id) => {
                self.lock.lost_tx.send_replace(Some(id));
                true
            }
            None => false,
        }
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of completed `remove` calls.
    pub fn remove_count(&self) -> u64 {
        self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockRegion for DeterministicRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn distributed_lock(&self) -> Arc<dyn DistributedLock> {
        let id = self.lock.next_handle.fetch_add(1, Ordering::SeqCst);
        Arc::new(DeterministicLock {
            id,
            cell: self.lock.clone(),
            permit: SyncMutex::new(None),
        })
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), LockServiceError> {
        if self.faults.fail_puts.load(Ordering::SeqCst) {
            return Err(LockServiceError::Failed {
                reason: format!("put '{key}' rejected by region '{}'", self.name),
            });
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<String>, LockServiceError> {
        let delay_ms = self.faults.remove_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let previous = self.entries.lock().remove(key);
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(previous)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockServiceError> {
        Ok(self.entries.lock().get(key).cloned())
    }
}

/// Lock handle handed out by [`DeterministicRegion::distributed_lock`].
///
/// Dropping a handle that still holds the lock releases it.
pub struct DeterministicLock {
    id: u64,
    cell: Arc<LockCell>,
    permit: SyncMutex<Option<OwnedSemaphorePermit>>,
}

impl DeterministicLock {
    fn clear_holder(&self) {
        let mut holder = self.cell.holder.lock();
        if *holder == Some(self.id) {
            *holder = None;
        }
    }
}

#[async_trait]
impl DistributedLock for DeterministicLock {
    async fn lock(&self) -> Result<(), LockServiceError> {
        if self.permit.lock().is_some() {
            return Ok(());
        }

        let permit = self.cell.permits.clone().acquire_owned().await.map_err(|_| LockServiceError::Failed {
            reason: format!("lock '{}' closed", self.cell.name),
        })?;

        // Nothing below awaits, so a dropped `lock()` future never leaves the
        // permit half-assigned.
        *self.permit.lock() = Some(permit);
        *self.cell.holder.lock() = Some(self.id);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), LockServiceError> {
        let permit = self.permit.lock().take();
        match permit {
            Some(permit) => {
                self.clear_holder();
                drop(permit);
                Ok(())
            }
            None => Err(LockServiceError::NotHeld {
                name: self.cell.name.clone(),
            }),
        }
    }

    async fn lost(&self) -> LockServiceError {
        let mut rx = self.cell.lost_tx.subscribe();
        loop {
            if *rx.borrow_and_update() == Some(self.id) {
                return LockServiceError::Lost {
                    name: self.cell.name.clone(),
                    reason: "holder revoked by region".to_string(),
                };
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

impl Drop for DeterministicLock {
    fn drop(&mut self) {
        if self.permit.get_mut().take().is_some() {
            self.clear_holder();
        }
    }
}
