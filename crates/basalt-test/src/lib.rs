mod semaphore;
mod shmem_fake;

pub use semaphore::{recording_registry, RecordingSemaphore, SemaphoreCalls};
pub use shmem_fake::FakeShmem;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use basalt_lwlock::{
    Backend, LwLockArray, LwLockError, LwLockId, LwLockMode, LwLockSnapshot, ProcHandle,
    StartupError,
};
use log::debug;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("timed out waiting for {expected} waiters on lock {id} (saw {found})")]
    WaitersTimeout {
        id: LwLockId,
        expected: usize,
        found: usize,
    },
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    LwLock(#[from] LwLockError),
}

/// A lock array on fake shared memory with recorded semaphores.
pub struct TestEngine {
    pub shmem: Arc<FakeShmem>,
    pub locks: Arc<LwLockArray>,
    calls: Vec<Arc<SemaphoreCalls>>,
}

impl TestEngine {
    pub fn new(num_locks: usize, max_procs: usize) -> Result<Self, StartupError> {
        let shmem = Arc::new(FakeShmem::new());
        let (registry, calls) = recording_registry(max_procs);
        let locks = LwLockArray::create(num_locks, shmem.clone(), Arc::new(registry))?;
        debug!("test engine: {} locks, {} procs", num_locks, max_procs);
        Ok(Self {
            shmem,
            locks: Arc::new(locks),
            calls,
        })
    }

    pub fn backend(&self) -> Result<Backend, LwLockError> {
        Backend::new(Arc::clone(&self.locks))
    }

    pub fn calls(&self, proc: ProcHandle) -> &SemaphoreCalls {
        &self.calls[proc.val() as usize - 1]
    }

    pub fn snapshot(&self, id: LwLockId) -> Result<LwLockSnapshot, LwLockError> {
        self.locks.snapshot(id)
    }

    pub fn waiters(&self, id: LwLockId) -> Result<Vec<(ProcHandle, LwLockMode)>, LwLockError> {
        Ok(self.locks.snapshot(id)?.waiters)
    }

    /// Block until `id` has exactly `n` queued waiters.
    pub fn wait_for_waiters(&self, id: LwLockId, n: usize) -> Result<(), HarnessError> {
        let deadline = Instant::now() + POLL_TIMEOUT;
        loop {
            let found = self.waiters(id)?.len();
            if found == n {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(HarnessError::WaitersTimeout {
                    id,
                    expected: n,
                    found,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Poll `cond` until it holds or the harness timeout passes.
pub fn wait_until(what: &'static str, mut cond: impl FnMut() -> bool) -> Result<(), HarnessError> {
    let deadline = Instant::now() + POLL_TIMEOUT;
    while !cond() {
        if Instant::now() > deadline {
            return Err(HarnessError::Timeout(what));
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

/// Check the slot state invariants on a snapshot.
pub fn check_slot(snap: &LwLockSnapshot) -> Result<(), String> {
    if snap.exclusive && snap.shared != 0 {
        return Err(format!("exclusive with {} shared holders", snap.shared));
    }
    if !snap.exclusive && snap.exclusive_owner.is_some() {
        return Err("exclusive owner recorded on a non-exclusive slot".into());
    }
    if snap.is_free() && !snap.release_ok {
        return Err("free slot left with release_ok unset".into());
    }
    let mut seen = Vec::with_capacity(snap.waiters.len());
    for (proc, _) in &snap.waiters {
        if seen.contains(proc) {
            return Err(format!("{} queued twice", proc));
        }
        seen.push(*proc);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_shmem::ShmemAllocator;

    #[test]
    fn engine_allocates_exactly_the_declared_size() {
        let engine = TestEngine::new(8, 2).unwrap();
        assert_eq!(
            engine.shmem.total_allocated(),
            LwLockArray::shmem_size(8).unwrap()
        );
        assert_eq!(engine.shmem.allocations(), 1);
    }

    #[test]
    fn wait_for_waiters_times_out_with_details() {
        let engine = TestEngine::new(2, 1).unwrap();
        assert!(engine.wait_for_waiters(LwLockId(0), 0).is_ok());
        assert_eq!(
            engine.wait_for_waiters(LwLockId(9), 0),
            Err(HarnessError::LwLock(LwLockError::OutOfRange {
                id: LwLockId(9),
                num_locks: 2
            }))
        );
    }

    #[test]
    fn check_slot_accepts_fresh_slots() {
        let engine = TestEngine::new(4, 1).unwrap();
        for i in 0..4 {
            check_slot(&engine.snapshot(LwLockId(i)).unwrap()).unwrap();
        }
    }
}
