use std::sync::Arc;

use log::warn;

use crate::error::LwLockError;
use crate::lwlock::{HeldLwLocks, LwLockArray};
use crate::types::{LwLockId, LwLockMode, ProcHandle};

/// One process's view of the lock array.
///
/// Owns the process's held-lock record; only this backend ever mutates it.
/// Dropping the backend releases whatever it still holds and returns its
/// process record to the registry.
pub struct Backend {
    locks: Arc<LwLockArray>,
    proc: Option<ProcHandle>,
    held: HeldLwLocks,
}

impl Backend {
    /// Attach with a fresh process record, so the backend can block.
    pub fn new(locks: Arc<LwLockArray>) -> Result<Self, LwLockError> {
        let proc = locks.procs().register()?;
        Ok(Self::attach(locks, Some(proc)))
    }

    /// Attach without a process identity. Such a backend can take free
    /// locks but must never need to wait.
    pub fn without_proc(locks: Arc<LwLockArray>) -> Self {
        Self::attach(locks, None)
    }

    fn attach(locks: Arc<LwLockArray>, proc: Option<ProcHandle>) -> Self {
        let held = HeldLwLocks::new(locks.max_held());
        Self { locks, proc, held }
    }

    pub fn proc(&self) -> Option<ProcHandle> {
        self.proc
    }

    pub fn locks(&self) -> &Arc<LwLockArray> {
        &self.locks
    }

    pub fn held(&self) -> &HeldLwLocks {
        &self.held
    }

    /// Acquire `id` in `mode`, blocking until granted.
    ///
    /// # Panics
    /// Aborts the process if this backend already holds `id`, or if it has
    /// to wait but has no process identity.
    pub fn acquire(&mut self, id: LwLockId, mode: LwLockMode) -> Result<(), LwLockError> {
        self.locks
            .acquire(&mut self.held, self.proc, id, mode, true)
            .map(|_| ())
    }

    /// Acquire `id` only if that needs no waiting. `Ok(false)` means it was
    /// not available; nothing was queued.
    pub fn conditional_acquire(
        &mut self,
        id: LwLockId,
        mode: LwLockMode,
    ) -> Result<bool, LwLockError> {
        self.locks.acquire(&mut self.held, self.proc, id, mode, false)
    }

    pub fn release(&mut self, id: LwLockId) -> Result<(), LwLockError> {
        self.locks.release(&mut self.held, id)
    }

    pub fn release_all(&mut self) {
        self.locks.release_all(&mut self.held);
    }

    pub fn held_by_me(&self, id: LwLockId) -> bool {
        self.held.mode_of(id).is_some()
    }

    pub fn held_exclusive_by_me(&self, id: LwLockId) -> bool {
        self.held.mode_of(id) == Some(LwLockMode::Exclusive)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if !self.held.is_empty() {
            let ids: Vec<LwLockId> = self.held.iter().map(|e| e.id).collect();
            warn!("backend {:?} exiting with LWLocks {:?} held", self.proc, ids);
            self.release_all();
        }
        if let Some(proc) = self.proc {
            self.locks.procs().unregister(proc);
        }
    }
}
