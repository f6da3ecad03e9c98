pub mod semaphore;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use log::debug;
use semaphore::{ProcSemaphore, Semaphore};

use crate::error::LwLockError;
use crate::types::{LwLockMode, ProcHandle};

/// Shared-visible record of one process.
///
/// `waiting` is set by the process itself before it blocks and cleared by
/// whoever hands it the lock, right before posting its semaphore.
pub struct Proc {
    handle: ProcHandle,
    sema: Box<dyn ProcSemaphore>,
    in_use: AtomicBool,
    waiting: AtomicBool,
    wait_mode: AtomicU8,
}

impl Proc {
    fn new(handle: ProcHandle, sema: Box<dyn ProcSemaphore>) -> Self {
        Self {
            handle,
            sema,
            in_use: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            wait_mode: AtomicU8::new(0),
        }
    }

    pub fn handle(&self) -> ProcHandle {
        self.handle
    }

    pub fn semaphore(&self) -> &dyn ProcSemaphore {
        self.sema.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    /// Mode of the request this process is (or was last) queued for.
    pub fn wait_mode(&self) -> Option<LwLockMode> {
        LwLockMode::from_raw(self.wait_mode.load(Ordering::Relaxed))
    }

    pub(crate) fn begin_wait(&self, mode: LwLockMode) {
        self.wait_mode.store(mode.to_raw(), Ordering::Relaxed);
        self.waiting.store(true, Ordering::Release);
    }

    pub(crate) fn end_wait(&self) {
        self.waiting.store(false, Ordering::Release);
    }
}

/// Fixed table of process records, sized once at startup.
pub struct ProcRegistry {
    procs: Box<[Proc]>,
}

impl ProcRegistry {
    pub fn new(max_procs: usize) -> Self {
        Self::with_semaphores(max_procs, |_| Box::new(Semaphore::new()))
    }

    /// Build the table with a caller-chosen semaphore per process.
    pub fn with_semaphores<F>(max_procs: usize, mut make_sema: F) -> Self
    where
        F: FnMut(ProcHandle) -> Box<dyn ProcSemaphore>,
    {
        let procs = (0..max_procs)
            .map(|i| {
                let handle = ProcHandle::from_index(i);
                Proc::new(handle, make_sema(handle))
            })
            .collect();
        Self { procs }
    }

    pub fn capacity(&self) -> usize {
        self.procs.len()
    }

    pub fn active(&self) -> usize {
        self.procs
            .iter()
            .filter(|p| p.in_use.load(Ordering::Relaxed))
            .count()
    }

    /// Claim a free process record.
    pub fn register(&self) -> Result<ProcHandle, LwLockError> {
        let proc = self
            .procs
            .iter()
            .find(|p| {
                p.in_use
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            })
            .ok_or(LwLockError::NoFreeProcs {
                max: self.capacity(),
            })?;

        proc.end_wait();
        proc.wait_mode.store(0, Ordering::Relaxed);
        proc.sema.clear_interrupt();
        debug!("Registered {}", proc.handle);
        Ok(proc.handle)
    }

    pub fn unregister(&self, handle: ProcHandle) {
        if let Some(proc) = self.procs.get(handle.index()) {
            debug_assert!(!proc.is_waiting(), "{} unregistered while waiting", handle);
            proc.sema.clear_interrupt();
            proc.in_use.store(false, Ordering::Release);
            debug!("Unregistered {}", handle);
        }
    }

    pub fn get(&self, handle: ProcHandle) -> Option<&Proc> {
        self.procs.get(handle.index())
    }

    /// Deliver an interrupt to a process, waking it if it is blocked in an
    /// interruptible wait.
    pub fn interrupt(&self, handle: ProcHandle) {
        if let Some(proc) = self.get(handle) {
            proc.sema.interrupt();
        }
    }

    pub fn clear_interrupt(&self, handle: ProcHandle) {
        if let Some(proc) = self.get(handle) {
            proc.sema.clear_interrupt();
        }
    }
}
