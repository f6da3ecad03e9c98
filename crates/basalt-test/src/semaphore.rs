use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use basalt_lwlock::{Interrupted, ProcHandle, ProcRegistry, ProcSemaphore, Semaphore};

/// Call counts for one recording semaphore.
#[derive(Debug, Default)]
pub struct SemaphoreCalls {
    locks: AtomicUsize,
    unlocks: AtomicUsize,
    interrupts: AtomicUsize,
    // Lock calls that returned `Ok`, each having consumed one post.
    woken: AtomicUsize,
    late_interrupt: AtomicBool,
}

impl SemaphoreCalls {
    pub fn locks(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn unlocks(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Posts not yet consumed by a successful lock.
    pub fn pending_posts(&self) -> usize {
        self.unlocks() - self.woken.load(Ordering::SeqCst)
    }

    /// Make the next interruptible lock wait for a post, put it back, and
    /// then report an interrupt, as if both arrived while it slept.
    pub fn interrupt_after_next_post(&self) {
        self.late_interrupt.store(true, Ordering::SeqCst);
    }
}

/// A real semaphore that counts how it is used.
pub struct RecordingSemaphore {
    inner: Semaphore,
    calls: Arc<SemaphoreCalls>,
}

impl RecordingSemaphore {
    pub fn new() -> (Self, Arc<SemaphoreCalls>) {
        let calls = Arc::new(SemaphoreCalls::default());
        let sema = Self {
            inner: Semaphore::new(),
            calls: Arc::clone(&calls),
        };
        (sema, calls)
    }
}

impl ProcSemaphore for RecordingSemaphore {
    fn lock(&self, interrupt_ok: bool) -> Result<(), Interrupted> {
        self.calls.locks.fetch_add(1, Ordering::SeqCst);
        if interrupt_ok && self.calls.late_interrupt.swap(false, Ordering::SeqCst) {
            self.inner.lock(false)?;
            self.inner.unlock();
            self.inner.interrupt();
            return Err(Interrupted);
        }
        let result = self.inner.lock(interrupt_ok);
        if result.is_ok() {
            self.calls.woken.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    fn unlock(&self) {
        self.calls.unlocks.fetch_add(1, Ordering::SeqCst);
        self.inner.unlock();
    }

    fn interrupt(&self) {
        self.calls.interrupts.fetch_add(1, Ordering::SeqCst);
        self.inner.interrupt();
    }

    fn clear_interrupt(&self) {
        self.inner.clear_interrupt();
    }

    fn interrupt_pending(&self) -> bool {
        self.inner.interrupt_pending()
    }
}

/// Registry whose processes use recording semaphores. `calls[i]` belongs
/// to the process with handle `i + 1`.
pub fn recording_registry(max_procs: usize) -> (ProcRegistry, Vec<Arc<SemaphoreCalls>>) {
    let mut calls = Vec::with_capacity(max_procs);
    let registry = ProcRegistry::with_semaphores(max_procs, |_: ProcHandle| {
        let (sema, c) = RecordingSemaphore::new();
        calls.push(c);
        Box::new(sema)
    });
    (registry, calls)
}
