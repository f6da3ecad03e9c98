use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// Per-process wakeup primitive.
///
/// Each process blocks only on its own semaphore; other processes post it
/// to hand over a lock.
pub trait ProcSemaphore: Send + Sync {
    /// Block until posted. With `interrupt_ok`, a pending interrupt ends
    /// the wait early instead.
    fn lock(&self, interrupt_ok: bool) -> Result<(), Interrupted>;

    fn unlock(&self);

    /// Deliver an interrupt; it stays pending until cleared.
    fn interrupt(&self);

    fn clear_interrupt(&self);

    fn interrupt_pending(&self) -> bool;
}

#[derive(Default)]
struct SemaState {
    count: u32,
    interrupt_pending: bool,
}

/// Counting semaphore backed by a mutex and condition variable.
#[derive(Default)]
pub struct Semaphore {
    state: Mutex<SemaState>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcSemaphore for Semaphore {
    fn lock(&self, interrupt_ok: bool) -> Result<(), Interrupted> {
        let mut state = self.state.lock();
        loop {
            // A post that already arrived wins over an interrupt.
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            if interrupt_ok && state.interrupt_pending {
                return Err(Interrupted);
            }
            self.cond.wait(&mut state);
        }
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        state.count += 1;
        self.cond.notify_one();
    }

    fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupt_pending = true;
        self.cond.notify_all();
    }

    fn clear_interrupt(&self) {
        self.state.lock().interrupt_pending = false;
    }

    fn interrupt_pending(&self) -> bool {
        self.state.lock().interrupt_pending
    }
}
