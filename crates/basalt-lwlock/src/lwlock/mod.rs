pub mod held;
mod plan;
mod queue;
mod slot;

use core::mem::size_of;
use core::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use basalt_shmem::{add_size, align_up, mul_size, ShmemAllocator, ShmemError};
use log::{debug, trace};

use crate::config::MAX_SIMUL_LWLOCKS;
use crate::error::{Fatal, LwLockError, StartupError};
use crate::fatal;
use crate::proc::semaphore::Interrupted;
use crate::proc::{Proc, ProcRegistry};
use crate::types::{LwLockId, LwLockMode, ProcHandle, NUM_FIXED_LWLOCKS};

pub use held::{HeldLwLock, HeldLwLocks};
pub use plan::LwLockPlan;
pub use slot::LWLOCK_PADDED_SIZE;

use queue::{WaitLinks, WakeList};
use slot::{LwLock, LwLockPadded};

/// Sits in front of the slots in shared memory.
#[repr(C)]
struct LwLockHeader {
    num_locks: u32,
    next_dynamic: AtomicU32,
}

/// Consistent copy of one slot, taken under its spinlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LwLockSnapshot {
    pub exclusive: bool,
    pub shared: u32,
    pub exclusive_owner: Option<ProcHandle>,
    pub release_ok: bool,
    pub waiters: Vec<(ProcHandle, LwLockMode)>,
}

impl LwLockSnapshot {
    pub fn is_free(&self) -> bool {
        !self.exclusive && self.shared == 0
    }
}

/// The lock array: a fixed run of cache-line padded slots carved from
/// shared memory at startup.
pub struct LwLockArray {
    header: NonNull<LwLockHeader>,
    slots: NonNull<LwLockPadded>,
    num_locks: usize,
    max_held: usize,
    procs: Arc<ProcRegistry>,
    links: WaitLinks,
    // Owns the memory behind `header` and `slots`.
    _shmem: Arc<dyn ShmemAllocator>,
}

// SAFETY: slot state is only reached through each slot's spinlock, the
// header only through atomics, and the backing memory lives as long as
// `_shmem`.
unsafe impl Send for LwLockArray {}
unsafe impl Sync for LwLockArray {}

impl LwLockArray {
    /// Shared memory needed for `num_locks` slots: the slots, the header,
    /// and one slot of slack to align the slot run.
    pub fn shmem_size(num_locks: usize) -> Result<usize, ShmemError> {
        let size = mul_size(num_locks, LWLOCK_PADDED_SIZE)?;
        let size = add_size(size, size_of::<LwLockHeader>())?;
        add_size(size, LWLOCK_PADDED_SIZE)
    }

    pub fn create(
        num_locks: usize,
        shmem: Arc<dyn ShmemAllocator>,
        procs: Arc<ProcRegistry>,
    ) -> Result<Self, StartupError> {
        if num_locks == 0 {
            return Err(StartupError::NoLocks);
        }
        let count = u32::try_from(num_locks).map_err(|_| ShmemError::SizeOverflow)?;
        let size = Self::shmem_size(num_locks)?;
        let base = shmem.alloc(size)?;

        let base_addr = base.as_ptr() as usize;
        let first_slot =
            align_up(base_addr + size_of::<LwLockHeader>(), LWLOCK_PADDED_SIZE)? - base_addr;

        // SAFETY: the block is `size` bytes and aligned for the header. The
        // slot run starts inside the slack slot, so it ends inside the block.
        let slots = unsafe {
            base.cast::<LwLockHeader>().as_ptr().write(LwLockHeader {
                num_locks: count,
                next_dynamic: AtomicU32::new(NUM_FIXED_LWLOCKS.min(count)),
            });
            let slots = base.as_ptr().add(first_slot).cast::<LwLockPadded>();
            for i in 0..num_locks {
                slots.add(i).write(LwLockPadded::new());
            }
            NonNull::new_unchecked(slots)
        };

        debug!(
            "LWLock array created: {} locks, {} bytes of shared memory",
            num_locks, size
        );

        Ok(Self {
            header: base.cast(),
            slots,
            num_locks,
            max_held: MAX_SIMUL_LWLOCKS,
            links: WaitLinks::new(procs.capacity()),
            procs,
            _shmem: shmem,
        })
    }

    /// Per-process held-lock capacity for backends attached to this array.
    pub fn with_max_held(mut self, max_held: usize) -> Self {
        self.max_held = max_held;
        self
    }

    pub fn num_locks(&self) -> usize {
        self.num_locks
    }

    pub fn max_held(&self) -> usize {
        self.max_held
    }

    pub fn procs(&self) -> &Arc<ProcRegistry> {
        &self.procs
    }

    fn header(&self) -> &LwLockHeader {
        // SAFETY: written in `create`, never moved.
        unsafe { self.header.as_ref() }
    }

    fn lock(&self, id: LwLockId) -> Result<&LwLock, LwLockError> {
        if id.index() >= self.num_locks {
            return Err(LwLockError::OutOfRange {
                id,
                num_locks: self.num_locks,
            });
        }
        // SAFETY: index checked against the initialized slot run.
        Ok(unsafe { &(*self.slots.as_ptr().add(id.index())).lock })
    }

    /// Hand out an id from the pool above the reserved fixed ids.
    pub fn assign(&self) -> Result<LwLockId, LwLockError> {
        let header = self.header();
        let limit = header.num_locks;
        header
            .next_dynamic
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < limit).then_some(next + 1)
            })
            .map(LwLockId)
            .map_err(|_| LwLockError::NoFreeIds)
    }

    pub fn snapshot(&self, id: LwLockId) -> Result<LwLockSnapshot, LwLockError> {
        let lock = self.lock(id)?;
        // Reserved before locking: every waiter is a registered process.
        let mut waiters = Vec::with_capacity(self.procs.capacity());
        let state = lock.mutex.lock();
        self.links
            .for_each_waiter(&state, |proc, mode| waiters.push((proc, mode)));
        Ok(LwLockSnapshot {
            exclusive: state.exclusive,
            shared: state.shared,
            exclusive_owner: state.exclusive_owner,
            release_ok: state.release_ok,
            waiters,
        })
    }

    /// The slot `proc` is currently queued on, if any.
    pub fn queued_on(&self, proc: ProcHandle) -> Option<LwLockId> {
        self.procs.get(proc)?;
        self.links.queued_on(proc)
    }

    /// Acquire `id` for the process owning `held`. Returns `Ok(false)` only
    /// when `wait` is false and the lock is not immediately available.
    pub(crate) fn acquire(
        &self,
        held: &mut HeldLwLocks,
        me: Option<ProcHandle>,
        id: LwLockId,
        mode: LwLockMode,
        wait: bool,
    ) -> Result<bool, LwLockError> {
        let lock = self.lock(id)?;

        if held.mode_of(id).is_some() {
            fatal::abort(Fatal::SelfDeadlock(id));
        }
        if held.is_full() {
            return Err(LwLockError::TooManyHeld {
                max: held.capacity(),
            });
        }

        let mut state = lock.mutex.lock();
        if state.grantable(mode) {
            state.grant(mode, me);
            drop(state);
            held.record(id, mode);
            trace!("lock {} acquired {:?} by {:?}", id, mode, me);
            return Ok(true);
        }
        if !wait {
            return Ok(false);
        }

        let Some(proc) = me.and_then(|h| self.procs.get(h)) else {
            drop(state);
            fatal::abort(Fatal::NoProc(id));
        };
        proc.begin_wait(mode);
        self.links.enqueue(&mut state, id, proc.handle(), mode);
        drop(state);

        trace!("lock {} {:?}: {} waiting", id, mode, proc.handle());
        self.wait_for_grant(id, proc)?;

        held.record(id, mode);
        trace!("lock {} acquired {:?} by {} after wait", id, mode, proc.handle());
        Ok(true)
    }

    /// Sleep until a releaser has made us the owner. The releaser updates
    /// the slot before posting, so there is nothing to re-check here.
    fn wait_for_grant(&self, id: LwLockId, proc: &Proc) -> Result<(), LwLockError> {
        let sema = proc.semaphore();
        let mut extra_waits = 0;

        let result = loop {
            match sema.lock(true) {
                Ok(()) if !proc.is_waiting() => break Ok(()),
                // Posted for some other reason; give it back afterwards.
                Ok(()) => extra_waits += 1,
                Err(Interrupted) => {
                    if self.cancel_wait(id, proc) {
                        break Err(LwLockError::Interrupted(id));
                    }
                    // The grant won the race. Take the handoff and leave
                    // the interrupt pending for the caller.
                    loop {
                        match sema.lock(false) {
                            Ok(()) if !proc.is_waiting() => break,
                            Ok(()) => extra_waits += 1,
                            Err(Interrupted) => {}
                        }
                    }
                    break Ok(());
                }
            }
        };

        for _ in 0..extra_waits {
            sema.unlock();
        }
        result
    }

    /// Take an interrupted waiter off the queue. Returns false if it was
    /// already granted the lock.
    fn cancel_wait(&self, id: LwLockId, proc: &Proc) -> bool {
        let Ok(lock) = self.lock(id) else {
            return false;
        };

        let mut state = lock.mutex.lock();
        if self.links.queued_on(proc.handle()) != Some(id) {
            return false;
        }
        self.links.remove(&mut state, proc.handle());
        proc.end_wait();
        // Whoever was behind us may be grantable now.
        let wake = self.links.grant_waiters(&mut state);
        drop(state);

        trace!("lock {}: {} stopped waiting", id, proc.handle());
        self.wake(wake);
        true
    }

    pub(crate) fn release(
        &self,
        held: &mut HeldLwLocks,
        id: LwLockId,
    ) -> Result<(), LwLockError> {
        let mode = held.remove(id).ok_or(LwLockError::NotHeld(id))?;
        self.release_mode(id, mode);
        Ok(())
    }

    /// Release everything in `held`, newest first.
    pub(crate) fn release_all(&self, held: &mut HeldLwLocks) {
        while let Some(entry) = held.pop() {
            self.release_mode(entry.id, entry.mode);
        }
    }

    fn release_mode(&self, id: LwLockId, mode: LwLockMode) {
        // Held entries were range checked when acquired.
        let Ok(lock) = self.lock(id) else {
            return;
        };

        let mut state = lock.mutex.lock();
        state.release(mode);
        let wake = if state.release_ok && state.head.is_some() {
            self.links.grant_waiters(&mut state)
        } else {
            WakeList::default()
        };
        drop(state);

        trace!("lock {} released {:?}, waking {}", id, mode, wake.len);
        self.wake(wake);
    }

    /// Signal detached waiters, outside any spinlock.
    fn wake(&self, list: WakeList) {
        let mut cur = list.first;
        while let Some(handle) = cur {
            // Read the chain before the waiter can run and reuse its link.
            cur = self.links.pop_detached(handle);
            if let Some(proc) = self.procs.get(handle) {
                proc.end_wait();
                proc.semaphore().unlock();
            }
        }
    }
}
