use core::mem::{align_of, size_of};

use basalt_shmem::CACHE_LINE_SIZE;

use crate::sync::SpinLock;
use crate::types::{LwLockMode, ProcHandle};

/// Per-slot state. Only mutated under the slot's spinlock.
///
/// States: FREE (`!exclusive && shared == 0`), SHARED(n) (`shared == n`),
/// EXCLUSIVE (`exclusive`, owner recorded when the holder has a process
/// identity). `head`/`tail` delimit the FIFO wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LwLockState {
    pub release_ok: bool,
    pub exclusive: bool,
    pub shared: u32,
    pub exclusive_owner: Option<ProcHandle>,
    pub head: Option<ProcHandle>,
    pub tail: Option<ProcHandle>,
}

impl LwLockState {
    pub const fn new() -> Self {
        Self {
            release_ok: true,
            exclusive: false,
            shared: 0,
            exclusive_owner: None,
            head: None,
            tail: None,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.exclusive && self.shared == 0
    }

    pub fn compatible(&self, mode: LwLockMode) -> bool {
        match mode {
            LwLockMode::Exclusive => self.is_free(),
            LwLockMode::Shared => !self.exclusive,
        }
    }

    /// Grantable without waiting: compatible, and nobody older is queued.
    pub fn grantable(&self, mode: LwLockMode) -> bool {
        self.head.is_none() && self.compatible(mode)
    }

    pub fn grant(&mut self, mode: LwLockMode, owner: Option<ProcHandle>) {
        debug_assert!(self.compatible(mode));
        match mode {
            LwLockMode::Exclusive => {
                self.exclusive = true;
                self.exclusive_owner = owner;
            }
            LwLockMode::Shared => self.shared += 1,
        }
    }

    pub fn release(&mut self, mode: LwLockMode) {
        match mode {
            LwLockMode::Exclusive => {
                debug_assert!(self.exclusive);
                self.exclusive = false;
                self.exclusive_owner = None;
            }
            LwLockMode::Shared => {
                debug_assert!(self.shared > 0);
                self.shared = self.shared.saturating_sub(1);
            }
        }
        if self.is_free() {
            self.release_ok = true;
        }
    }
}

pub(crate) struct LwLock {
    pub mutex: SpinLock<LwLockState>,
}

impl LwLock {
    pub const fn new() -> Self {
        Self {
            mutex: SpinLock::new(LwLockState::new()),
        }
    }
}

/// Stride of one slot in the lock array.
pub const LWLOCK_PADDED_SIZE: usize = CACHE_LINE_SIZE;

const LWLOCK_PAD: usize = LWLOCK_PADDED_SIZE - size_of::<LwLock>();

/// One slot per cache line, so neighbouring slots never share a line.
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64"
    ),
    repr(C, align(128))
)]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64"
    )),
    repr(C, align(64))
)]
pub(crate) struct LwLockPadded {
    pub lock: LwLock,
    _pad: [u8; LWLOCK_PAD],
}

const _: () = assert!(size_of::<LwLockPadded>() == LWLOCK_PADDED_SIZE);
const _: () = assert!(align_of::<LwLockPadded>() == CACHE_LINE_SIZE);

impl LwLockPadded {
    pub const fn new() -> Self {
        Self {
            lock: LwLock::new(),
            _pad: [0; LWLOCK_PAD],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: u32) -> Option<ProcHandle> {
        ProcHandle::new(id)
    }

    #[test]
    fn new_slot_is_free_and_release_ok() {
        let s = LwLockState::new();
        assert!(s.is_free());
        assert!(s.release_ok);
        assert!(s.grantable(LwLockMode::Exclusive));
        assert!(s.grantable(LwLockMode::Shared));
    }

    #[test]
    fn shared_holders_exclude_exclusive_only() {
        let mut s = LwLockState::new();
        s.grant(LwLockMode::Shared, owner(1));
        s.grant(LwLockMode::Shared, owner(2));
        assert_eq!(s.shared, 2);
        assert!(s.compatible(LwLockMode::Shared));
        assert!(!s.compatible(LwLockMode::Exclusive));

        s.release(LwLockMode::Shared);
        assert!(!s.compatible(LwLockMode::Exclusive));
        s.release(LwLockMode::Shared);
        assert!(s.is_free());
    }

    #[test]
    fn exclusive_excludes_everything_and_records_owner() {
        let mut s = LwLockState::new();
        s.grant(LwLockMode::Exclusive, owner(7));
        assert!(s.exclusive);
        assert_eq!(s.exclusive_owner, owner(7));
        assert!(!s.compatible(LwLockMode::Shared));
        assert!(!s.compatible(LwLockMode::Exclusive));

        s.release(LwLockMode::Exclusive);
        assert!(s.is_free());
        assert_eq!(s.exclusive_owner, None);
    }

    #[test]
    fn queued_waiters_block_the_fast_path() {
        let mut s = LwLockState::new();
        s.grant(LwLockMode::Shared, owner(1));
        s.head = owner(2);
        s.tail = owner(2);
        assert!(s.compatible(LwLockMode::Shared));
        assert!(!s.grantable(LwLockMode::Shared));
    }

    #[test]
    fn returning_to_free_restores_release_ok() {
        let mut s = LwLockState::new();
        s.grant(LwLockMode::Shared, None);
        s.grant(LwLockMode::Shared, None);
        s.release_ok = false;
        s.release(LwLockMode::Shared);
        assert!(!s.release_ok);
        s.release(LwLockMode::Shared);
        assert!(s.release_ok);
    }

    #[test]
    fn padded_slot_fills_one_cache_line() {
        assert_eq!(size_of::<LwLockPadded>(), CACHE_LINE_SIZE);
        assert!(size_of::<LwLock>() <= CACHE_LINE_SIZE);
    }
}
