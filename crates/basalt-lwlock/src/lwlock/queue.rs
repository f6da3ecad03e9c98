use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use super::slot::LwLockState;
use crate::types::{LwLockId, LwLockMode, ProcHandle};

const NONE: u32 = 0;

/// Queue link of one process: which slot it waits on, for what, and who
/// follows it.
#[derive(Default)]
struct WaitLink {
    next: AtomicU32,
    queued_on: AtomicU32,
    mode: AtomicU8,
}

/// Wait queue storage for every slot of a lock array.
///
/// A slot's queue is the chain `head -> next -> ... -> tail` threaded
/// through this table, one entry per registered process. The table belongs
/// to the lock array, not to the process records, and an entry is only
/// touched under the spinlock of the slot that entry is queued on. Since an
/// entry holds a single `queued_on`, a process is structurally on at most
/// one queue.
pub(crate) struct WaitLinks {
    links: Box<[WaitLink]>,
}

/// Waiters detached from a queue and granted the lock, still to be
/// signalled. The chain stays readable until each member is signalled.
#[must_use]
#[derive(Debug, Default)]
pub(crate) struct WakeList {
    pub first: Option<ProcHandle>,
    pub len: usize,
}

impl WakeList {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn encode_proc(proc: Option<ProcHandle>) -> u32 {
    proc.map_or(NONE, |p| p.val())
}

fn encode_slot(id: LwLockId) -> u32 {
    id.val() + 1
}

impl WaitLinks {
    pub fn new(max_procs: usize) -> Self {
        Self {
            links: (0..max_procs).map(|_| WaitLink::default()).collect(),
        }
    }

    fn link(&self, proc: ProcHandle) -> &WaitLink {
        &self.links[proc.index()]
    }

    pub fn next(&self, proc: ProcHandle) -> Option<ProcHandle> {
        ProcHandle::new(self.link(proc).next.load(Ordering::Acquire))
    }

    fn set_next(&self, proc: ProcHandle, next: Option<ProcHandle>) {
        self.link(proc).next.store(encode_proc(next), Ordering::Release);
    }

    pub fn queued_on(&self, proc: ProcHandle) -> Option<LwLockId> {
        match self.link(proc).queued_on.load(Ordering::Acquire) {
            NONE => None,
            raw => Some(LwLockId(raw - 1)),
        }
    }

    pub fn mode(&self, proc: ProcHandle) -> Option<LwLockMode> {
        LwLockMode::from_raw(self.link(proc).mode.load(Ordering::Relaxed))
    }

    /// Append `proc` to the tail of slot `id`'s queue.
    pub fn enqueue(
        &self,
        state: &mut LwLockState,
        id: LwLockId,
        proc: ProcHandle,
        mode: LwLockMode,
    ) {
        let link = self.link(proc);
        debug_assert_eq!(link.queued_on.load(Ordering::Relaxed), NONE);

        link.mode.store(mode.to_raw(), Ordering::Relaxed);
        link.next.store(NONE, Ordering::Relaxed);
        link.queued_on.store(encode_slot(id), Ordering::Release);

        match state.tail {
            Some(tail) => self.set_next(tail, Some(proc)),
            None => state.head = Some(proc),
        }
        state.tail = Some(proc);
    }

    /// Unlink `proc` from wherever it sits in the queue. Returns false if it
    /// was not queued there.
    pub fn remove(&self, state: &mut LwLockState, proc: ProcHandle) -> bool {
        let mut prev: Option<ProcHandle> = None;
        let mut cur = state.head;
        while let Some(p) = cur {
            if p == proc {
                let next = self.next(p);
                match prev {
                    Some(prev) => self.set_next(prev, next),
                    None => state.head = next,
                }
                if state.tail == Some(p) {
                    state.tail = prev;
                }
                self.clear(p);
                return true;
            }
            prev = cur;
            cur = self.next(p);
        }
        false
    }

    fn clear(&self, proc: ProcHandle) {
        let link = self.link(proc);
        link.next.store(NONE, Ordering::Relaxed);
        link.queued_on.store(NONE, Ordering::Release);
    }

    /// Transfer the lock to the oldest compatible waiters: an exclusive
    /// head alone, or a shared head plus every shared request directly
    /// behind it. Updates `state` on their behalf and detaches them.
    pub fn grant_waiters(&self, state: &mut LwLockState) -> WakeList {
        let Some(head) = state.head else {
            return WakeList::default();
        };

        let mut last = head;
        let mut len = 1;
        match self.mode(head) {
            Some(LwLockMode::Exclusive) => {
                if !state.is_free() {
                    return WakeList::default();
                }
                state.grant(LwLockMode::Exclusive, Some(head));
            }
            Some(LwLockMode::Shared) => {
                if state.exclusive {
                    return WakeList::default();
                }
                while let Some(next) = self.next(last) {
                    if self.mode(next) != Some(LwLockMode::Shared) {
                        break;
                    }
                    last = next;
                    len += 1;
                }
                state.shared += len as u32;
            }
            None => return WakeList::default(),
        }

        state.head = self.next(last);
        if state.head.is_none() {
            state.tail = None;
        }
        self.set_next(last, None);

        // Detached members are owners now; an interrupted one must not
        // find itself still queued.
        let mut cur = Some(head);
        while let Some(p) = cur {
            self.link(p).queued_on.store(NONE, Ordering::Release);
            cur = self.next(p);
        }

        state.release_ok = false;
        WakeList {
            first: Some(head),
            len,
        }
    }

    /// Take the next member off a detached chain.
    pub fn pop_detached(&self, proc: ProcHandle) -> Option<ProcHandle> {
        let next = self.next(proc);
        self.set_next(proc, None);
        next
    }

    /// Visit the queue in order.
    pub fn for_each_waiter<F>(&self, state: &LwLockState, mut f: F)
    where
        F: FnMut(ProcHandle, LwLockMode),
    {
        let mut cur = state.head;
        while let Some(p) = cur {
            if let Some(mode) = self.mode(p) {
                f(p, mode);
            }
            cur = self.next(p);
        }
    }
}
