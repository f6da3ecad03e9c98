use crate::types::{LwLockId, LwLockMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldLwLock {
    pub id: LwLockId,
    pub mode: LwLockMode,
}

/// Locks held by one process, oldest first.
///
/// Storage is reserved up front, so recording an acquisition never
/// allocates.
#[derive(Debug)]
pub struct HeldLwLocks {
    entries: Vec<HeldLwLock>,
    max: usize,
}

impl HeldLwLocks {
    pub fn new(max: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max),
            max,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max
    }

    pub fn mode_of(&self, id: LwLockId) -> Option<LwLockMode> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.mode)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeldLwLock> {
        self.entries.iter()
    }

    /// Callers check `is_full` first.
    pub(crate) fn record(&mut self, id: LwLockId, mode: LwLockMode) {
        debug_assert!(!self.is_full());
        debug_assert!(self.mode_of(id).is_none());
        self.entries.push(HeldLwLock { id, mode });
    }

    /// Forget `id`, keeping the order of the rest. Locks are usually
    /// released in reverse order, so search from the newest end.
    pub(crate) fn remove(&mut self, id: LwLockId) -> Option<LwLockMode> {
        let pos = self.entries.iter().rposition(|e| e.id == id)?;
        Some(self.entries.remove(pos).mode)
    }

    pub(crate) fn pop(&mut self) -> Option<HeldLwLock> {
        self.entries.pop()
    }
}
