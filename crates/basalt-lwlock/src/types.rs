use core::fmt;
use core::num::NonZeroU32;

/// Process identifier
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ProcHandle(NonZeroU32);

impl ProcHandle {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn val(&self) -> u32 {
        self.0.get()
    }

    /// Zero-based slot in the process registry.
    pub(crate) fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index as u32))
    }
}

impl fmt::Display for ProcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc {}", self.0)
    }
}

/// Index of a lock slot in the lock array.
///
/// Ids below [`NUM_FIXED_LWLOCKS`] are reserved for the engine's own
/// bootstrap structures; the rest are handed out by `LwLockArray::assign`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LwLockId(pub u32);

impl LwLockId {
    pub const BUFFER_FREELIST: LwLockId = LwLockId(0);
    pub const SHMEM_INDEX: LwLockId = LwLockId(1);
    pub const OID_GEN: LwLockId = LwLockId(2);
    pub const XID_GEN: LwLockId = LwLockId(3);
    pub const PROC_ARRAY: LwLockId = LwLockId(4);
    pub const SINVAL: LwLockId = LwLockId(5);
    pub const FREE_SPACE: LwLockId = LwLockId(6);
    pub const WAL_INSERT: LwLockId = LwLockId(7);
    pub const WAL_WRITE: LwLockId = LwLockId(8);
    pub const CONTROL_FILE: LwLockId = LwLockId(9);
    pub const CHECKPOINT: LwLockId = LwLockId(10);
    pub const CHECKPOINT_START: LwLockId = LwLockId(11);
    pub const CLOG_CONTROL: LwLockId = LwLockId(12);
    pub const SUBTRANS_CONTROL: LwLockId = LwLockId(13);
    pub const MULTIXACT_GEN: LwLockId = LwLockId(14);
    pub const RELCACHE_INIT: LwLockId = LwLockId(15);
    pub const BGWRITER_COMM: LwLockId = LwLockId(16);
    pub const TWO_PHASE_STATE: LwLockId = LwLockId(17);
    pub const TABLESPACE_CREATE: LwLockId = LwLockId(18);
    pub const BTREE_VACUUM: LwLockId = LwLockId(19);

    pub fn val(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Number of reserved, well-known lock ids.
pub const NUM_FIXED_LWLOCKS: u32 = 20;

impl fmt::Display for LwLockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LwLockMode {
    Shared,
    Exclusive,
}

impl LwLockMode {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            LwLockMode::Shared => 1,
            LwLockMode::Exclusive => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(LwLockMode::Shared),
            2 => Some(LwLockMode::Exclusive),
            _ => None,
        }
    }
}
