use basalt_shmem::ShmemError;
use thiserror::Error;

use crate::types::LwLockId;

/// Errors returned to the caller of a lock operation. None of them leaves
/// any lock state changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LwLockError {
    #[error("too many LWLocks taken")]
    TooManyHeld { max: usize },

    #[error("lock {0} is not held")]
    NotHeld(LwLockId),

    #[error("lock {id} is out of range ({num_locks} locks exist)")]
    OutOfRange { id: LwLockId, num_locks: usize },

    #[error("wait for lock {0} was interrupted")]
    Interrupted(LwLockId),

    #[error("no more LWLockIds available")]
    NoFreeIds,

    #[error("too many processes already (max {max})")]
    NoFreeProcs { max: usize },
}

/// Errors that prevent the engine from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("lock array shared memory: {0}")]
    Shmem(#[from] ShmemError),

    #[error("cannot request {0} additional LWLocks after the lock array was created")]
    RequestAfterCreate(usize),

    #[error("lock array already created")]
    AlreadyCreated,

    #[error("lock array must contain at least one lock")]
    NoLocks,
}

/// Programming errors. These never return to the caller; see
/// [`crate::fatal::abort`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fatal {
    #[error("waiting on lock {0} already held")]
    SelfDeadlock(LwLockId),

    #[error("cannot wait on lock {0} without a process identity")]
    NoProc(LwLockId),
}
