pub mod backend;
pub mod config;
pub mod error;
pub mod fatal;
pub mod lwlock;
pub mod proc;
pub mod sync;
pub mod types;

pub use backend::Backend;
pub use config::{LwLockConfig, MAX_SIMUL_LWLOCKS, NUM_USER_DEFINED_LWLOCKS};
pub use error::{Fatal, LwLockError, StartupError};
pub use lwlock::{
    HeldLwLock, HeldLwLocks, LwLockArray, LwLockPlan, LwLockSnapshot, LWLOCK_PADDED_SIZE,
};
pub use proc::semaphore::{Interrupted, ProcSemaphore, Semaphore};
pub use proc::{Proc, ProcRegistry};
pub use types::{LwLockId, LwLockMode, ProcHandle, NUM_FIXED_LWLOCKS};
