use std::sync::Arc;

use basalt_shmem::ShmemAllocator;
use log::debug;

use super::LwLockArray;
use crate::config::LwLockConfig;
use crate::error::StartupError;
use crate::proc::ProcRegistry;

/// Startup sizing for the lock array.
///
/// Optional subsystems register the extra locks they need before the array
/// exists; afterwards the count is frozen.
pub struct LwLockPlan {
    config: LwLockConfig,
    addins: usize,
    created: bool,
}

impl LwLockPlan {
    pub fn new(config: LwLockConfig) -> Self {
        Self {
            config,
            addins: 0,
            created: false,
        }
    }

    pub fn config(&self) -> &LwLockConfig {
        &self.config
    }

    pub fn request_additional(&mut self, n: usize) -> Result<(), StartupError> {
        if self.created {
            return Err(StartupError::RequestAfterCreate(n));
        }
        self.addins += n;
        Ok(())
    }

    pub fn num_locks(&self) -> usize {
        self.config.num_lwlocks(self.addins)
    }

    pub fn shmem_size(&self) -> Result<usize, StartupError> {
        Ok(LwLockArray::shmem_size(self.num_locks())?)
    }

    /// Build the array and a process registry of `config.max_procs`
    /// records for it.
    pub fn create(
        &mut self,
        shmem: Arc<dyn ShmemAllocator>,
    ) -> Result<Arc<LwLockArray>, StartupError> {
        if self.created {
            return Err(StartupError::AlreadyCreated);
        }
        debug!(
            "Creating {} LWLocks ({} add-in) for {} processes",
            self.num_locks(),
            self.addins,
            self.config.max_procs
        );
        let procs = Arc::new(ProcRegistry::new(self.config.max_procs));
        let locks = LwLockArray::create(self.num_locks(), shmem, procs)?
            .with_max_held(self.config.max_held_lwlocks);
        self.created = true;
        Ok(Arc::new(locks))
    }
}
