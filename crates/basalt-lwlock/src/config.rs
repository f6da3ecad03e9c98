use crate::types::NUM_FIXED_LWLOCKS;

/// Locks reserved for user-defined modules that do not register add-ins.
pub const NUM_USER_DEFINED_LWLOCKS: usize = 4;

/// Default cap on locks one process may hold at once.
pub const MAX_SIMUL_LWLOCKS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LwLockConfig {
    /// Shared buffers; each needs a content lock and an I/O lock.
    pub shared_buffers: usize,
    /// SLRU buffers; each needs one lock.
    pub slru_buffers: usize,
    /// Capacity of the process registry.
    pub max_procs: usize,
    /// Per-process held-lock capacity.
    pub max_held_lwlocks: usize,
}

impl Default for LwLockConfig {
    fn default() -> Self {
        Self {
            shared_buffers: 128,
            slru_buffers: 32,
            max_procs: 64,
            max_held_lwlocks: MAX_SIMUL_LWLOCKS,
        }
    }
}

impl LwLockConfig {
    /// Total lock slots the engine needs, including `addins` requested by
    /// optional subsystems.
    pub fn num_lwlocks(&self, addins: usize) -> usize {
        NUM_FIXED_LWLOCKS as usize
            + 2 * self.shared_buffers
            + self.slru_buffers
            + NUM_USER_DEFINED_LWLOCKS
            + addins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lock_count() {
        let config = LwLockConfig::default();
        assert_eq!(config.num_lwlocks(0), 20 + 256 + 32 + 4);
        assert_eq!(config.max_held_lwlocks, 100);
    }

    #[test]
    fn addins_extend_the_count() {
        let config = LwLockConfig {
            shared_buffers: 0,
            slru_buffers: 0,
            ..LwLockConfig::default()
        };
        assert_eq!(config.num_lwlocks(0), 24);
        assert_eq!(config.num_lwlocks(6), 30);
    }
}
