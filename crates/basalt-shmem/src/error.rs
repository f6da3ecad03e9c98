#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShmemError {
    #[error("out of shared memory (requested {requested} bytes, {available} available)")]
    OutOfMemory { requested: usize, available: usize },

    #[error("requested shared memory size overflows usize")]
    SizeOverflow,

    #[error("invalid shared memory layout: {size} bytes aligned to {align}")]
    Layout { size: usize, align: usize },
}
