pub mod arena;
pub mod error;
pub mod size;

pub use arena::*;
pub use error::*;
pub use size::*;

/// Cache line size used to pad structures that sit side by side in shared
/// memory. 128 bytes on targets whose prefetcher pulls adjacent line pairs.
#[cfg(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "powerpc64"
))]
pub const CACHE_LINE_SIZE: usize = 128;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "powerpc64"
)))]
pub const CACHE_LINE_SIZE: usize = 64;
