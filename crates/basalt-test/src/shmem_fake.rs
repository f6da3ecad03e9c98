use std::alloc::{self, Layout};
use std::ptr::NonNull;

use basalt_shmem::{ShmemAllocator, ShmemError, CACHE_LINE_SIZE};
use log::trace;
use parking_lot::Mutex;

/// Heap-backed stand-in for the shared memory arena.
///
/// Every request gets its own block, with no capacity limit. The fake keeps
/// the exact number of bytes requested and the most recent block so tests
/// can check a structure's memory budget and look at its raw layout.
#[derive(Default)]
pub struct FakeShmem {
    blocks: Mutex<Vec<(NonNull<u8>, Layout)>>,
    requested: Mutex<usize>,
}

// SAFETY: blocks are only freed on drop; their contents are synchronized by
// whoever allocated them.
unsafe impl Send for FakeShmem {}
unsafe impl Sync for FakeShmem {}

impl FakeShmem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes requested since creation, without alignment padding.
    pub fn total_requested(&self) -> usize {
        *self.requested.lock()
    }

    /// The most recently allocated block.
    pub fn last_allocation(&self) -> Option<NonNull<u8>> {
        self.blocks.lock().last().map(|(ptr, _)| *ptr)
    }

    pub fn allocations(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl ShmemAllocator for FakeShmem {
    fn alloc(&self, size: usize) -> Result<NonNull<u8>, ShmemError> {
        let layout = Layout::from_size_align(size.max(1), CACHE_LINE_SIZE).map_err(|_| {
            ShmemError::Layout {
                size,
                align: CACHE_LINE_SIZE,
            }
        })?;
        // SAFETY: layout has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(
            ShmemError::OutOfMemory {
                requested: size,
                available: 0,
            },
        )?;

        self.blocks.lock().push((ptr, layout));
        *self.requested.lock() += size;
        trace!("fake shmem: {} bytes at {:p}", size, ptr);
        Ok(ptr)
    }

    fn total_allocated(&self) -> usize {
        self.total_requested()
    }
}

impl Drop for FakeShmem {
    fn drop(&mut self) {
        for (ptr, layout) in self.blocks.get_mut().drain(..) {
            // SAFETY: allocated in `alloc` with this layout.
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}
