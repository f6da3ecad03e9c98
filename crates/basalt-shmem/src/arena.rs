use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::error::ShmemError;
use crate::size::{add_size, align_up};
use crate::CACHE_LINE_SIZE;

/// Source of startup shared memory.
///
/// Every returned block is zeroed, aligned to [`CACHE_LINE_SIZE`] and stays
/// valid for as long as the allocator itself is alive. There is no free.
pub trait ShmemAllocator: Send + Sync {
    fn alloc(&self, size: usize) -> Result<NonNull<u8>, ShmemError>;

    /// Bytes handed out so far.
    fn total_allocated(&self) -> usize;
}

/// Fixed-size region carved up by bump allocation.
pub struct ShmemArena {
    base: NonNull<u8>,
    layout: Layout,
    offset: AtomicUsize,
}

// SAFETY: the region is only reachable through the blocks handed out by
// `alloc`, and those never overlap. Callers synchronize access to the
// contents of their own blocks.
unsafe impl Send for ShmemArena {}
unsafe impl Sync for ShmemArena {}

impl ShmemArena {
    pub fn new(capacity: usize) -> Result<Self, ShmemError> {
        let capacity = align_up(capacity, CACHE_LINE_SIZE)?;
        let layout = Layout::from_size_align(capacity, CACHE_LINE_SIZE)
            .ok()
            .filter(|l| l.size() > 0)
            .ok_or(ShmemError::Layout {
                size: capacity,
                align: CACHE_LINE_SIZE,
            })?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(ShmemError::OutOfMemory {
            requested: capacity,
            available: 0,
        })?;

        debug!("Shared memory arena created: {} bytes", capacity);

        Ok(Self {
            base,
            layout,
            offset: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.offset()
    }
}

impl ShmemAllocator for ShmemArena {
    fn alloc(&self, size: usize) -> Result<NonNull<u8>, ShmemError> {
        let size = align_up(size, CACHE_LINE_SIZE)?;
        let capacity = self.capacity();

        // Offsets stay cache-line aligned, so every block starts on a line.
        let start = self
            .offset
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |off| {
                add_size(off, size).ok().filter(|&end| end <= capacity)
            })
            .map_err(|off| ShmemError::OutOfMemory {
                requested: size,
                available: capacity - off,
            })?;

        debug!(
            "Shared memory allocation: {} bytes at offset {:#x}",
            size, start
        );

        // SAFETY: start + size <= capacity, so the block is inside the region.
        Ok(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) })
    }

    fn total_allocated(&self) -> usize {
        self.offset()
    }
}

impl Drop for ShmemArena {
    fn drop(&mut self) {
        // SAFETY: base was allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}
