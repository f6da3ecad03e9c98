mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use basalt_lwlock::{LwLockArray, LWLOCK_PADDED_SIZE, NUM_FIXED_LWLOCKS};
use basalt_shmem::ShmemAllocator;
use common::engine;

const LOCKS: usize = NUM_FIXED_LWLOCKS as usize + 2;

#[test]
fn header_and_slots_sit_where_expected_in_shared_memory() {
    let engine = engine(LOCKS, 1);
    assert_eq!(engine.shmem.allocations(), 1);
    let size = LwLockArray::shmem_size(LOCKS).unwrap();
    assert_eq!(size, LOCKS * LWLOCK_PADDED_SIZE + 8 + LWLOCK_PADDED_SIZE);
    assert_eq!(engine.shmem.total_allocated(), size);

    let base = engine.shmem.last_allocation().unwrap().as_ptr();
    let slots_end = LWLOCK_PADDED_SIZE + LOCKS * LWLOCK_PADDED_SIZE;
    assert_eq!(size - slots_end, 8);

    // SAFETY: every range below lies inside the `size` byte block, which
    // lives as long as the engine.
    let num_locks = unsafe { base.cast::<u32>().read() };
    let next_dynamic = unsafe { &*base.add(4).cast::<AtomicU32>() };
    let header_pad = unsafe { std::slice::from_raw_parts(base.add(8), LWLOCK_PADDED_SIZE - 8) };
    let tail = unsafe { std::slice::from_raw_parts(base.add(slots_end), size - slots_end) };

    assert_eq!(num_locks as usize, LOCKS);
    assert_eq!(next_dynamic.load(Ordering::SeqCst), NUM_FIXED_LWLOCKS);

    // The block is cache-line aligned, so the slots start one padded slot in
    // and the space around them is never written.
    assert!(header_pad.iter().all(|&b| b == 0));
    assert!(tail.iter().all(|&b| b == 0));

    // Dynamic ids are handed out through the shared counter.
    let first = engine.locks.assign().unwrap();
    assert_eq!(first.val(), NUM_FIXED_LWLOCKS);
    assert_eq!(next_dynamic.load(Ordering::SeqCst), NUM_FIXED_LWLOCKS + 1);
    engine.locks.assign().unwrap();
    assert_eq!(next_dynamic.load(Ordering::SeqCst), LOCKS as u32);
    assert!(engine.locks.assign().is_err());
    assert_eq!(next_dynamic.load(Ordering::SeqCst), LOCKS as u32);
}
