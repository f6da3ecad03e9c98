mod common;

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use basalt_lwlock::{LwLockId, LwLockMode};
use basalt_shmem::ShmemAllocator;
use basalt_test::check_slot;
use common::engine;
use rand::{rngs::StdRng, Rng, SeedableRng};

const THREADS: usize = 8;
const ITERATIONS: usize = 2_000;
const LOCKS: usize = 4;

/// What the holders of one slot observe from inside their critical section.
#[derive(Default)]
struct Occupancy {
    exclusive: AtomicU32,
    shared: AtomicU32,
    // Updated with a racy load + store, so only exclusion keeps it exact.
    counter: AtomicU64,
}

#[test]
fn concurrent_holders_respect_slot_invariants() {
    let engine = engine(LOCKS, THREADS);
    let occupancy: Arc<Vec<Occupancy>> =
        Arc::new((0..LOCKS).map(|_| Occupancy::default()).collect());
    let violations = Arc::new(AtomicUsize::new(0));
    let exclusive_grants = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let occupancy = Arc::clone(&occupancy);
            let violations = Arc::clone(&violations);
            let exclusive_grants = Arc::clone(&exclusive_grants);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                let mut me = engine.backend().unwrap();
                barrier.wait();

                for _ in 0..ITERATIONS {
                    let slot = rng.gen_range(0..LOCKS);
                    let id = LwLockId(slot as u32);
                    let occ = &occupancy[slot];

                    if rng.gen_bool(0.3) {
                        me.acquire(id, LwLockMode::Exclusive).unwrap();
                        if occ.exclusive.fetch_add(1, Ordering::SeqCst) != 0
                            || occ.shared.load(Ordering::SeqCst) != 0
                        {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        let v = occ.counter.load(Ordering::Relaxed);
                        thread::yield_now();
                        occ.counter.store(v + 1, Ordering::Relaxed);
                        exclusive_grants.fetch_add(1, Ordering::Relaxed);
                        occ.exclusive.fetch_sub(1, Ordering::SeqCst);
                    } else {
                        me.acquire(id, LwLockMode::Shared).unwrap();
                        occ.shared.fetch_add(1, Ordering::SeqCst);
                        if occ.exclusive.load(Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        occ.shared.fetch_sub(1, Ordering::SeqCst);
                    }
                    assert!(me.held_by_me(id));
                    me.release(id).unwrap();
                    assert!(me.held().is_empty());
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    let total: u64 = occupancy
        .iter()
        .map(|o| o.counter.load(Ordering::SeqCst))
        .sum();
    assert_eq!(total, exclusive_grants.load(Ordering::SeqCst));

    for i in 0..LOCKS {
        let snap = engine.snapshot(LwLockId(i as u32)).unwrap();
        check_slot(&snap).unwrap();
        assert!(snap.is_free());
        assert!(snap.waiters.is_empty());
    }
    assert_eq!(engine.locks.procs().active(), 0);
    assert_eq!(
        engine.shmem.total_allocated(),
        basalt_lwlock::LwLockArray::shmem_size(LOCKS).unwrap()
    );
}

#[test]
fn nested_holds_in_fixed_order_make_progress() {
    let engine = engine(LOCKS, THREADS);
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + t as u64);
                let mut me = engine.backend().unwrap();
                for _ in 0..ITERATIONS / 4 {
                    // Ascending ids, so no cycles between threads.
                    for i in 0..LOCKS {
                        if rng.gen_bool(0.5) {
                            let mode = if rng.gen_bool(0.5) {
                                LwLockMode::Shared
                            } else {
                                LwLockMode::Exclusive
                            };
                            me.acquire(LwLockId(i as u32), mode).unwrap();
                        }
                    }
                    me.release_all();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    for i in 0..LOCKS {
        assert!(engine.snapshot(LwLockId(i as u32)).unwrap().is_free());
    }
}
