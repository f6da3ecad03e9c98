use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use basalt_lwlock::{Backend, LwLockArray, LwLockId, LwLockMode};
use log::{debug, error};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub struct StressOptions {
    pub threads: usize,
    pub iterations: usize,
    pub shared_percent: u8,
}

#[derive(Debug, Default)]
pub struct StressReport {
    pub exclusive: u64,
    pub shared: u64,
    pub violations: u64,
    pub elapsed: Duration,
}

/// Holders seen inside one lock's critical section.
#[derive(Default)]
struct Occupancy {
    exclusive: AtomicU32,
    shared: AtomicU32,
}

#[derive(Default)]
struct Tally {
    exclusive: AtomicU64,
    shared: AtomicU64,
    violations: AtomicU64,
}

pub fn run(locks: Arc<LwLockArray>, opts: StressOptions) -> Result<StressReport> {
    let occupancy: Arc<Vec<Occupancy>> =
        Arc::new((0..locks.num_locks()).map(|_| Occupancy::default()).collect());
    let tally = Arc::new(Tally::default());
    let barrier = Arc::new(Barrier::new(opts.threads));
    let start = Instant::now();

    // Register every process up front so a full registry fails before any
    // worker reaches the barrier.
    let backends = (0..opts.threads)
        .map(|_| Backend::new(Arc::clone(&locks)))
        .collect::<Result<Vec<_>, _>>()
        .context("registering stress processes")?;

    let handles: Vec<_> = backends
        .into_iter()
        .enumerate()
        .map(|(t, mut me)| {
            let occupancy = Arc::clone(&occupancy);
            let tally = Arc::clone(&tally);
            let barrier = Arc::clone(&barrier);
            let shared_ratio = f64::from(opts.shared_percent) / 100.0;
            let iterations = opts.iterations;

            thread::Builder::new()
                .name(format!("stress-{}", t))
                .spawn(move || -> Result<()> {
                    let mut rng = StdRng::seed_from_u64(t as u64);
                    barrier.wait();
                    debug!("stress worker {} running as {:?}", t, me.proc());

                    for _ in 0..iterations {
                        let slot = rng.gen_range(0..occupancy.len());
                        let id = LwLockId(slot as u32);
                        let mode = if rng.gen_bool(shared_ratio) {
                            LwLockMode::Shared
                        } else {
                            LwLockMode::Exclusive
                        };
                        me.acquire(id, mode)?;
                        if !occupy(&occupancy[slot], mode) {
                            error!(
                                "lock {} held {:?} alongside an incompatible holder",
                                id, mode
                            );
                            tally.violations.fetch_add(1, Ordering::Relaxed);
                        }
                        match mode {
                            LwLockMode::Shared => tally.shared.fetch_add(1, Ordering::Relaxed),
                            LwLockMode::Exclusive => {
                                tally.exclusive.fetch_add(1, Ordering::Relaxed)
                            }
                        };
                        me.release(id)?;
                    }
                    Ok(())
                })
                .context("spawning stress worker")
        })
        .collect::<Result<_>>()?;

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("stress worker panicked"))??;
    }

    Ok(StressReport {
        exclusive: tally.exclusive.load(Ordering::Relaxed),
        shared: tally.shared.load(Ordering::Relaxed),
        violations: tally.violations.load(Ordering::Relaxed),
        elapsed: start.elapsed(),
    })
}

/// Enter and leave the critical section, reporting whether the holders
/// seen there were compatible with `mode`.
fn occupy(occ: &Occupancy, mode: LwLockMode) -> bool {
    let ok = match mode {
        LwLockMode::Exclusive => {
            let others = occ.exclusive.fetch_add(1, Ordering::SeqCst);
            others == 0 && occ.shared.load(Ordering::SeqCst) == 0
        }
        LwLockMode::Shared => {
            occ.shared.fetch_add(1, Ordering::SeqCst);
            occ.exclusive.load(Ordering::SeqCst) == 0
        }
    };
    thread::yield_now();
    match mode {
        LwLockMode::Exclusive => occ.exclusive.fetch_sub(1, Ordering::SeqCst),
        LwLockMode::Shared => occ.shared.fetch_sub(1, Ordering::SeqCst),
    };
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_lwlock::ProcRegistry;
    use basalt_shmem::{ShmemAllocator, ShmemArena};

    fn array(locks: usize, procs: usize) -> Arc<LwLockArray> {
        let arena: Arc<dyn ShmemAllocator> =
            Arc::new(ShmemArena::new(LwLockArray::shmem_size(locks).unwrap()).unwrap());
        Arc::new(LwLockArray::create(locks, arena, Arc::new(ProcRegistry::new(procs))).unwrap())
    }

    #[test]
    fn short_run_has_no_violations() {
        let report = run(
            array(4, 4),
            StressOptions {
                threads: 4,
                iterations: 500,
                shared_percent: 50,
            },
        )
        .unwrap();
        assert_eq!(report.violations, 0);
        assert_eq!(report.exclusive + report.shared, 2_000);
    }

    #[test]
    fn all_shared_run_never_takes_exclusive() {
        let report = run(
            array(2, 2),
            StressOptions {
                threads: 2,
                iterations: 100,
                shared_percent: 100,
            },
        )
        .unwrap();
        assert_eq!(report.exclusive, 0);
        assert_eq!(report.shared, 200);
    }

    #[test]
    fn too_few_procs_fails_cleanly() {
        let err = run(
            array(2, 1),
            StressOptions {
                threads: 2,
                iterations: 10,
                shared_percent: 50,
            },
        );
        assert!(err.is_err());
    }
}
