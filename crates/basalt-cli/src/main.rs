mod stress;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use basalt_lwlock::{LwLockArray, LwLockConfig, LwLockPlan, ProcRegistry, LWLOCK_PADDED_SIZE};
use basalt_shmem::{ShmemAllocator, ShmemArena};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::stress::StressOptions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Shared buffers (two locks each)
    #[arg(long, default_value_t = 128)]
    shared_buffers: usize,

    /// SLRU buffers (one lock each)
    #[arg(long, default_value_t = 32)]
    slru_buffers: usize,

    /// Process registry capacity
    #[arg(long, default_value_t = 64)]
    max_procs: usize,

    /// Locks one process may hold at once
    #[arg(long, default_value_t = 100)]
    max_held: usize,
}

impl From<ConfigArgs> for LwLockConfig {
    fn from(args: ConfigArgs) -> Self {
        Self {
            shared_buffers: args.shared_buffers,
            slru_buffers: args.slru_buffers,
            max_procs: args.max_procs,
            max_held_lwlocks: args.max_held,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the lock count and shared memory needed for a configuration
    Size {
        #[command(flatten)]
        config: ConfigArgs,

        /// Extra locks requested by add-in modules
        #[arg(long, default_value_t = 0)]
        addins: usize,
    },
    /// Hammer a lock array from several threads and check exclusion
    Stress {
        /// Worker threads, one process each
        #[arg(long, default_value_t = 8)]
        threads: usize,

        /// Acquire/release rounds per thread
        #[arg(long, default_value_t = 10_000)]
        iterations: usize,

        /// Number of lock slots
        #[arg(long, default_value_t = 16)]
        locks: usize,

        /// Share of acquires taken in shared mode
        #[arg(long, default_value_t = 70, value_parser = clap::value_parser!(u8).range(0..=100))]
        shared_percent: u8,

        /// Arena size in bytes; defaults to exactly what the array needs
        #[arg(long)]
        arena_bytes: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Size { config, addins } => {
            let mut plan = LwLockPlan::new(config.into());
            plan.request_additional(addins)?;
            let bytes = plan.shmem_size()?;

            let config = plan.config();
            println!("LWLocks:          {}", plan.num_locks());
            println!("Slot size:        {} bytes", LWLOCK_PADDED_SIZE);
            println!("Shared memory:    {} bytes", bytes);
            println!("Process records:  {}", config.max_procs);
            println!("Held per process: {}", config.max_held_lwlocks);

            // Prove the budget: boot the array in an arena of exactly that size.
            let arena: Arc<dyn ShmemAllocator> =
                Arc::new(ShmemArena::new(bytes).context("creating shared memory arena")?);
            let locks = plan.create(arena).context("creating LWLock array")?;
            info!(
                "Array fits: {} locks, {} process records",
                locks.num_locks(),
                locks.procs().capacity()
            );
        }
        Commands::Stress {
            threads,
            iterations,
            locks,
            shared_percent,
            arena_bytes,
        } => {
            if threads == 0 {
                bail!("--threads must be at least 1");
            }
            let needed = LwLockArray::shmem_size(locks)?;
            let arena_bytes = arena_bytes.unwrap_or(needed);
            info!(
                "Booting {} locks in a {} byte arena ({} needed)",
                locks, arena_bytes, needed
            );

            let arena: Arc<dyn ShmemAllocator> =
                Arc::new(ShmemArena::new(arena_bytes).context("creating shared memory arena")?);
            let procs = Arc::new(ProcRegistry::new(threads));
            let array = Arc::new(
                LwLockArray::create(locks, arena, procs).context("creating LWLock array")?,
            );

            let report = stress::run(
                array,
                StressOptions {
                    threads,
                    iterations,
                    shared_percent,
                },
            )?;

            println!("Threads:             {}", threads);
            println!("Exclusive grants:    {}", report.exclusive);
            println!("Shared grants:       {}", report.shared);
            println!("Elapsed:             {:.2?}", report.elapsed);
            println!("Violations:          {}", report.violations);

            if report.violations > 0 {
                bail!("{} lock invariant violations", report.violations);
            }
            println!("Stress run completed.");
        }
    }

    Ok(())
}
