#![allow(dead_code)]

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use basalt_lwlock::{LwLockError, LwLockId, LwLockMode, ProcHandle};
use basalt_test::TestEngine;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn engine(num_locks: usize, max_procs: usize) -> Arc<TestEngine> {
    init_logging();
    Arc::new(TestEngine::new(num_locks, max_procs).unwrap())
}

/// A backend on its own thread that takes one lock, reports, and holds it
/// until told to release.
pub struct Worker {
    pub proc: ProcHandle,
    id: LwLockId,
    result: Receiver<Result<(), LwLockError>>,
    release: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(engine: &Arc<TestEngine>, id: LwLockId, mode: LwLockMode) -> Self {
        Self::spawn_prepared(engine, id, mode, |_, _| {})
    }

    /// Like `spawn`, but runs `setup` on the worker thread after it has a
    /// process identity and before it requests the lock.
    pub fn spawn_prepared<F>(
        engine: &Arc<TestEngine>,
        id: LwLockId,
        mode: LwLockMode,
        setup: F,
    ) -> Self
    where
        F: FnOnce(&TestEngine, ProcHandle) + Send + 'static,
    {
        let (proc_tx, proc_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let engine = Arc::clone(engine);

        let join = thread::spawn(move || {
            let mut me = engine.backend().unwrap();
            let proc = me.proc().unwrap();
            setup(&engine, proc);
            proc_tx.send(proc).unwrap();
            let result = me.acquire(id, mode);
            let granted = result.is_ok();
            if granted {
                assert!(me.held_by_me(id));
                assert_eq!(me.held_exclusive_by_me(id), mode == LwLockMode::Exclusive);
            }
            result_tx.send(result).unwrap();
            if granted {
                let _ = release_rx.recv();
                me.release(id).unwrap();
            }
        });

        let proc = proc_rx.recv_timeout(TIMEOUT).unwrap();
        Self {
            proc,
            id,
            result: result_rx,
            release: release_tx,
            join: Some(join),
        }
    }

    /// Spawn and wait until the worker sits at position `queued - 1` in the
    /// queue of `id`.
    pub fn spawn_queued(
        engine: &Arc<TestEngine>,
        id: LwLockId,
        mode: LwLockMode,
        queued: usize,
    ) -> Self {
        let worker = Self::spawn(engine, id, mode);
        engine.wait_for_waiters(id, queued).unwrap();
        assert_eq!(engine.waiters(id).unwrap()[queued - 1], (worker.proc, mode));
        worker
    }

    pub fn wait_result(&self) -> Result<(), LwLockError> {
        self.result.recv_timeout(TIMEOUT).unwrap()
    }

    /// Assert that the acquire is still blocked after a short grace period.
    pub fn assert_blocked(&self) {
        match self.result.recv_timeout(Duration::from_millis(50)) {
            Err(RecvTimeoutError::Timeout) => {}
            other => panic!(
                "{} expected to be blocked on lock {}, got {:?}",
                self.proc, self.id, other
            ),
        }
    }

    pub fn finish(mut self) {
        let _ = self.release.send(());
        if let Some(join) = self.join.take() {
            join.join().unwrap();
        }
    }
}
