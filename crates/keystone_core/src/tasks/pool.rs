//! # Worker Pool
//!
//! Fixed-size pool of worker threads. Work enters through a global injector
//! channel; every worker also owns a local queue it pushes follow-up work to.
//! Idle workers steal from the other local queues.
//!
//! Threads that are not pool workers (the frame thread joining a barrier)
//! borrow an external context and run work like a worker while they wait.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::memory::ScratchArena;

/// A unit of work run on a pool thread.
pub type Job = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

struct PoolShared {
    injector: Sender<Job>,
    receiver: Receiver<Job>,
    /// One queue per worker plus one shared by external threads (last slot).
    locals: Vec<Mutex<VecDeque<Job>>>,
    running: AtomicBool,
    idle_poll: Duration,
    scratch_bytes: usize,
}

impl PoolShared {
    fn external_slot(&self) -> usize {
        self.locals.len() - 1
    }

    fn find_work(&self, index: usize) -> Option<Job> {
        if let Some(job) = self.locals[index].lock().pop_back() {
            return Some(job);
        }
        if let Ok(job) = self.receiver.try_recv() {
            return Some(job);
        }
        let count = self.locals.len();
        (1..count).find_map(|offset| self.locals[(index + offset) % count].lock().pop_front())
    }
}

/// Per-thread execution context handed to every job.
pub struct WorkerContext {
    shared: Arc<PoolShared>,
    index: usize,
    depth: Cell<u32>,
    scratch: ScratchArena,
}

impl WorkerContext {
    fn new(shared: Arc<PoolShared>, index: usize) -> Self {
        let scratch = ScratchArena::new(shared.scratch_bytes);
        Self {
            shared,
            index,
            depth: Cell::new(0),
            scratch,
        }
    }

    /// Index of the local queue this context pushes to.
    #[inline]
    #[must_use]
    pub fn worker_index(&self) -> usize {
        self.index
    }

    /// `true` for contexts borrowed by threads outside the pool.
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.index == self.shared.external_slot()
    }

    /// This thread's scratch budget.
    #[inline]
    #[must_use]
    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    /// How long an idle thread blocks before polling again.
    #[inline]
    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        self.shared.idle_poll
    }

    /// Pushes a job onto this thread's local queue.
    pub fn push_local(&self, job: Job) {
        self.shared.locals[self.index].lock().push_back(job);
    }

    /// Pushes a job onto the global queue.
    pub fn add_work(&self, job: Job) {
        if self.shared.injector.send(job).is_err() {
            tracing::error!("global work queue disconnected, job dropped");
        }
    }

    /// Finds and runs one job.
    ///
    /// # Returns
    ///
    /// `false` if no work was available anywhere.
    pub fn run_one(&self) -> bool {
        match self.shared.find_work(self.index) {
            Some(job) => {
                self.run(job);
                true
            }
            None => false,
        }
    }

    /// Blocks on the global queue for at most one idle poll interval.
    fn wait_for_work(&self) {
        if let Ok(job) = self.shared.receiver.recv_timeout(self.shared.idle_poll) {
            self.run(job);
        }
    }

    fn run(&self, job: Job) {
        self.depth.set(self.depth.get() + 1);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| job(self))) {
            tracing::error!(
                worker = self.index,
                panic = %panic_message(panic.as_ref()),
                "job panicked"
            );
        }
        self.depth.set(self.depth.get() - 1);
        if self.depth.get() == 0 {
            self.scratch.reset();
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fixed-size pool of worker threads.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl ThreadPool {
    /// Spawns `worker_count` workers with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ThreadSpawn`] if a thread cannot be created.
    pub fn new(worker_count: usize) -> CoreResult<Self> {
        Self::from_config(&CoreConfig {
            worker_threads: worker_count.max(1),
            ..CoreConfig::default()
        })
    }

    /// Spawns a pool as described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ThreadSpawn`] if a thread cannot be created.
    pub fn from_config(config: &CoreConfig) -> CoreResult<Self> {
        let worker_count = config.resolved_worker_threads();
        let (injector, receiver) = unbounded();
        let shared = Arc::new(PoolShared {
            injector,
            receiver,
            locals: (0..=worker_count).map(|_| Mutex::new(VecDeque::new())).collect(),
            running: AtomicBool::new(true),
            idle_poll: config.idle_poll(),
            scratch_bytes: config.scratch_bytes,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(worker_count),
        };
        for index in 0..worker_count {
            let shared = Arc::clone(&pool.shared);
            let handle = std::thread::Builder::new()
                .name(format!("keystone-worker-{index}"))
                .spawn(move || worker_main(WorkerContext::new(shared, index)))
                .map_err(|e| CoreError::ThreadSpawn(e.to_string()))?;
            pool.workers.push(handle);
        }
        tracing::info!(workers = worker_count, "thread pool started");
        Ok(pool)
    }

    /// Number of background workers.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Pushes a job onto the global queue.
    pub fn add_work(&self, job: Job) {
        if self.shared.injector.send(job).is_err() {
            tracing::error!("global work queue disconnected, job dropped");
        }
    }

    /// Convenience wrapper around [`ThreadPool::add_work`].
    pub fn spawn(&self, f: impl FnOnce(&WorkerContext) + Send + 'static) {
        self.add_work(Box::new(f));
    }

    /// Context for a thread outside the pool that wants to run work.
    #[must_use]
    pub fn external_context(&self) -> WorkerContext {
        WorkerContext::new(Arc::clone(&self.shared), self.shared.external_slot())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread exited abnormally");
            }
        }
        tracing::debug!("thread pool stopped");
    }
}

fn worker_main(ctx: WorkerContext) {
    tracing::trace!(worker = ctx.index, "worker started");
    while ctx.shared.running.load(Ordering::Acquire) {
        if !ctx.run_one() {
            ctx.wait_for_work();
        }
    }
}
