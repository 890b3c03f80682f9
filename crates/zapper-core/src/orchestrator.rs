//! Bounded-concurrency task execution shared by every batch stage.
//!
//! A batch is expressed as "dispatch N independent tasks, at most K running at
//! once, then wait for all of them". The rayon pool sized to K is the slot
//! semaphore, the rayon scope is the completion barrier, and a single mutex
//! guards whatever accumulator the tasks populate. Progress advances once per
//! finished task, whatever the task's outcome.

use crate::error::Error;
use crate::progress::{ProgressReporter, Stage};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

pub struct TaskOrchestrator<'r> {
    pool: ThreadPool,
    stage: Stage,
    reporter: &'r dyn ProgressReporter,
    completed: AtomicUsize,
}

/// Handed to every task; the only route to the shared accumulator.
pub struct TaskContext<'a, A> {
    accumulator: &'a Mutex<A>,
}

impl<'a, A> TaskContext<'a, A> {
    /// Enter the critical section. Keep it short: no I/O while holding it.
    pub fn lock(&self) -> MutexGuard<'a, A> {
        self.accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases a slot when dropped.
struct TaskSlot<'o, 'r> {
    orchestrator: &'o TaskOrchestrator<'r>,
}

impl Drop for TaskSlot<'_, '_> {
    fn drop(&mut self) {
        self.orchestrator.completed.fetch_add(1, Ordering::Relaxed);
        self.orchestrator
            .reporter
            .on_task_complete(self.orchestrator.stage);
    }
}

impl<'r> TaskOrchestrator<'r> {
    pub fn new(
        max_concurrent: usize,
        stage: Stage,
        reporter: &'r dyn ProgressReporter,
    ) -> Result<Self, Error> {
        let max_concurrent = max_concurrent.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_concurrent)
            .thread_name(move |i| format!("zapper-{:?}-{}", stage, i))
            .build()
            .map_err(|e| Error::Other(format!("Could not build task pool: {}", e)))?;
        debug!("{} with {} concurrent tasks", stage, max_concurrent);

        Ok(Self {
            pool,
            stage,
            reporter,
            completed: AtomicUsize::new(0),
        })
    }

    /// Number of tasks finished over the lifetime of this orchestrator.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Run one task per item and block until every task has finished.
    ///
    /// The accumulator is moved in, shared behind the lock, and handed back
    /// once the barrier is passed. The first task error aborts the tasks that
    /// have not started yet and is returned after the barrier.
    pub fn run<T, A, F>(&self, tasks: Vec<T>, accumulator: A, task: F) -> Result<A, Error>
    where
        T: Send,
        A: Send,
        F: Fn(T, &TaskContext<'_, A>) -> Result<(), Error> + Sync,
    {
        let accumulator = Mutex::new(accumulator);
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        let aborted = AtomicBool::new(false);

        self.pool.scope(|scope| {
            for item in tasks {
                let task = &task;
                let accumulator = &accumulator;
                let failure = &failure;
                let aborted = &aborted;
                scope.spawn(move |_| {
                    let _slot = TaskSlot { orchestrator: self };
                    if aborted.load(Ordering::Acquire) {
                        return;
                    }
                    let ctx = TaskContext { accumulator };
                    if let Err(e) = task(item, &ctx) {
                        aborted.store(true, Ordering::Release);
                        let mut first = failure.lock().unwrap_or_else(PoisonError::into_inner);
                        if first.is_none() {
                            *first = Some(e);
                        }
                    }
                });
            }
        });

        if let Some(e) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(e);
        }
        Ok(accumulator
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner))
    }
}
