//! Fixed-width thread pool used for processor fitting and batch production.
//!
//! The pool owns the worker threads and the task queue. It does not own a
//! result channel: callers that produce output capture their own `Sender` in
//! the worker closure. The closure is shared by every worker through an
//! `Arc` and is released when the last worker exits, so any sender captured
//! inside it is dropped exactly when the pool drains. A consumer holding the
//! matching receiver therefore sees the channel close only after every
//! worker has finished.

use anyhow::{ensure, Context, Result};
use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::workers::thread::set_worker_id;

/// Thread pool pulling tasks from a single bounded queue.
///
/// - Task channel: caller -> workers (blocking `submit` applies backpressure)
/// - Shutdown flag: set on drop so that workers parked in their own
///   blocking calls can bail out
pub(crate) struct WorkerPool<Task> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    shutdown: Arc<AtomicBool>,
    name: &'static str,
}

impl<Task> WorkerPool<Task>
where
    Task: Send + 'static,
{
    /// Spawns `num_workers` threads named `<name>-<id>`.
    ///
    /// Each worker runs `worker_fn` once with the shared task receiver and
    /// the shutdown flag, and exits when the function returns.
    pub(crate) fn new<F>(
        name: &'static str,
        num_workers: usize,
        task_capacity: usize,
        worker_fn: F,
    ) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        ensure!(
            num_workers > 0,
            "Cannot create a {} pool with 0 workers",
            name
        );
        ensure!(
            task_capacity > 0,
            "Cannot create a {} pool with task capacity 0",
            name
        );

        let (task_tx, task_rx) = bounded(task_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let shutdown = shutdown.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || {
                    set_worker_id(worker_id);
                    worker_fn(task_rx, shutdown);
                })
                .with_context(|| format!("Failed to spawn {} worker {}", name, worker_id))?;

            workers.push(handle);
        }

        debug!(pool = name, num_workers, task_capacity, "Started worker pool");

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            shutdown,
            name,
        })
    }

    /// Queues a task, blocking while the queue is full.
    pub(crate) fn submit(&self, task: Task) -> Result<()> {
        let task_tx = self
            .task_tx
            .as_ref()
            .with_context(|| format!("The {} pool is closed", self.name))?;
        task_tx
            .send(task)
            .map_err(|SendError(_)| anyhow::anyhow!("All {} workers have exited", self.name))
    }

    /// Closes the task queue. Workers finish what is queued and exit.
    pub(crate) fn close(&mut self) {
        self.task_tx.take();
    }

    /// Closes the task queue and waits for every worker to finish.
    pub(crate) fn join(mut self) {
        self.close();
        self.join_workers();
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!(pool = self.name, "Worker thread panicked");
            }
        }
    }
}

impl<Task> Drop for WorkerPool<Task> {
    fn drop(&mut self) {
        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Drop the task sender to close the queue
        self.task_tx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
