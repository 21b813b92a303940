//! Producing batches on a pool of threads.
//!
//! [`Dataset::generator_chan`] queues `ceil(remaining / batch_size)` produce
//! tasks on a pool of `num_workers` producers. Every producer pulls rows
//! through the dataset's shared cursor, so each row of the partition lands
//! in exactly one batch, but batches arrive in no particular order.
//!
//! The batch channel holds at most `prefetch` finished batches. A producer
//! facing a full channel waits in slices of `worker_timeout`, checking for
//! cancellation between slices. Dropping the [`BatchStream`] cancels the
//! producers and joins them.

use anyhow::{bail, ensure, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::batch::{Batch, Generated};
use crate::dataset::Dataset;
use crate::source::RowSource;
use crate::workers::thread::current_worker_id;
use crate::workers::WorkerPool;

/// Shared flag telling producers to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Batches from a running set of producers.
///
/// Iteration ends once every producer has finished and the channel is
/// drained.
pub struct BatchStream {
    // Declared before the pool so the receiver is dropped first.
    batches: Receiver<Batch>,
    cancel: CancelToken,
    _producers: Option<WorkerPool<usize>>,
}

impl BatchStream {
    /// A token that stops the producers when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits at most `timeout` for the next batch.
    ///
    /// Returns `Ok(None)` when the stream is exhausted and an error when no
    /// batch arrived in time.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<Batch>> {
        match self.batches.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => {
                bail!("No batch produced within {:?}", timeout)
            }
        }
    }
}

impl Iterator for BatchStream {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        self.batches.recv().ok()
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<S: RowSource> Dataset<S> {
    /// Starts producers over the current partition.
    ///
    /// Producers share this dataset's cursor: call [`reset`](Self::reset) or
    /// [`set_mode`](Self::set_mode) before starting another pass. Batches
    /// that fail to build are logged and dropped. The short final batch is
    /// dropped unless `drop_last` is off.
    pub fn generator_chan(&self, batch_size: usize, prefetch: usize) -> Result<BatchStream> {
        ensure!(batch_size > 0, "Batch size must be greater than 0");

        let generator = self.generator();
        let tasks = generator.remaining().div_ceil(batch_size);
        let (batch_tx, batch_rx) = bounded(prefetch);
        let cancel = CancelToken::new();

        if tasks == 0 {
            return Ok(BatchStream {
                batches: batch_rx,
                cancel,
                _producers: None,
            });
        }

        let config = self.config();
        let num_workers = config.num_workers.min(tasks);
        let drop_last = config.drop_last;
        let poll_interval = config.worker_timeout;
        let worker_cancel = cancel.clone();

        let mut pool = WorkerPool::new(
            "batch-producer",
            num_workers,
            tasks,
            move |task_rx: Receiver<usize>, shutdown: Arc<AtomicBool>| {
                let stopped = || worker_cancel.is_cancelled() || shutdown.load(Ordering::Relaxed);
                for task in task_rx.iter() {
                    if stopped() {
                        break;
                    }
                    let batch = match generator.generate(batch_size) {
                        Ok(Generated::Batch(batch)) => batch,
                        Ok(Generated::End(Some(batch))) if !drop_last => batch,
                        Ok(Generated::End(partial)) => {
                            if let Some(partial) = partial {
                                debug!(rows = partial.batch_size(), "Dropping leftover rows");
                            }
                            continue;
                        }
                        Err(e) => {
                            error!(
                                task,
                                worker = ?current_worker_id(),
                                error = ?e,
                                "Failed to generate batch"
                            );
                            continue;
                        }
                    };
                    if !publish(&batch_tx, batch, poll_interval, &stopped) {
                        break;
                    }
                }
            },
        )?;

        for task in 0..tasks {
            pool.submit(task)?;
        }
        pool.close();

        debug!(
            mode = %self.mode(),
            tasks,
            num_workers,
            batch_size,
            prefetch,
            "Started batch producers"
        );

        Ok(BatchStream {
            batches: batch_rx,
            cancel,
            _producers: Some(pool),
        })
    }
}

/// Sends `batch`, waiting while the channel is full. Returns `false` when
/// the producer should stop.
fn publish(
    batch_tx: &Sender<Batch>,
    mut batch: Batch,
    poll_interval: Duration,
    stopped: &impl Fn() -> bool,
) -> bool {
    loop {
        match batch_tx.send_timeout(batch, poll_interval) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if stopped() {
                    return false;
                }
                batch = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
