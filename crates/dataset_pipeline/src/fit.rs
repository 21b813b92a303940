//! Fitting column processors over a shuffled sample of rows.
//!
//! Processors that declare `requires_fit` are first offered their persisted
//! state from the cache directory. The rest are fitted in one pass:
//!
//! 1. shuffle the index with a time-derived seed so that a capped pass still
//!    sees a representative sample
//! 2. read up to `max_rows_for_fit` rows, handing each (processor, value)
//!    pair to a pool of `fit_workers` threads
//! 3. stop reading as soon as any fit fails, drain the pool and report the
//!    first failure
//! 4. finish and save every fitted processor, then restore source order

use anyhow::{Context, Error, Result};
use crossbeam_channel::Receiver;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::partition::Window;
use crate::processor::{ColumnProcessor, ColumnValue};
use crate::source::RowSource;
use crate::workers::WorkerPool;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps the first error reported by any thread.
#[derive(Debug, Default)]
pub(crate) struct FirstError {
    set: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl FirstError {
    /// Stores `error` unless an earlier one is already held.
    pub(crate) fn record(&self, error: Error) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
            self.set.store(true, Ordering::Release);
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

struct FitTask {
    processor: Arc<dyn ColumnProcessor>,
    value: ColumnValue,
}

/// Fits every processor that could not be loaded from the cache directory.
pub(crate) fn fit_processors<S: RowSource>(dataset: &mut Dataset<S>) -> Result<()> {
    let config = dataset.config().clone();
    let pending = pending_processors(dataset.processors(), config.cache_dir.as_deref());
    if pending.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = pending.iter().map(|p| p.name()).collect();
    info!(processors = ?names, "Fitting column processors");
    let started = Instant::now();

    dataset.shuffle(time_seed());
    let generator = dataset.generator_over(Window::new(0, dataset.total_rows()));

    let errors = Arc::new(FirstError::default());
    let worker_errors = errors.clone();
    let pool = WorkerPool::new(
        "fit-worker",
        config.fit_workers,
        config.fit_workers * 2,
        move |tasks: Receiver<FitTask>, _shutdown| {
            for task in tasks.iter() {
                if worker_errors.is_set() {
                    continue;
                }
                if let Err(e) = task.processor.fit_column(&task.value) {
                    worker_errors.record(e.context(format!(
                        "Failed to fit column processor '{}'",
                        task.processor.name()
                    )));
                }
            }
        },
    )?;

    let mut rows = 0usize;
    let mut last_progress = Instant::now();
    while rows < config.max_rows_for_fit && !errors.is_set() {
        let row = match generator.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                errors.record(e);
                break;
            }
        };
        for processor in &pending {
            match processor.span().extract(&row.fields) {
                Some(value) => pool.submit(FitTask {
                    processor: processor.clone(),
                    value,
                })?,
                None => debug!(
                    processor = processor.name(),
                    fields = row.fields.len(),
                    "Row is too short for column processor, not fitting it"
                ),
            }
        }
        rows += 1;

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            debug!(rows, "Fitting column processors");
            last_progress = Instant::now();
        }
    }
    pool.join();

    if let Some(e) = errors.take() {
        return Err(e);
    }

    for processor in &pending {
        processor
            .finish_fit()
            .with_context(|| format!("Failed to finish fitting '{}'", processor.name()))?;
        if let Some(dir) = &config.cache_dir {
            processor
                .save(dir)
                .with_context(|| format!("Failed to save column processor '{}'", processor.name()))?;
        }
    }

    dataset.unshuffle()?;
    info!(rows, elapsed = ?started.elapsed(), "Fitted column processors");
    Ok(())
}

/// Processors that require fitting and have no usable persisted state.
fn pending_processors(
    processors: &[Arc<dyn ColumnProcessor>],
    cache_dir: Option<&Path>,
) -> Vec<Arc<dyn ColumnProcessor>> {
    processors
        .iter()
        .filter(|processor| processor.requires_fit())
        .filter(|processor| {
            let Some(dir) = cache_dir else {
                return true;
            };
            match processor.load(dir) {
                Ok(()) => {
                    info!(processor = processor.name(), "Loaded fitted column processor");
                    false
                }
                Err(e) => {
                    debug!(processor = processor.name(), error = %e, "Column processor needs fitting");
                    true
                }
            }
        })
        .cloned()
        .collect()
}

fn time_seed() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or_default()
}
