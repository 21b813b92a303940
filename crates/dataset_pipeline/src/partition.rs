//! Train / validation / test partitioning.
//!
//! Percentages are applied to the total row count with a ceiling, and the
//! three partitions are laid out back to back over the index:
//!
//! ```text
//!  0            train           train+val              train+val+test
//!  |---- train ----|---- val ----|---- test ----|
//! ```
//!
//! The layout is positional. Shuffling the index changes which rows land in
//! each window, never the window boundaries themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which partition the generator reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeneratorMode {
    Train,
    Val,
    Test,
}

impl fmt::Display for GeneratorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeneratorMode::Train => "train",
            GeneratorMode::Val => "val",
            GeneratorMode::Test => "test",
        };
        f.write_str(name)
    }
}

/// Absolute row counts for each partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

/// A contiguous `[offset, offset + limit)` window over the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Window {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// One past the last position in the window.
    pub fn end(&self) -> usize {
        self.offset + self.limit
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.offset && position < self.end()
    }
}

/// Converts partition percentages into counts and per-mode windows.
///
/// Percentages are not validated against each other. If they sum to more
/// than one the test window runs past the end of the index and simply
/// yields fewer rows than `limit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partitioner {
    train_percent: f64,
    val_percent: f64,
    test_percent: f64,
    counts: PartitionCounts,
}

impl Partitioner {
    pub fn new(train_percent: f64, val_percent: f64, test_percent: f64) -> Self {
        Self {
            train_percent,
            val_percent,
            test_percent,
            counts: PartitionCounts::default(),
        }
    }

    /// Computes `ceil(percent * total_rows)` for every partition.
    pub fn configure(&mut self, total_rows: usize) -> PartitionCounts {
        self.counts = PartitionCounts {
            train: ceil_share(self.train_percent, total_rows),
            val: ceil_share(self.val_percent, total_rows),
            test: ceil_share(self.test_percent, total_rows),
        };
        self.counts
    }

    pub fn counts(&self) -> PartitionCounts {
        self.counts
    }

    pub fn window(&self, mode: GeneratorMode) -> Window {
        let PartitionCounts { train, val, test } = self.counts;
        match mode {
            GeneratorMode::Train => Window::new(0, train),
            GeneratorMode::Val => Window::new(train, val),
            GeneratorMode::Test => Window::new(train + val, test),
        }
    }
}

// Products within this distance of an integer are treated as that integer so
// that representation noise (0.1 * 30 = 3.0000000000000004) is not rounded up.
const CEIL_TOLERANCE: f64 = 1e-9;

fn ceil_share(percent: f64, total_rows: usize) -> usize {
    let share = (percent * total_rows as f64 - CEIL_TOLERANCE).ceil();
    if share <= 0.0 {
        0
    } else {
        share as usize
    }
}
