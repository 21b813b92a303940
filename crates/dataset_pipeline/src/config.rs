//! src/config.rs
//!
//! Configuration for dataset construction and batch generation.
//!
//! Example:
//! ```ignore
//! let config = DatasetConfig::builder()
//!     .cache_dir("cache/reviews")
//!     .partitions(0.8, 0.1, 0.1)
//!     .num_workers(4)
//!     .drop_last(false)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: more producers help when rows are expensive to read
//!   (seeks into a large file, image decoding in a processor)
//! - `fit_workers`: fitting is usually cheap per row, so a wide pool mostly
//!   hides processor lock contention
//! - `concurrent_file_limit`: bounds open file handles for delimited
//!   sources; producers wait for a free handle when all are in use

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How per-batch loss weights are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// One weight per row, looked up from the class weights.
    #[default]
    PerSample,
    /// A positive and a negative scalar for binary tasks.
    Binary,
    /// No weights.
    None,
}

/// Configuration shared by every source type.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Where the index cache and fitted processor state live. Without one,
    /// every construction performs a cold scan and fits from scratch.
    pub cache_dir: Option<PathBuf>,
    pub train_percent: f64,
    pub val_percent: f64,
    pub test_percent: f64,
    /// Skip unparseable rows instead of failing.
    pub ignore_parse_errors: bool,
    /// Upper bound on rows fed to processors while fitting. Default: 1,000,000
    pub max_rows_for_fit: usize,
    /// Width of the fitting pool. Default: 64
    pub fit_workers: usize,
    /// Number of batch producers. Default: CPU count
    pub num_workers: usize,
    /// Whether the short final batch of a partition is dropped. Default: true
    pub drop_last: bool,
    /// How often a producer blocked on a full channel checks for
    /// cancellation. Not an error timeout. Default: 100ms
    pub worker_timeout: Duration,
    /// Explicit class weights. When non-empty they replace computed ones.
    pub class_weights: BTreeMap<i64, f32>,
    pub weighting: Weighting,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            train_percent: 1.0,
            val_percent: 0.0,
            test_percent: 0.0,
            ignore_parse_errors: false,
            max_rows_for_fit: 1_000_000,
            fit_workers: 64,
            num_workers: num_cpus::get(),
            drop_last: true,
            worker_timeout: Duration::from_millis(100),
            class_weights: BTreeMap::new(),
            weighting: Weighting::default(),
        }
    }
}

impl DatasetConfig {
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }
}

/// Builder for DatasetConfig with method chaining
#[derive(Default)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    /// Set the train / validation / test fractions of the index.
    pub fn partitions(mut self, train: f64, val: f64, test: f64) -> Self {
        self.config.train_percent = train;
        self.config.val_percent = val;
        self.config.test_percent = test;
        self
    }

    pub fn ignore_parse_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_parse_errors = ignore;
        self
    }

    pub fn max_rows_for_fit(mut self, rows: usize) -> Self {
        self.config.max_rows_for_fit = rows;
        self
    }

    pub fn fit_workers(mut self, workers: usize) -> Self {
        self.config.fit_workers = workers;
        self
    }

    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    /// Set the cancellation polling interval
    ///
    /// - Too low: more responsive shutdown, higher CPU usage.
    /// - Too high: less CPU overhead, slower shutdown response
    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    pub fn class_weights(mut self, weights: BTreeMap<i64, f32>) -> Self {
        self.config.class_weights = weights;
        self
    }

    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.config.weighting = weighting;
        self
    }

    pub fn build(self) -> DatasetConfig {
        self.config
    }
}

/// Predicate deciding whether a parsed row enters the index.
pub type RowFilter = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Settings for a single delimited text file.
#[derive(Clone)]
pub struct DelimitedFileConfig {
    pub path: PathBuf,
    /// Field holding the label.
    pub category_offset: usize,
    pub delimiter: u8,
    /// Leave the first line out of the index.
    pub skip_headers: bool,
    pub row_filter: Option<RowFilter>,
    /// Maximum number of open handles on the file. Default: 1
    pub concurrent_file_limit: usize,
}

impl DelimitedFileConfig {
    pub fn new(path: impl Into<PathBuf>, category_offset: usize) -> Self {
        Self {
            path: path.into(),
            category_offset,
            delimiter: b',',
            skip_headers: false,
            row_filter: None,
            concurrent_file_limit: 1,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn skip_headers(mut self, skip: bool) -> Self {
        self.skip_headers = skip;
        self
    }

    pub fn row_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.row_filter = Some(Arc::new(filter));
        self
    }

    pub fn concurrent_file_limit(mut self, limit: usize) -> Self {
        self.concurrent_file_limit = limit;
        self
    }
}

impl fmt::Debug for DelimitedFileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelimitedFileConfig")
            .field("path", &self.path)
            .field("category_offset", &self.category_offset)
            .field("delimiter", &(self.delimiter as char))
            .field("skip_headers", &self.skip_headers)
            .field("row_filter", &self.row_filter.is_some())
            .field("concurrent_file_limit", &self.concurrent_file_limit)
            .finish()
    }
}

/// Settings for a directory with one subfolder per category.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub parent_dir: PathBuf,
    /// Allowed file extensions, case-insensitive. Empty accepts every file.
    pub extensions: Vec<String>,
}

impl DirectoryConfig {
    pub fn new(parent_dir: impl Into<PathBuf>) -> Self {
        Self {
            parent_dir: parent_dir.into(),
            extensions: Vec::new(),
        }
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }
}
