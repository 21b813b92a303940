//! Streaming datasets for model training.
//!
//! Rows come from a delimited text file, a folder-per-category directory
//! tree or in-memory arrays. Each source is indexed once (and the index
//! cached), partitioned into train / validation / test windows, optionally
//! shuffled, and turned into batches of tensors by a list of column
//! processors.

pub mod batch;
pub mod cache;
pub mod category;
pub mod config;
pub mod cursor;
pub mod dataset;
mod fit;
pub mod inference;
pub mod partition;
pub mod pipeline;
pub mod processor;
pub mod processors;
pub mod source;
pub mod sources;
pub mod workers;

pub use batch::{Batch, BatchWeights, Generated};
pub use category::{CategoryVocabulary, ClassStatistics, LabelStrategy};
pub use config::{DatasetConfig, DelimitedFileConfig, DirectoryConfig, Weighting};
pub use dataset::Dataset;
pub use inference::Inference;
pub use partition::{GeneratorMode, PartitionCounts};
pub use pipeline::{BatchStream, CancelToken};
pub use processor::{ColumnProcessor, ColumnSpan, ColumnValue};
pub use processors::{CategoricalColumn, FloatColumn};
pub use source::{RawLabel, RawRow, RawValue, RowFields, RowSource};
pub use sources::{DelimitedFileSource, DirectoryEntry, DirectorySource, ValuesSource};
