//! The dataset engine.
//!
//! A [`Dataset`] wraps a [`RowSource`] with everything needed to feed a
//! training loop:
//! - an index of every usable row, built by a cold scan or loaded from the
//!   cache directory
//! - class statistics and loss weights derived from the labels
//! - train / validation / test windows over the index
//! - seeded shuffling of the index
//! - column processors, fitted on first use
//! - batch assembly, synchronously through [`Dataset::generate`] or on a
//!   pool of producers through [`Dataset::generator_chan`]
//!
//! # Example
//! ```ignore
//! let source = DelimitedFileSource::new(DelimitedFileConfig::new("reviews.csv", 0))?;
//! let processors: Vec<Arc<dyn ColumnProcessor>> = vec![
//!     Arc::new(CategoricalColumn::new("brand", ColumnSpan::single(1))),
//!     Arc::new(FloatColumn::new("scores", ColumnSpan::multi(2, 4))),
//! ];
//! let mut dataset = Dataset::new(source, config, processors)?;
//!
//! dataset.shuffle(42);
//! dataset.set_mode(GeneratorMode::Train);
//! for batch in dataset.generator_chan(32, 4)? {
//!     model.step(&batch);
//! }
//! ```

use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tch::{Kind, Tensor};
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchWeights, Generated};
use crate::cache::{IndexCache, CATEGORY_VOCABULARY_FILE_NAME};
use crate::category::{CategoryResolver, CategoryVocabulary, ClassStatistics, LabelStrategy};
use crate::config::{DatasetConfig, Weighting};
use crate::cursor::Cursor;
use crate::fit;
use crate::partition::{GeneratorMode, PartitionCounts, Partitioner, Window};
use crate::processor::{ColumnBuffer, ColumnProcessor, ColumnValue};
use crate::source::{RawLabel, RawRow, RawValue, RowSource};
use crate::workers::thread::current_worker_id;

/// State shared, read-only, between a dataset and its producers.
pub(crate) struct Shared<S: RowSource> {
    source: S,
    processors: Vec<Arc<dyn ColumnProcessor>>,
    labels: LabelStrategy,
    stats: ClassStatistics,
    config: DatasetConfig,
}

/// A resolved label.
#[derive(Debug, Clone, PartialEq)]
enum LabelValue {
    Class(i64),
    Target(f32),
    /// Left for the source's label processor.
    Raw(RawValue),
}

/// A streaming dataset over a [`RowSource`].
pub struct Dataset<S: RowSource> {
    shared: Arc<Shared<S>>,
    index: Arc<Vec<S::Entry>>,
    partitioner: Partitioner,
    mode: GeneratorMode,
    cursor: Arc<Cursor>,
    shuffled: bool,
}

impl<S: RowSource> Dataset<S> {
    /// Builds the row index, partitions it and fits any processors that
    /// could not be restored from the cache directory.
    ///
    /// The dataset starts in [`GeneratorMode::Train`], unshuffled.
    pub fn new(
        source: S,
        config: DatasetConfig,
        processors: Vec<Arc<dyn ColumnProcessor>>,
    ) -> Result<Self> {
        ensure!(config.num_workers > 0, "num_workers must be at least 1");
        ensure!(config.fit_workers > 0, "fit_workers must be at least 1");

        info!(source = %source.describe(), "Initialising dataset");

        if let Some(dir) = &config.cache_dir {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create cache directory {}", dir.display())
            })?;
        }

        let strategy = load_label_strategy(&source, &config)?;
        let (index, labels, stats) = build_index(&source, &config, strategy)?;

        let mut partitioner =
            Partitioner::new(config.train_percent, config.val_percent, config.test_percent);
        let counts = partitioner.configure(index.len());
        info!(
            rows = index.len(),
            train = counts.train,
            val = counts.val,
            test = counts.test,
            "Partitioned rows"
        );

        let cursor = Cursor::new(partitioner.window(GeneratorMode::Train), index.len());
        let mut dataset = Self {
            shared: Arc::new(Shared {
                source,
                processors,
                labels,
                stats,
                config,
            }),
            index: Arc::new(index),
            partitioner,
            mode: GeneratorMode::Train,
            cursor: Arc::new(cursor),
            shuffled: false,
        };

        fit::fit_processors(&mut dataset)?;
        Ok(dataset)
    }

    /// Selects the partition to read from and rewinds to its start.
    pub fn set_mode(&mut self, mode: GeneratorMode) {
        self.mode = mode;
        self.cursor = Arc::new(Cursor::new(
            self.partitioner.window(mode),
            self.index.len(),
        ));
        debug!(%mode, window = ?self.cursor.window(), "Selected partition");
    }

    /// Rewinds the current partition. Producers already running keep the
    /// cursor they started with.
    pub fn reset(&mut self) {
        self.cursor = Arc::new(Cursor::new(self.cursor.window(), self.index.len()));
    }

    /// Permutes the index with a generator seeded from `seed`.
    ///
    /// The same seed over the same index always gives the same order.
    pub fn shuffle(&mut self, seed: i64) {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        Arc::make_mut(&mut self.index).shuffle(&mut rng);
        self.shuffled = true;
        debug!(seed, "Shuffled row index");
    }

    /// Restores source order by rebuilding the index from the cache (or a
    /// fresh scan when there is none), then rewinds.
    pub fn unshuffle(&mut self) -> Result<()> {
        let (index, _, _) = build_index(
            &self.shared.source,
            &self.shared.config,
            self.shared.labels.clone(),
        )?;
        ensure!(
            index.len() == self.index.len(),
            "Row index changed from {} to {} rows while restoring source order",
            self.index.len(),
            index.len()
        );
        self.index = Arc::new(index);
        self.shuffled = false;
        self.reset();
        Ok(())
    }

    /// Claims and reads the next row of the current partition.
    pub fn next_row(&self) -> Result<Option<RawRow>> {
        self.generator().next_row()
    }

    /// Assembles up to `batch_size` rows from the current partition.
    pub fn generate(&self, batch_size: usize) -> Result<Generated> {
        self.generator().generate(batch_size)
    }

    /// Saves every processor's fitted state into `dir`.
    pub fn save_processors(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for processor in &self.shared.processors {
            processor.save(dir).with_context(|| {
                format!("Failed to save column processor '{}'", processor.name())
            })?;
        }
        info!(dir = %dir.display(), "Saved column processors");
        Ok(())
    }

    /// Rows in the current partition window that the index can supply.
    pub fn len(&self) -> usize {
        self.cursor.window_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in the whole index.
    pub fn total_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_categorical_classes(&self) -> usize {
        self.shared.stats.num_classes()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.shared
            .processors
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn class_statistics(&self) -> &ClassStatistics {
        &self.shared.stats
    }

    /// The vocabulary used for category-name labels, if any.
    pub fn category_vocabulary(&self) -> Option<&Arc<CategoryVocabulary>> {
        self.shared.labels.vocabulary()
    }

    pub fn partition_counts(&self) -> PartitionCounts {
        self.partitioner.counts()
    }

    pub fn mode(&self) -> GeneratorMode {
        self.mode
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.shared.config
    }

    pub fn processors(&self) -> &[Arc<dyn ColumnProcessor>] {
        &self.shared.processors
    }

    /// A handle over the current partition and cursor.
    pub(crate) fn generator(&self) -> RowGenerator<S> {
        RowGenerator {
            shared: self.shared.clone(),
            index: self.index.clone(),
            cursor: self.cursor.clone(),
        }
    }

    /// A handle over an arbitrary window with its own cursor.
    pub(crate) fn generator_over(&self, window: Window) -> RowGenerator<S> {
        RowGenerator {
            shared: self.shared.clone(),
            index: self.index.clone(),
            cursor: Arc::new(Cursor::new(window, self.index.len())),
        }
    }
}

/// Reads rows and assembles batches for one cursor. Cheap to clone; clones
/// share the cursor, so together they read every row exactly once.
pub(crate) struct RowGenerator<S: RowSource> {
    shared: Arc<Shared<S>>,
    index: Arc<Vec<S::Entry>>,
    cursor: Arc<Cursor>,
}

impl<S: RowSource> Clone for RowGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            index: self.index.clone(),
            cursor: self.cursor.clone(),
        }
    }
}

impl<S: RowSource> RowGenerator<S> {
    pub(crate) fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub(crate) fn next_row(&self) -> Result<Option<RawRow>> {
        let Some(position) = self.cursor.claim() else {
            return Ok(None);
        };
        self.shared
            .source
            .read_row(&self.index[position])
            .map(Some)
            .with_context(|| format!("Failed to read row at index position {}", position))
    }

    /// Collects `batch_size` usable rows, or whatever is left when the
    /// window runs out.
    ///
    /// Rows too short for some processor are skipped. A row whose label
    /// cannot be resolved fails the batch unless parse errors are ignored.
    pub(crate) fn generate(&self, batch_size: usize) -> Result<Generated> {
        ensure!(batch_size > 0, "Batch size must be greater than 0");

        let shared = &*self.shared;
        let mut columns: Vec<ColumnBuffer> = shared
            .processors
            .iter()
            .map(|_| ColumnBuffer::with_capacity(batch_size))
            .collect();
        let mut labels = Vec::with_capacity(batch_size);

        while labels.len() < batch_size {
            let Some(row) = self.next_row()? else {
                let partial = if labels.is_empty() {
                    None
                } else {
                    Some(shared.build_batch(&columns, &labels)?)
                };
                return Ok(Generated::End(partial));
            };
            if row.fields.is_empty() {
                continue;
            }

            let Some(values) = shared.extract_columns(&row) else {
                continue;
            };
            let label = match shared.resolve_label(&row.label) {
                Ok(label) => label,
                Err(e) if shared.config.ignore_parse_errors => {
                    debug!(error = %e, "Skipping row with an unusable label");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for (column, value) in columns.iter_mut().zip(values) {
                column.push(value);
            }
            labels.push(label);
        }

        Ok(Generated::Batch(shared.build_batch(&columns, &labels)?))
    }
}

impl<S: RowSource> Shared<S> {
    /// One value per processor, or `None` (logged) when the row is too short.
    fn extract_columns(&self, row: &RawRow) -> Option<Vec<ColumnValue>> {
        self.processors
            .iter()
            .map(|processor| {
                let span = processor.span();
                let value = span.extract(&row.fields);
                if value.is_none() {
                    warn!(
                        processor = processor.name(),
                        fields = row.fields.len(),
                        offset = span.offset,
                        length = span.length,
                        worker = ?current_worker_id(),
                        "Row is too short for column processor, skipping it"
                    );
                }
                value
            })
            .collect()
    }

    fn resolve_label(&self, label: &RawLabel) -> Result<LabelValue> {
        if self.source.label_processor().is_some() {
            let value = match label {
                RawLabel::Value(value) => value.clone(),
                RawLabel::Token(token) => RawValue::Text(token.clone()),
                RawLabel::Class(class) => RawValue::Int(*class),
                RawLabel::Missing => bail!("Row has no field at the label position"),
            };
            return Ok(LabelValue::Raw(value));
        }

        let value = match label {
            RawLabel::Token(token) => LabelValue::Class(self.labels.resolve(token)?),
            RawLabel::Class(class) => LabelValue::Class(*class),
            RawLabel::Value(RawValue::Int(class)) => {
                LabelValue::Class(self.labels.resolve_class(*class)?)
            }
            RawLabel::Value(RawValue::Text(token)) => {
                LabelValue::Class(self.labels.resolve(token)?)
            }
            RawLabel::Value(RawValue::Float(target)) => LabelValue::Target(*target),
            RawLabel::Value(RawValue::Floats(values)) => {
                bail!("Label must be a single value, got {} values", values.len())
            }
            RawLabel::Missing => bail!("Row has no field at the label position"),
        };
        Ok(value)
    }

    fn build_batch(&self, columns: &[ColumnBuffer], labels: &[LabelValue]) -> Result<Batch> {
        let x = self
            .processors
            .iter()
            .zip(columns)
            .map(|(processor, column)| {
                column.process(processor.as_ref()).with_context(|| {
                    format!("Column processor '{}' failed", processor.name())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (y, classes) = match self.source.label_processor() {
            Some(processor) => {
                let values: Vec<RawValue> = labels
                    .iter()
                    .filter_map(|label| match label {
                        LabelValue::Raw(value) => Some(value.clone()),
                        _ => None,
                    })
                    .collect();
                let y = processor.process_values(&values).with_context(|| {
                    format!("Label processor '{}' failed", processor.name())
                })?;
                let classes = categorical_classes(&y, labels.len())?;
                (y, classes)
            }
            None => (label_tensor(labels)?, label_classes(labels)),
        };

        Ok(Batch {
            x,
            y,
            weights: self.batch_weights(classes.as_deref(), labels.len()),
        })
    }

    /// Class weights apply only when every row has a class id; otherwise
    /// each row weighs 1.0.
    fn batch_weights(&self, classes: Option<&[i64]>, rows: usize) -> BatchWeights {
        match self.config.weighting {
            Weighting::PerSample => {
                let weights: Vec<f32> = match classes {
                    Some(classes) => classes.iter().map(|c| self.stats.weight(*c)).collect(),
                    None => vec![1.0; rows],
                };
                BatchWeights::PerSample(Tensor::from_slice(&weights))
            }
            Weighting::Binary => {
                let (pos, neg) = self.stats.binary_weights();
                BatchWeights::Binary {
                    pos: Tensor::from(pos),
                    neg: Tensor::from(neg),
                }
            }
            Weighting::None => BatchWeights::None,
        }
    }
}

/// Class ids of the batch, or `None` when any label is not a class.
fn label_classes(labels: &[LabelValue]) -> Option<Vec<i64>> {
    labels
        .iter()
        .map(|label| match label {
            LabelValue::Class(class) => Some(*class),
            _ => None,
        })
        .collect()
}

fn label_tensor(labels: &[LabelValue]) -> Result<Tensor> {
    let n = labels.len() as i64;
    if let Some(classes) = label_classes(labels) {
        return Ok(Tensor::from_slice(&classes).view([n, 1]));
    }

    let targets: Option<Vec<f32>> = labels
        .iter()
        .map(|label| match label {
            LabelValue::Target(target) => Some(*target),
            _ => None,
        })
        .collect();
    match targets {
        Some(targets) => Ok(Tensor::from_slice(&targets).view([n, 1])),
        None => bail!("Batch mixes class labels with regression targets"),
    }
}

/// Reads a processed label tensor back as class ids when it holds one
/// integer per row.
fn categorical_classes(y: &Tensor, rows: usize) -> Result<Option<Vec<i64>>> {
    let integer = matches!(y.kind(), Kind::Int64 | Kind::Int);
    let one_per_row = y.size().iter().product::<i64>() == rows as i64;
    if !(integer && one_per_row) {
        return Ok(None);
    }
    let classes = Vec::<i64>::try_from(y.to_kind(Kind::Int64).reshape([-1]))?;
    Ok(Some(classes))
}

/// Starts from the persisted category vocabulary when there is one.
fn load_label_strategy<S: RowSource>(source: &S, config: &DatasetConfig) -> Result<LabelStrategy> {
    let Some(dir) = config.cache_dir.as_ref().filter(|_| source.cacheable()) else {
        return Ok(LabelStrategy::Numeric);
    };
    let path = dir.join(CATEGORY_VOCABULARY_FILE_NAME);
    if !path.exists() {
        return Ok(LabelStrategy::Numeric);
    }
    let vocabulary = CategoryVocabulary::load(&path)?;
    info!(categories = vocabulary.len(), "Loaded category vocabulary");
    Ok(LabelStrategy::Vocabulary(Arc::new(vocabulary)))
}

/// Loads the index from the cache, or scans the source and caches the result.
fn build_index<S: RowSource>(
    source: &S,
    config: &DatasetConfig,
    strategy: LabelStrategy,
) -> Result<(Vec<S::Entry>, LabelStrategy, ClassStatistics)> {
    let cache = config
        .cache_dir
        .as_ref()
        .filter(|_| source.cacheable())
        .map(|dir| IndexCache::new(dir, S::INDEX_FIELD));

    if let Some(cache) = &cache {
        if let Some(record) = cache.load::<S::Entry>()? {
            let mut stats = record.stats;
            if stats.weights.is_empty() {
                stats.compute_weights();
            }
            stats.apply_overrides(&config.class_weights);
            return Ok((record.index, strategy, stats));
        }
    }

    info!(source = %source.describe(), "Reading row index and counting class statistics");
    let mut resolver = CategoryResolver::new(strategy);
    let index = source
        .scan(&mut resolver, config.ignore_parse_errors)
        .with_context(|| format!("Failed to scan {}", source.describe()))?;
    let (strategy, mut stats) = resolver.into_parts();
    stats.compute_weights();
    stats.apply_overrides(&config.class_weights);

    info!(
        rows = index.len(),
        class_counts = ?stats.counts,
        class_weights = ?stats.weights,
        "Scanned rows"
    );

    if let (Some(cache), Some(dir)) = (&cache, &config.cache_dir) {
        cache.save(&index, &stats)?;
        if let Some(vocabulary) = strategy.vocabulary() {
            vocabulary.save(dir.join(CATEGORY_VOCABULARY_FILE_NAME))?;
        }
    }

    Ok((index, strategy, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{CategoricalColumn, FloatColumn};
    use crate::processor::ColumnSpan;
    use crate::sources::ValuesSource;

    fn values_dataset(labels: Vec<RawValue>, config: DatasetConfig) -> Result<Dataset<ValuesSource>> {
        let column: Vec<RawValue> = (0..labels.len()).map(|i| RawValue::Float(i as f32)).collect();
        let source = ValuesSource::new(labels, vec![column])?;
        let processors: Vec<Arc<dyn ColumnProcessor>> =
            vec![Arc::new(FloatColumn::new("x", ColumnSpan::single(0)))];
        Dataset::new(source, config, processors)
    }

    fn x_values(batch: &Batch) -> Result<Vec<f32>> {
        Ok(Vec::<f32>::try_from(batch.x[0].view([-1]))?)
    }

    #[test]
    fn test_label_tensor_kinds() -> Result<()> {
        let classes = label_tensor(&[LabelValue::Class(2), LabelValue::Class(0)])?;
        assert_eq!(classes.size(), vec![2, 1]);
        assert_eq!(classes.kind(), Kind::Int64);

        let targets = label_tensor(&[LabelValue::Target(0.5)])?;
        assert_eq!(targets.kind(), Kind::Float);

        assert!(label_tensor(&[LabelValue::Class(1), LabelValue::Target(0.5)]).is_err());
        Ok(())
    }

    #[test]
    fn test_generate_reads_window_in_order() -> Result<()> {
        let labels = (0..6).map(|i| RawValue::Int(i % 2)).collect();
        let dataset = values_dataset(labels, DatasetConfig::default())?;

        let first = match dataset.generate(4)? {
            Generated::Batch(batch) => batch,
            other => panic!("expected a full batch, got {:?}", other),
        };
        assert_eq!(x_values(&first)?, vec![0.0, 1.0, 2.0, 3.0]);

        let rest = match dataset.generate(4)? {
            Generated::End(Some(batch)) => batch,
            other => panic!("expected a partial batch, got {:?}", other),
        };
        assert_eq!(rest.batch_size(), 2);
        assert!(dataset.generate(4)?.into_batch().is_none());
        Ok(())
    }

    #[test]
    fn test_shuffle_is_deterministic_and_reversible() -> Result<()> {
        let labels: Vec<RawValue> = (0..20).map(|i| RawValue::Int(i % 3)).collect();
        let mut a = values_dataset(labels.clone(), DatasetConfig::default())?;
        let mut b = values_dataset(labels, DatasetConfig::default())?;

        a.shuffle(7);
        b.shuffle(7);
        assert!(a.is_shuffled());
        assert_eq!(a.index, b.index);
        assert_ne!(*a.index, (0..20).collect::<Vec<usize>>());

        a.unshuffle()?;
        assert!(!a.is_shuffled());
        assert_eq!(*a.index, (0..20).collect::<Vec<usize>>());
        Ok(())
    }

    #[test]
    fn test_regression_labels_get_unit_weights() -> Result<()> {
        let labels = vec![RawValue::Float(0.25), RawValue::Float(1.5)];
        let dataset = values_dataset(labels, DatasetConfig::default())?;
        assert_eq!(dataset.num_categorical_classes(), 0);

        let batch = dataset.generate(2)?.into_batch().unwrap();
        assert_eq!(batch.y.kind(), Kind::Float);
        assert_eq!(batch.y.double_value(&[1, 0]), 1.5);
        match batch.weights {
            BatchWeights::PerSample(w) => {
                assert_eq!(Vec::<f32>::try_from(&w)?, vec![1.0, 1.0])
            }
            other => panic!("unexpected weights {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_multi_value_labels() -> Result<()> {
        let labels = || vec![RawValue::Floats(vec![0.1, 0.2]), RawValue::Floats(vec![0.3])];

        let strict = values_dataset(labels(), DatasetConfig::default())?;
        assert!(strict.generate(2).is_err());

        let lenient = values_dataset(
            labels(),
            DatasetConfig::builder().ignore_parse_errors(true).build(),
        )?;
        assert!(matches!(lenient.generate(2)?, Generated::End(None)));
        Ok(())
    }

    fn processed_label_dataset(
        labels: Vec<RawValue>,
        label_processor: Arc<dyn ColumnProcessor>,
    ) -> Result<Dataset<ValuesSource>> {
        let column: Vec<RawValue> = (0..labels.len()).map(|i| RawValue::Float(i as f32)).collect();
        let source = ValuesSource::new(labels, vec![column])?.label_processor(label_processor);
        let processors: Vec<Arc<dyn ColumnProcessor>> =
            vec![Arc::new(FloatColumn::new("x", ColumnSpan::single(0)))];
        Dataset::new(source, DatasetConfig::default(), processors)
    }

    #[test]
    fn test_vector_targets_through_label_processor() -> Result<()> {
        let labels = vec![
            RawValue::Floats(vec![0.1, 0.2, 0.3]),
            RawValue::Floats(vec![1.0, 2.0, 3.0]),
        ];
        let target = Arc::new(FloatColumn::new("target", ColumnSpan::single(0)));
        let dataset = processed_label_dataset(labels, target)?;

        let batch = dataset.generate(2)?.into_batch().unwrap();
        assert_eq!(batch.y.size(), vec![2, 3]);
        assert_eq!(batch.y.kind(), Kind::Float);
        assert_eq!(batch.y.double_value(&[1, 2]), 3.0);
        match batch.weights {
            BatchWeights::PerSample(w) => {
                assert_eq!(Vec::<f32>::try_from(&w)?, vec![1.0, 1.0])
            }
            other => panic!("unexpected weights {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_categorical_label_processor_keeps_class_weights() -> Result<()> {
        let encoder = Arc::new(CategoricalColumn::new("species", ColumnSpan::single(0)));
        encoder.fit(&["ant".into(), "bee".into()])?;
        let labels: Vec<RawValue> = vec!["ant".into(), "bee".into(), "bee".into()];
        let dataset = processed_label_dataset(labels, encoder)?;

        let batch = dataset.generate(3)?.into_batch().unwrap();
        assert_eq!(Vec::<i64>::try_from(batch.y.view([-1]))?, vec![0, 1, 1]);
        match batch.weights {
            BatchWeights::PerSample(w) => {
                assert_eq!(Vec::<f32>::try_from(&w)?, vec![2.0, 1.0, 1.0])
            }
            other => panic!("unexpected weights {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_len_is_clamped_to_the_index() -> Result<()> {
        let labels = (0..10).map(|i| RawValue::Int(i % 2)).collect();
        let config = DatasetConfig::builder().partitions(0.8, 0.3, 0.1).build();
        let mut dataset = values_dataset(labels, config)?;
        assert_eq!(dataset.len(), 8);

        dataset.set_mode(GeneratorMode::Val);
        assert_eq!(dataset.len(), 2);
        dataset.set_mode(GeneratorMode::Test);
        assert_eq!(dataset.len(), 0);
        assert!(dataset.is_empty());
        Ok(())
    }

    #[test]
    fn test_partition_windows() -> Result<()> {
        let labels = (0..10).map(|i| RawValue::Int(i % 2)).collect();
        let config = DatasetConfig::builder().partitions(0.8, 0.1, 0.1).build();
        let mut dataset = values_dataset(labels, config)?;
        assert_eq!(dataset.len(), 8);

        dataset.set_mode(GeneratorMode::Test);
        assert_eq!(dataset.len(), 1);
        let batch = dataset.generate(5)?.into_batch().unwrap();
        assert_eq!(x_values(&batch)?, vec![9.0]);

        dataset.reset();
        assert_eq!(dataset.generate(5)?.into_batch().map(|b| b.batch_size()), Some(1));
        Ok(())
    }
}
