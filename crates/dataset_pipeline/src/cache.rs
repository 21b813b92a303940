//! Persisted row index and class statistics.
//!
//! A cold scan of a large source is expensive, so its result is written to
//! `file-stats.json` inside the cache directory and reused on every later
//! construction. The record is trusted as-is: if the source changes, delete
//! the cache directory.
//!
//! ```json
//! {"LineOffsets": [0, 17, 34], "Count": 3,
//!  "ClassCounts": {"0": 2, "1": 1}, "ClassWeights": {"0": 1.0, "1": 2.0}}
//! ```
//!
//! The name of the index array depends on the source (`LineOffsets` for
//! delimited files, `Images` for category folders).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::category::ClassStatistics;

pub const CACHE_FILE_NAME: &str = "file-stats.json";
pub const CATEGORY_VOCABULARY_FILE_NAME: &str = "category-tokenizer.json";

const COUNT_FIELD: &str = "Count";
const CLASS_COUNTS_FIELD: &str = "ClassCounts";
const CLASS_WEIGHTS_FIELD: &str = "ClassWeights";

/// Everything a cold scan produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord<E> {
    pub index: Vec<E>,
    pub count: usize,
    pub stats: ClassStatistics,
}

/// Reads and writes [`CacheRecord`]s in a cache directory.
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    index_field: &'static str,
}

impl IndexCache {
    pub fn new(cache_dir: impl AsRef<Path>, index_field: &'static str) -> Self {
        Self {
            path: cache_dir.as_ref().join(CACHE_FILE_NAME),
            index_field,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, or `None` when no cache file exists yet.
    ///
    /// A file that exists but cannot be parsed is an error rather than a
    /// cache miss.
    pub fn load<E: DeserializeOwned>(&self) -> Result<Option<CacheRecord<E>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No index cache");
                return Ok(None);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read cache {}", self.path.display()))
            }
        };

        let mut fields: Map<String, Value> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid cache file {}", self.path.display()))?;

        let index: Vec<E> = take_field(&mut fields, self.index_field)?;
        let count: usize = take_field(&mut fields, COUNT_FIELD)?;
        let counts: BTreeMap<i64, usize> = take_field(&mut fields, CLASS_COUNTS_FIELD)?;
        let weights: BTreeMap<i64, f32> = match fields.remove(CLASS_WEIGHTS_FIELD) {
            Some(Value::Null) | None => BTreeMap::new(),
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Invalid '{}' in cache", CLASS_WEIGHTS_FIELD))?,
        };

        info!(
            path = %self.path.display(),
            rows = count,
            "Loaded row index and class statistics from cache"
        );

        Ok(Some(CacheRecord {
            index,
            count,
            stats: ClassStatistics { counts, weights },
        }))
    }

    /// Writes the record. The file is written next to its final name and
    /// renamed into place, so readers never see a partial record.
    pub fn save<E: Serialize>(&self, index: &[E], stats: &ClassStatistics) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(self.index_field.to_string(), serde_json::to_value(index)?);
        fields.insert(COUNT_FIELD.to_string(), Value::from(index.len()));
        fields.insert(
            CLASS_COUNTS_FIELD.to_string(),
            serde_json::to_value(&stats.counts)?,
        );
        fields.insert(
            CLASS_WEIGHTS_FIELD.to_string(),
            serde_json::to_value(&stats.weights)?,
        );

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(&fields)?)
            .with_context(|| format!("Failed to write cache {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to move cache into {}", self.path.display()))?;

        debug!(path = %self.path.display(), rows = index.len(), "Saved index cache");
        Ok(())
    }
}

fn take_field<T: DeserializeOwned>(fields: &mut Map<String, Value>, name: &str) -> Result<T> {
    let value = fields
        .remove(name)
        .with_context(|| format!("Cache file is missing '{}'", name))?;
    serde_json::from_value(value).with_context(|| format!("Invalid '{}' in cache", name))
}
