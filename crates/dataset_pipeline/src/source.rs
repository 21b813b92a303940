//! Row sources: where indexed rows come from.
//!
//! A [`RowSource`] knows how to build its index during a cold scan and how to
//! read one row back given an index entry. Everything else (caching,
//! partitioning, shuffling, batching) is handled by the generic
//! [`Dataset`](crate::dataset::Dataset) engine.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::category::CategoryResolver;
use crate::processor::ColumnProcessor;

/// A single value supplied directly by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Int(i64),
    Float(f32),
    Text(String),
    Floats(Vec<f32>),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Int(v) => write!(f, "{}", v),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Text(v) => f.write_str(v),
            RawValue::Floats(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<f32> for RawValue {
    fn from(value: f32) -> Self {
        RawValue::Float(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Vec<f32>> for RawValue {
    fn from(values: Vec<f32>) -> Self {
        RawValue::Floats(values)
    }
}

/// The feature fields of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFields {
    /// Text fields split from a delimited line or a file path.
    Text(Vec<String>),
    /// Typed values, one per column, from an in-memory source.
    Values(Vec<RawValue>),
}

impl RowFields {
    pub fn len(&self) -> usize {
        match self {
            RowFields::Text(fields) => fields.len(),
            RowFields::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The label of one row as the source found it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLabel {
    /// A label token still to be resolved (integer text or category name).
    Token(String),
    /// A class id already resolved during the scan.
    Class(i64),
    /// A caller-supplied value (integer class, category name or regression
    /// target).
    Value(RawValue),
    /// The row has no field at the label position.
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub fields: RowFields,
    pub label: RawLabel,
}

/// Backing storage for a [`Dataset`](crate::dataset::Dataset).
pub trait RowSource: Send + Sync + 'static {
    /// Locates one row. Stored in the index and, for cacheable sources, in
    /// the cache file.
    type Entry: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Name of the index array in the cache file.
    const INDEX_FIELD: &'static str;

    /// Short description used in log events.
    fn describe(&self) -> String;

    /// Whether the index is worth persisting between runs.
    fn cacheable(&self) -> bool {
        true
    }

    /// Builds the index in source order, resolving and counting every
    /// label through `resolver`.
    ///
    /// With `ignore_parse_errors` set, unreadable rows are left out of the
    /// index instead of failing the scan.
    fn scan(
        &self,
        resolver: &mut CategoryResolver,
        ignore_parse_errors: bool,
    ) -> Result<Vec<Self::Entry>>;

    /// Reads the row an index entry points at.
    fn read_row(&self, entry: &Self::Entry) -> Result<RawRow>;

    /// Processor that builds the label tensor from raw label values. When
    /// set it replaces the built-in class id / regression target handling.
    fn label_processor(&self) -> Option<&Arc<dyn ColumnProcessor>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_display() {
        assert_eq!(RawValue::Int(-4).to_string(), "-4");
        assert_eq!(RawValue::Float(1.5).to_string(), "1.5");
        assert_eq!(RawValue::from("x,y").to_string(), "x,y");
        assert_eq!(RawValue::from(vec![1.0, 2.5]).to_string(), "1,2.5");
    }
}
