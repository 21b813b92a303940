//! The column processor contract.
//!
//! A processor turns one column (or a run of adjacent columns) of a batch
//! into a tensor. Processors that need statistics from the data, such as a
//! vocabulary or a normalisation range, declare `requires_fit` and are fitted
//! once over a shuffled sample of rows before the dataset is handed out.
//!
//! Fitting is parallel: `fit` is called from many pool threads at once, so
//! implementations keep their fit state behind interior mutability.

use anyhow::Result;
use std::path::Path;
use tch::Tensor;

use crate::source::{RawValue, RowFields};

/// The position of a processor's input within a row.
///
/// A span longer than one field joins the fields with `","` before they
/// reach the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub offset: usize,
    pub length: usize,
}

impl ColumnSpan {
    pub fn single(offset: usize) -> Self {
        Self { offset, length: 1 }
    }

    pub fn multi(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    fn end(&self) -> usize {
        self.offset + self.length.max(1)
    }

    /// Extracts the span from a row, or `None` if the row is too short.
    pub fn extract(&self, fields: &RowFields) -> Option<ColumnValue> {
        if fields.len() < self.end() {
            return None;
        }
        match fields {
            RowFields::Text(fields) => {
                Some(ColumnValue::Text(fields[self.offset..self.end()].join(",")))
            }
            RowFields::Values(values) if self.length <= 1 => {
                Some(ColumnValue::Value(values[self.offset].clone()))
            }
            RowFields::Values(values) => {
                let joined: Vec<String> = values[self.offset..self.end()]
                    .iter()
                    .map(RawValue::to_string)
                    .collect();
                Some(ColumnValue::Text(joined.join(",")))
            }
        }
    }
}

/// One processor's slice of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Value(RawValue),
}

/// Accumulates one processor's column for a batch.
#[derive(Debug, Default)]
pub(crate) struct ColumnBuffer {
    text: Vec<String>,
    values: Vec<RawValue>,
}

impl ColumnBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            text: Vec::with_capacity(capacity),
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, value: ColumnValue) {
        match value {
            ColumnValue::Text(text) => self.text.push(text),
            ColumnValue::Value(value) => self.values.push(value),
        }
    }

    /// Runs the buffered column through `processor`.
    ///
    /// Sources produce one kind of field per column, so a buffer only ever
    /// fills one of its two sides.
    pub(crate) fn process(&self, processor: &dyn ColumnProcessor) -> Result<Tensor> {
        if self.values.is_empty() {
            processor.process_strings(&self.text)
        } else {
            processor.process_values(&self.values)
        }
    }
}

/// Converts one column of raw values into a batch tensor.
pub trait ColumnProcessor: Send + Sync {
    /// Name used in logs and in the names of persisted fit state.
    fn name(&self) -> &str;

    /// Which fields of a row this processor reads.
    fn span(&self) -> ColumnSpan;

    fn requires_fit(&self) -> bool {
        false
    }

    /// Folds a batch of text values into the fit state.
    fn fit(&self, _values: &[String]) -> Result<()> {
        Ok(())
    }

    /// Folds a batch of typed values into the fit state. Defaults to fitting
    /// their text form.
    fn fit_values(&self, values: &[RawValue]) -> Result<()> {
        let text: Vec<String> = values.iter().map(RawValue::to_string).collect();
        self.fit(&text)
    }

    /// Called once after every fitting row has been seen.
    fn finish_fit(&self) -> Result<()> {
        Ok(())
    }

    /// Restores fit state persisted by [`save`](Self::save). An error means
    /// the processor has to be fitted.
    fn load(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Persists fit state into `dir`.
    fn save(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    /// Produces the tensor for a column of text values, one per row.
    fn process_strings(&self, values: &[String]) -> Result<Tensor>;

    /// Produces the tensor for a column of typed values. Defaults to
    /// processing their text form.
    fn process_values(&self, values: &[RawValue]) -> Result<Tensor> {
        let text: Vec<String> = values.iter().map(RawValue::to_string).collect();
        self.process_strings(&text)
    }

    /// Fits a single extracted column value.
    fn fit_column(&self, value: &ColumnValue) -> Result<()> {
        match value {
            ColumnValue::Text(text) => self.fit(std::slice::from_ref(text)),
            ColumnValue::Value(value) => self.fit_values(std::slice::from_ref(value)),
        }
    }
}
