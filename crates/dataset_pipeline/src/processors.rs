//! Ready-made column processors.

use anyhow::{bail, ensure, Context, Result};
use std::path::Path;
use tch::Tensor;

use crate::category::CategoryVocabulary;
use crate::processor::{ColumnProcessor, ColumnSpan};
use crate::source::RawValue;

/// Numeric features: each value is a comma-separated list of floats.
///
/// Produces a `Float` tensor of shape `[rows, width]`. Every row in a batch
/// must carry the same number of values.
#[derive(Debug, Clone)]
pub struct FloatColumn {
    name: String,
    span: ColumnSpan,
}

impl FloatColumn {
    pub fn new(name: impl Into<String>, span: ColumnSpan) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }

    fn build(&self, rows: Vec<Vec<f32>>) -> Result<Tensor> {
        let width = rows.first().map_or(0, Vec::len);
        ensure!(
            rows.iter().all(|row| row.len() == width),
            "Column '{}' has rows of different widths",
            self.name
        );
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let n = (flat.len() / width.max(1)) as i64;
        Ok(Tensor::from_slice(&flat).view([n, width as i64]))
    }
}

fn parse_floats(column: &str, value: &str) -> Result<Vec<f32>> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("Column '{}': '{}' is not a number", column, part))
        })
        .collect()
}

impl ColumnProcessor for FloatColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn span(&self) -> ColumnSpan {
        self.span
    }

    fn process_strings(&self, values: &[String]) -> Result<Tensor> {
        let rows = values
            .iter()
            .map(|value| parse_floats(&self.name, value))
            .collect::<Result<Vec<_>>>()?;
        self.build(rows)
    }

    fn process_values(&self, values: &[RawValue]) -> Result<Tensor> {
        let rows = values
            .iter()
            .map(|value| match value {
                RawValue::Int(v) => Ok(vec![*v as f32]),
                RawValue::Float(v) => Ok(vec![*v]),
                RawValue::Floats(v) => Ok(v.clone()),
                RawValue::Text(text) => parse_floats(&self.name, text),
            })
            .collect::<Result<Vec<_>>>()?;
        self.build(rows)
    }
}

/// A categorical feature encoded as vocabulary ids.
///
/// Fitting builds the vocabulary in first-seen order. Processing produces an
/// `Int64` tensor of shape `[rows, 1]`; categories never seen during fitting
/// are an error. The fitted vocabulary is persisted as
/// `<name>-tokenizer.json`.
#[derive(Debug)]
pub struct CategoricalColumn {
    name: String,
    span: ColumnSpan,
    vocabulary: CategoryVocabulary,
}

impl CategoricalColumn {
    pub fn new(name: impl Into<String>, span: ColumnSpan) -> Self {
        Self {
            name: name.into(),
            span,
            vocabulary: CategoryVocabulary::new(),
        }
    }

    pub fn vocabulary(&self) -> &CategoryVocabulary {
        &self.vocabulary
    }

    fn file_name(&self) -> String {
        format!("{}-tokenizer.json", self.name)
    }
}

impl ColumnProcessor for CategoricalColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn span(&self) -> ColumnSpan {
        self.span
    }

    fn requires_fit(&self) -> bool {
        true
    }

    fn fit(&self, values: &[String]) -> Result<()> {
        for value in values {
            self.vocabulary.fit(value);
        }
        Ok(())
    }

    fn finish_fit(&self) -> Result<()> {
        ensure!(
            !self.vocabulary.is_empty(),
            "Column '{}' saw no values while fitting",
            self.name
        );
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<()> {
        self.vocabulary.load_into(dir.join(self.file_name()))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        self.vocabulary.save(dir.join(self.file_name()))
    }

    fn process_strings(&self, values: &[String]) -> Result<Tensor> {
        let ids = values
            .iter()
            .map(|value| match self.vocabulary.id(value) {
                Some(id) => Ok(id),
                None => bail!("Column '{}': unknown category '{}'", self.name, value),
            })
            .collect::<Result<Vec<i64>>>()?;
        Ok(Tensor::from_slice(&ids).view([ids.len() as i64, 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;
    use tempfile::tempdir;

    #[test]
    fn test_float_column_shape() -> Result<()> {
        let column = FloatColumn::new("features", ColumnSpan::multi(1, 3));
        let tensor = column.process_strings(&["1,2,3".into(), "4,5,6".into()])?;
        assert_eq!(tensor.size(), vec![2, 3]);
        assert_eq!(tensor.kind(), Kind::Float);
        assert_eq!(tensor.double_value(&[1, 2]), 6.0);
        Ok(())
    }

    #[test]
    fn test_float_column_rejects_ragged_rows() {
        let column = FloatColumn::new("features", ColumnSpan::single(0));
        assert!(column
            .process_strings(&["1,2".into(), "3".into()])
            .is_err());
        assert!(column.process_strings(&["abc".into()]).is_err());
    }

    #[test]
    fn test_float_column_values() -> Result<()> {
        let column = FloatColumn::new("x", ColumnSpan::single(0));
        let tensor = column.process_values(&[RawValue::Int(2), RawValue::Float(0.5)])?;
        assert_eq!(tensor.size(), vec![2, 1]);
        assert_eq!(tensor.double_value(&[1, 0]), 0.5);
        Ok(())
    }

    #[test]
    fn test_categorical_fit_and_process() -> Result<()> {
        let column = CategoricalColumn::new("colour", ColumnSpan::single(0));
        column.fit(&["red".into(), "green".into(), "red".into()])?;
        column.finish_fit()?;

        let tensor = column.process_strings(&["green".into(), "RED".into()])?;
        assert_eq!(tensor.size(), vec![2, 1]);
        assert_eq!(tensor.kind(), Kind::Int64);
        assert_eq!(tensor.int64_value(&[0, 0]), 1);
        assert_eq!(tensor.int64_value(&[1, 0]), 0);

        assert!(column.process_strings(&["blue".into()]).is_err());
        Ok(())
    }

    #[test]
    fn test_categorical_save_load() -> Result<()> {
        let dir = tempdir()?;
        let fitted = CategoricalColumn::new("colour", ColumnSpan::single(0));
        fitted.fit(&["red".into(), "green".into()])?;
        fitted.save(dir.path())?;
        assert!(dir.path().join("colour-tokenizer.json").exists());

        let restored = CategoricalColumn::new("colour", ColumnSpan::single(0));
        assert!(restored.load(&dir.path().join("missing")).is_err());
        restored.load(dir.path())?;
        assert_eq!(restored.vocabulary().id("green"), Some(1));
        Ok(())
    }
}
