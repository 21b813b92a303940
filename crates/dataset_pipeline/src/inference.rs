use anyhow::{ensure, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tch::Tensor;
use tracing::info;

use crate::processor::ColumnProcessor;
use crate::source::RawValue;

/// Turns raw inputs into model tensors with processors fitted at training
/// time.
///
/// # Example
/// ```ignore
/// let inference = Inference::new("models/reviews", processors)?;
/// let inputs = inference.generate_inputs(&[
///     vec!["acme".into()],
///     vec![RawValue::Floats(vec![0.2, 0.4, 0.1, 0.9])],
/// ])?;
/// ```
pub struct Inference {
    processors: Vec<Arc<dyn ColumnProcessor>>,
}

impl Inference {
    /// Loads every processor's fitted state from `save_dir`.
    pub fn new(
        save_dir: impl AsRef<Path>,
        processors: Vec<Arc<dyn ColumnProcessor>>,
    ) -> Result<Self> {
        let save_dir = save_dir.as_ref();
        for processor in &processors {
            processor.load(save_dir).with_context(|| {
                format!(
                    "Failed to load column processor '{}' from {}",
                    processor.name(),
                    save_dir.display()
                )
            })?;
        }
        info!(
            dir = %save_dir.display(),
            processors = processors.len(),
            "Loaded column processors for inference"
        );
        Ok(Self { processors })
    }

    /// Processor names in input column order.
    pub fn column_names(&self) -> Vec<String> {
        self.processors
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// One tensor per column, each built from that column's values.
    ///
    /// `columns[i]` is processed by the i-th processor. Supplying more
    /// columns than processors is an error.
    pub fn generate_inputs(&self, columns: &[Vec<RawValue>]) -> Result<Vec<Tensor>> {
        ensure!(
            columns.len() <= self.processors.len(),
            "There are not enough column processors ({}) for the number of input columns ({})",
            self.processors.len(),
            columns.len()
        );
        self.processors
            .iter()
            .zip(columns)
            .map(|(processor, values)| {
                processor.process_values(values).with_context(|| {
                    format!("Column processor '{}' failed", processor.name())
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ColumnSpan;
    use crate::processors::{CategoricalColumn, FloatColumn};
    use tempfile::tempdir;

    #[test]
    fn test_inputs_from_saved_processors() -> Result<()> {
        let dir = tempdir()?;
        let fitted = CategoricalColumn::new("brand", ColumnSpan::single(0));
        fitted.fit(&["acme".into(), "globex".into()])?;
        fitted.save(dir.path())?;

        let processors: Vec<Arc<dyn ColumnProcessor>> = vec![
            Arc::new(CategoricalColumn::new("brand", ColumnSpan::single(0))),
            Arc::new(FloatColumn::new("scores", ColumnSpan::multi(1, 2))),
        ];
        let inference = Inference::new(dir.path(), processors)?;

        let inputs = inference.generate_inputs(&[
            vec!["globex".into()],
            vec![RawValue::Floats(vec![0.5, 1.0])],
        ])?;
        assert_eq!(inference.column_names(), vec!["brand", "scores"]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].int64_value(&[0, 0]), 1);
        assert_eq!(inputs[1].size(), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_too_many_columns() -> Result<()> {
        let dir = tempdir()?;
        let processors: Vec<Arc<dyn ColumnProcessor>> =
            vec![Arc::new(FloatColumn::new("x", ColumnSpan::single(0)))];
        let inference = Inference::new(dir.path(), processors)?;
        let result = inference.generate_inputs(&[vec![1.0f32.into()], vec![2.0f32.into()]]);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_missing_state_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let processors: Vec<Arc<dyn ColumnProcessor>> =
            vec![Arc::new(CategoricalColumn::new("brand", ColumnSpan::single(0)))];
        assert!(Inference::new(dir.path(), processors).is_err());
        Ok(())
    }
}
