use anyhow::{ensure, Context, Result};
use std::fmt;
use std::sync::Arc;

use crate::category::CategoryResolver;
use crate::processor::ColumnProcessor;
use crate::source::{RawLabel, RawRow, RawValue, RowFields, RowSource};

/// Rows held in memory as one value array per column plus a label array.
///
/// Integer labels are class ids, text labels are category names and float
/// labels are regression targets. Nothing is cached: the index is simply
/// every row position.
///
/// Labels of any other shape, such as vector targets, go through a label
/// processor set with [`label_processor`](ValuesSource::label_processor).
///
/// # Example
/// ```ignore
/// let source = ValuesSource::new(targets, vec![features])?
///     .label_processor(Arc::new(FloatColumn::new("target", ColumnSpan::single(0))));
/// ```
#[derive(Clone)]
pub struct ValuesSource {
    labels: Vec<RawValue>,
    columns: Vec<Vec<RawValue>>,
    label_processor: Option<Arc<dyn ColumnProcessor>>,
}

impl ValuesSource {
    /// Every column must have one value per label.
    pub fn new(labels: Vec<RawValue>, columns: Vec<Vec<RawValue>>) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            ensure!(
                column.len() == labels.len(),
                "Column {} has {} values but there are {} labels",
                i,
                column.len(),
                labels.len()
            );
        }
        Ok(Self {
            labels,
            columns,
            label_processor: None,
        })
    }

    /// Builds label tensors with `processor` instead of the built-in class
    /// and target handling. The processor is used as is, not fitted.
    pub fn label_processor(mut self, processor: Arc<dyn ColumnProcessor>) -> Self {
        self.label_processor = Some(processor);
        self
    }
}

impl fmt::Debug for ValuesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValuesSource")
            .field("rows", &self.labels.len())
            .field("columns", &self.columns.len())
            .field(
                "label_processor",
                &self.label_processor.as_ref().map(|p| p.name().to_string()),
            )
            .finish()
    }
}

impl RowSource for ValuesSource {
    type Entry = usize;

    const INDEX_FIELD: &'static str = "Positions";

    fn describe(&self) -> String {
        format!("{} in-memory rows", self.labels.len())
    }

    fn cacheable(&self) -> bool {
        false
    }

    fn scan(
        &self,
        resolver: &mut CategoryResolver,
        _ignore_parse_errors: bool,
    ) -> Result<Vec<usize>> {
        for label in &self.labels {
            match label {
                RawValue::Int(class) => {
                    resolver.resolve_class(*class);
                }
                RawValue::Text(token) => {
                    resolver.resolve(token);
                }
                RawValue::Float(_) | RawValue::Floats(_) => {}
            }
        }
        // Count once every label is known, so integer and text labels share
        // the final ids.
        for label in &self.labels {
            let class = match label {
                RawValue::Int(class) => resolver.strategy().resolve_class(*class)?,
                RawValue::Text(token) => resolver.strategy().resolve(token)?,
                RawValue::Float(_) | RawValue::Floats(_) => continue,
            };
            resolver.record(class);
        }
        Ok((0..self.labels.len()).collect())
    }

    fn read_row(&self, position: &usize) -> Result<RawRow> {
        let label = self
            .labels
            .get(*position)
            .with_context(|| format!("No row at position {}", position))?;
        let fields = self
            .columns
            .iter()
            .map(|column| column[*position].clone())
            .collect();
        Ok(RawRow {
            fields: RowFields::Values(fields),
            label: RawLabel::Value(label.clone()),
        })
    }

    fn label_processor(&self) -> Option<&Arc<dyn ColumnProcessor>> {
        self.label_processor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_columns() {
        let result = ValuesSource::new(
            vec![RawValue::Int(0), RawValue::Int(1)],
            vec![vec![RawValue::Float(1.0)]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_scan_counts_integer_labels_only() -> Result<()> {
        let source = ValuesSource::new(
            vec![RawValue::Int(1), RawValue::Int(1), RawValue::Float(0.5)],
            vec![vec![1.0f32.into(), 2.0f32.into(), 3.0f32.into()]],
        )?;
        let mut resolver = CategoryResolver::default();
        assert_eq!(source.scan(&mut resolver, false)?, vec![0, 1, 2]);
        assert_eq!(resolver.stats().counts.get(&1), Some(&2));
        assert_eq!(resolver.stats().total(), 2);

        let row = source.read_row(&2)?;
        assert_eq!(row.fields, RowFields::Values(vec![RawValue::Float(3.0)]));
        assert_eq!(row.label, RawLabel::Value(RawValue::Float(0.5)));
        Ok(())
    }

    #[test]
    fn test_mixed_integer_and_text_labels() -> Result<()> {
        let source = ValuesSource::new(
            vec![RawValue::Int(4), "owl".into(), RawValue::Int(4)],
            vec![],
        )?;
        let mut resolver = CategoryResolver::default();
        source.scan(&mut resolver, false)?;

        let expected: std::collections::BTreeMap<i64, usize> =
            [(0, 2), (1, 1)].into_iter().collect();
        assert_eq!(resolver.stats().counts, expected);
        assert_eq!(resolver.strategy().resolve_class(4)?, 0);
        Ok(())
    }
}
