#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use dataset_pipeline::{ColumnProcessor, ColumnSpan, RawValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tch::Tensor;

/// Writes `lines` to `dir/name`, one per line.
pub fn write_lines(dir: &Path, name: &str, lines: &[String]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(&path, contents)?;
    Ok(path)
}

/// `n` rows of `label,row_id` where the label alternates 0 / 1.
pub fn numbered_rows(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{},{}", i % 2, i)).collect()
}

/// Creates `<dir>/<category>/<i>.jpg` files.
pub fn make_category_tree(dir: &Path, categories: &[(&str, usize)]) -> Result<()> {
    for (category, files) in categories {
        let folder = dir.join(category);
        fs::create_dir_all(&folder)?;
        for i in 0..*files {
            fs::write(folder.join(format!("{}.jpg", i)), b"")?;
        }
    }
    Ok(())
}

/// Reads a `[n, 1]` or `[n]` float column back as row ids.
pub fn row_ids(tensor: &Tensor) -> Result<Vec<i64>> {
    let values = Vec::<f32>::try_from(tensor.view([-1]))?;
    Ok(values.into_iter().map(|v| v as i64).collect())
}

pub fn labels(tensor: &Tensor) -> Result<Vec<i64>> {
    Ok(Vec::<i64>::try_from(tensor.view([-1]))?)
}

/// Processor that records everything it is fitted on and encodes values by
/// their length.
pub struct RecordingProcessor {
    name: String,
    span: ColumnSpan,
    pub fitted: Mutex<Vec<String>>,
    pub finish_calls: AtomicUsize,
    pub fail_on: Option<String>,
}

impl RecordingProcessor {
    pub fn new(name: &str, span: ColumnSpan) -> Self {
        Self {
            name: name.to_string(),
            span,
            fitted: Mutex::new(Vec::new()),
            finish_calls: AtomicUsize::new(0),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, value: &str) -> Self {
        self.fail_on = Some(value.to_string());
        self
    }

    pub fn fitted_values(&self) -> Vec<String> {
        let mut values = self.fitted.lock().unwrap().clone();
        values.sort();
        values
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }

    fn state_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}-recording.json", self.name))
    }
}

impl ColumnProcessor for RecordingProcessor {
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
            if self.fail_on.as_deref() == Some(value.as_str()) {
                bail!("refusing to fit '{}'", value);
            }
            self.fitted.lock().unwrap().push(value.clone());
        }
        Ok(())
    }

    fn finish_fit(&self) -> Result<()> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<()> {
        let path = self.state_file(dir);
        let contents = fs::read(&path).with_context(|| format!("no state at {}", path.display()))?;
        let values: Vec<String> = serde_json::from_slice(&contents)?;
        *self.fitted.lock().unwrap() = values;
        Ok(())
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let values = self.fitted.lock().unwrap().clone();
        fs::write(self.state_file(dir), serde_json::to_vec(&values)?)?;
        Ok(())
    }

    fn process_strings(&self, values: &[String]) -> Result<Tensor> {
        let lengths: Vec<i64> = values.iter().map(|v| v.len() as i64).collect();
        Ok(Tensor::from_slice(&lengths).view([values.len() as i64, 1]))
    }

    fn process_values(&self, values: &[RawValue]) -> Result<Tensor> {
        let text: Vec<String> = values.iter().map(RawValue::to_string).collect();
        self.process_strings(&text)
    }
}
