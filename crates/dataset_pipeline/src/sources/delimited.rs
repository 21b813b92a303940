use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::category::CategoryResolver;
use crate::config::DelimitedFileConfig;
use crate::source::{RawLabel, RawRow, RowFields, RowSource};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Rows of a single delimited text file, indexed by the byte offset at which
/// each line starts.
///
/// Reads seek straight to a row's offset, so producers never scan the file.
/// Open handles are pooled and capped by `concurrent_file_limit`.
///
/// # Example
/// ```ignore
/// let source = DelimitedFileSource::new(
///     DelimitedFileConfig::new("reviews.csv", 0).skip_headers(true),
/// )?;
/// ```
pub struct DelimitedFileSource {
    config: DelimitedFileConfig,
    handles: HandlePool,
}

impl DelimitedFileSource {
    /// Checks that the file exists and is readable.
    pub fn new(config: DelimitedFileConfig) -> Result<Self> {
        let metadata = fs::metadata(&config.path)
            .with_context(|| format!("Failed to access file: {}", config.path.display()))?;
        ensure!(
            metadata.is_file(),
            "Path is not a file: {}",
            config.path.display()
        );
        ensure!(
            config.concurrent_file_limit > 0,
            "concurrent_file_limit must be at least 1"
        );

        let handles = HandlePool::new(config.path.clone(), config.concurrent_file_limit);
        Ok(Self { config, handles })
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .delimiter(self.config.delimiter)
            .flexible(true);
        builder
    }

    /// Parses one raw line. `Ok(None)` for lines without a record.
    fn parse_line(&self, line: &[u8]) -> Result<Option<Vec<String>>> {
        let mut reader = self.reader_builder().from_reader(line);
        let mut record = StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Ok(None);
        }
        Ok(Some(record.iter().map(str::to_string).collect()))
    }

    fn build_row(&self, fields: Vec<String>) -> RawRow {
        let label = match fields.get(self.config.category_offset) {
            Some(token) => RawLabel::Token(token.clone()),
            None => RawLabel::Missing,
        };
        RawRow {
            fields: RowFields::Text(fields),
            label,
        }
    }
}

impl RowSource for DelimitedFileSource {
    type Entry = u64;

    const INDEX_FIELD: &'static str = "LineOffsets";

    fn describe(&self) -> String {
        self.config.path.display().to_string()
    }

    fn scan(
        &self,
        resolver: &mut CategoryResolver,
        ignore_parse_errors: bool,
    ) -> Result<Vec<u64>> {
        let path = &self.config.path;
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut offsets = Vec::new();
        let mut line = Vec::new();
        let mut offset = 0u64;
        let mut line_number = 0usize;
        let mut last_progress = Instant::now();

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .with_context(|| format!("Error reading line {}", line_number + 1))?;
            if read == 0 {
                break;
            }
            let line_start = offset;
            offset += read as u64;
            line_number += 1;

            if self.config.skip_headers && line_number == 1 {
                continue;
            }

            let fields = match self.parse_line(&line) {
                Ok(Some(fields)) => fields,
                Ok(None) => continue,
                Err(e) if ignore_parse_errors => {
                    debug!(line = line_number, error = %e, "Skipping unparseable line");
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to parse line {} of {}", line_number, path.display())
                    })
                }
            };

            if let Some(filter) = &self.config.row_filter {
                if !filter(&fields) {
                    continue;
                }
            }

            let Some(token) = fields.get(self.config.category_offset) else {
                if ignore_parse_errors {
                    debug!(line = line_number, "Skipping line without a label");
                    continue;
                }
                bail!(
                    "Line {} of {} has {} fields but the label is at offset {}",
                    line_number,
                    path.display(),
                    fields.len(),
                    self.config.category_offset
                );
            };

            resolver.resolve_and_record(token);
            offsets.push(line_start);

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                debug!(rows = offsets.len(), bytes = offset, "Reading offsets and counting");
                last_progress = Instant::now();
            }
        }

        Ok(offsets)
    }

    fn read_row(&self, offset: &u64) -> Result<RawRow> {
        let fields = self.handles.with_file(|file| {
            file.seek(SeekFrom::Start(*offset))
                .with_context(|| format!("Failed to seek to offset {}", offset))?;

            let mut reader = self.reader_builder().from_reader(file);
            let mut record = StringRecord::new();
            if !reader
                .read_record(&mut record)
                .with_context(|| format!("Failed to parse row at offset {}", offset))?
            {
                bail!("No row at offset {}", offset);
            }
            Ok(record.iter().map(str::to_string).collect())
        })?;
        Ok(self.build_row(fields))
    }
}

/// Bounded pool of open handles on one file.
struct HandlePool {
    path: PathBuf,
    limit: usize,
    state: Mutex<HandleState>,
    returned: Condvar,
}

#[derive(Default)]
struct HandleState {
    idle: Vec<File>,
    open: usize,
}

impl HandlePool {
    fn new(path: PathBuf, limit: usize) -> Self {
        Self {
            path,
            limit,
            state: Mutex::new(HandleState::default()),
            returned: Condvar::new(),
        }
    }

    /// Lends a handle to `read` and returns it to the pool afterwards.
    fn with_file<T>(&self, read: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let mut file = self.acquire()?;
        let result = read(&mut file);
        self.release(file);
        result
    }

    /// Takes an idle handle, opens a new one while under the limit, or waits
    /// for one to be returned.
    fn acquire(&self) -> Result<File> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(file) = state.idle.pop() {
                return Ok(file);
            }
            if state.open < self.limit {
                state.open += 1;
                drop(state);
                return File::open(&self.path).or_else(|e| {
                    self.forget();
                    Err(e).with_context(|| format!("Failed to open file: {}", self.path.display()))
                });
            }
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self, file: File) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.idle.push(file);
        self.returned.notify_one();
    }

    /// Gives back a slot whose handle could not be opened.
    fn forget(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open -= 1;
        self.returned.notify_one();
    }

    #[cfg(test)]
    fn open_handles(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open
    }
}

impl std::fmt::Debug for DelimitedFileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelimitedFileSource")
            .field("config", &self.config)
            .finish()
    }
}
