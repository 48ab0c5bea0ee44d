//! Destinations for accepted phrases
//!
//! - [`AppendLog`]: the durable append-only record log
//! - [`MemorySink`]: in-memory capture for tests and embedding
//! - [`write_seed_list`]: one-shot `<phrase> <metric>` listing at end of run

use crate::error::{SinkError, SinkResult};
use crate::pipeline::collector::{AcceptedRecord, ResultLedger};
use crate::progress::format_elapsed;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const RECORD_SEPARATOR: &str = "----------------------------------";

/// Receives each accepted record as it is accepted
pub trait ResultSink: Send {
    fn append(&mut self, record: &AcceptedRecord) -> SinkResult<()>;
}

/// Render one record in the log file format
pub fn format_record(record: &AcceptedRecord) -> String {
    format!(
        "Mnemonic: {}\nTotal characters: {}\nTotal iterations: {}\nTime elapsed: {}\n{}\n",
        record.phrase,
        record.metric,
        record.iteration,
        format_elapsed(record.elapsed),
        RECORD_SEPARATOR,
    )
}

/// Append-only text log, flushed after every record
pub struct AppendLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AppendLog {
    /// Open (or create) the log for appending
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "Opened result log");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }
}

impl ResultSink for AppendLog {
    fn append(&mut self, record: &AcceptedRecord) -> SinkResult<()> {
        self.writer
            .write_all(format_record(record).as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|source| SinkError::WriteFailed {
                path: self.path.clone(),
                source,
            })
    }
}

/// Collects records in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AcceptedRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far
    pub fn records(&self) -> Vec<AcceptedRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, record: &AcceptedRecord) -> SinkResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Write the ledger as `<phrase> <metric>` lines, ordered by metric then
/// phrase. Returns the number of lines written.
pub fn write_seed_list(path: &Path, ledger: &ResultLedger) -> SinkResult<usize> {
    let write_err = |source: std::io::Error| SinkError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|source| SinkError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    let entries = ledger.sorted_entries();
    for (metric, phrase) in &entries {
        writeln!(writer, "{} {}", phrase, metric).map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    info!(path = %path.display(), count = entries.len(), "Wrote seed list");
    Ok(entries.len())
}
