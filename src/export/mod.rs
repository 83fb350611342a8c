//! Table export: request types, the orchestrator and the per-encoding sinks.
//!
//! An export materializes a transaction-consistent snapshot of a table into
//! one of four file encodings. Build an [`ExportRequest`], then hand it to
//! [`run_export`] together with the snapshot and the storage collaborators:
//!
//! ```no_run
//! use tableport::export::{run_export, ExportFormat, ExportRequest};
//! use tableport::{BlockReader, ExportError, TableSnapshot, VisibilityProvider};
//!
//! fn export_users<R: BlockReader + VisibilityProvider>(
//!     store: &R,
//!     snapshot: &TableSnapshot,
//! ) -> Result<(), ExportError> {
//!     let request = ExportRequest::new("/data/out/users.csv", ExportFormat::Csv)
//!         .with_header(true)
//!         .with_row_limit(1_000_000);
//!     let summary = run_export(store, snapshot, 42, &request)?;
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```

pub mod csv;
pub mod fvecs;
pub mod jsonl;
pub mod parquet;

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExportError;
use crate::scan::{ColumnSelector, ScanDriver};
use crate::storage::{BlockReader, TableSnapshot, Timestamp, VisibilityProvider};

pub use self::csv::CsvSink;
pub use self::fvecs::FvecsSink;
pub use self::jsonl::JsonlSink;
pub use self::parquet::ParquetSink;

/// Output encoding of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Delimited text, one line per row.
    Csv,
    /// Line-delimited JSON, one object per row.
    Jsonl,
    /// Raw flat-vector binary, one `[dimension][elements]` record per row.
    Fvecs,
    /// Columnar binary via Arrow.
    Parquet,
}

/// A fully-described export job. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Target path of the primary output file.
    pub file_path: PathBuf,
    /// Output encoding.
    pub format: ExportFormat,
    /// Columns to export, in output order. Empty means every catalog
    /// column.
    pub columns: Vec<ColumnSelector>,
    /// Field delimiter for delimited text.
    pub delimiter: char,
    /// Whether delimited text starts with a header line.
    pub header: bool,
    /// Number of visible rows to skip before emitting.
    pub offset: u64,
    /// Maximum number of rows to emit; 0 means unbounded.
    pub limit: u64,
    /// Rows per output file before splitting; 0 disables splitting.
    pub row_limit: u64,
}

impl ExportRequest {
    /// Creates a request with default options: all columns, `,` delimiter,
    /// no header, no offset, no limit, no splitting.
    pub fn new(file_path: impl Into<PathBuf>, format: ExportFormat) -> Self {
        Self {
            file_path: file_path.into(),
            format,
            columns: Vec::new(),
            delimiter: ',',
            header: false,
            offset: 0,
            limit: 0,
            row_limit: 0,
        }
    }

    /// Sets an explicit column selection, in output order.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnSelector>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the field delimiter for delimited text.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Enables or disables the header line for delimited text.
    #[must_use]
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Skips this many visible rows before emitting.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Caps the number of emitted rows; 0 means unbounded.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Splits output after every `row_limit` emitted rows; 0 disables
    /// splitting.
    #[must_use]
    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = row_limit;
        self
    }
}

/// Result of a completed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of rows written across all output files.
    pub row_count: u64,
}

impl ExportSummary {
    /// Human-readable completion message.
    pub fn message(&self) -> String {
        format!("EXPORT {} Rows", self.row_count)
    }
}

/// Resolves the request's column selection against the snapshot's catalog.
/// An empty selection expands to every catalog column in declaration order.
fn resolve_selectors(
    request: &ExportRequest,
    snapshot: &TableSnapshot,
) -> Result<Vec<ColumnSelector>, ExportError> {
    let column_count = snapshot.columns().len();
    if request.columns.is_empty() {
        return Ok((0..column_count).map(ColumnSelector::Column).collect());
    }
    for selector in &request.columns {
        if let ColumnSelector::Column(index) = selector {
            if *index >= column_count {
                return Err(ExportError::InvalidColumn {
                    index: *index,
                    column_count,
                });
            }
        }
    }
    Ok(request.columns.clone())
}

/// Runs an export to completion.
///
/// # Errors
///
/// Returns a recoverable [`ExportError`] for invalid requests, storage
/// faults and I/O failures. Partially written files are left on disk.
pub fn run_export<R: BlockReader + VisibilityProvider>(
    reader: &R,
    snapshot: &TableSnapshot,
    read_ts: Timestamp,
    request: &ExportRequest,
) -> Result<ExportSummary, ExportError> {
    run_export_inner(reader, snapshot, read_ts, request, None)
}

/// Like [`run_export`], with a cooperative cancellation flag checked
/// between rows.
///
/// # Errors
///
/// Same conditions as [`run_export`], plus [`ExportError::Cancelled`] when
/// the flag is raised mid-scan.
pub fn run_export_cancellable<R: BlockReader + VisibilityProvider>(
    reader: &R,
    snapshot: &TableSnapshot,
    read_ts: Timestamp,
    request: &ExportRequest,
    cancel: &AtomicBool,
) -> Result<ExportSummary, ExportError> {
    run_export_inner(reader, snapshot, read_ts, request, Some(cancel))
}

fn run_export_inner<R: BlockReader + VisibilityProvider>(
    reader: &R,
    snapshot: &TableSnapshot,
    read_ts: Timestamp,
    request: &ExportRequest,
    cancel: Option<&AtomicBool>,
) -> Result<ExportSummary, ExportError> {
    let selectors = resolve_selectors(request, snapshot)?;
    let mut driver = ScanDriver::new(
        reader,
        snapshot,
        read_ts,
        &selectors,
        request.offset,
        request.limit,
        request.row_limit,
    );
    if let Some(cancel) = cancel {
        driver = driver.with_cancel_flag(cancel);
    }

    let row_count = match request.format {
        ExportFormat::Csv => {
            let mut sink = CsvSink::create(request, &selectors, snapshot)?;
            driver.run(&mut sink)?
        }
        ExportFormat::Jsonl => {
            let mut sink = JsonlSink::create(request, &selectors, snapshot)?;
            driver.run(&mut sink)?
        }
        ExportFormat::Fvecs => {
            let mut sink = FvecsSink::create(request, &selectors, snapshot)?;
            driver.run(&mut sink)?
        }
        ExportFormat::Parquet => {
            let mut sink = ParquetSink::create(request, &selectors, snapshot)?;
            driver.run(&mut sink)?
        }
    };

    info!(
        path = %request.file_path.display(),
        format = ?request.format,
        row_count,
        "export finished"
    );
    Ok(ExportSummary { row_count })
}

/// Creates the target path's parent directories if missing.
fn create_parent_dir(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| ExportError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Path of split file number `part`: the base path with `.part{N}`
/// appended, keeping the original extension visible.
fn part_path(base: &Path, part: usize) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(format!(".part{part}"));
    PathBuf::from(path)
}

/// Opens (or truncates) an output file behind a buffered writer, creating
/// parent directories first.
fn open_output(path: &Path) -> Result<BufWriter<File>, ExportError> {
    create_parent_dir(path)?;
    Ok(BufWriter::new(File::create(path)?))
}
