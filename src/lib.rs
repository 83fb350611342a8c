//! # tableport
//!
//! Snapshot-consistent table export for a multi-model database: materializes
//! a transaction-consistent view of a table into CSV, line-delimited JSON,
//! raw flat-vector binary (FVECS) or Parquet files.
//!
//! ## Features
//!
//! - Sequential snapshot scan in canonical order (segments ascending,
//!   blocks in declared order, rows ascending), reproducible for a fixed
//!   snapshot
//! - MVCC row visibility under a read timestamp, applied before offset and
//!   limit so invisible rows never consume either budget
//! - File splitting after every `row_limit` rows, with rotation deferred to
//!   the next written row so no empty trailing file is created
//! - Virtual `_row_id`, `_create_timestamp` and `_delete_timestamp` columns
//! - A recursive logical-to-Arrow type lowering covering scalars, the
//!   embedding/tensor vector family and sparse vectors
//! - Cooperative cancellation between rows
//!
//! ## Quick start
//!
//! ```no_run
//! use tableport::export::{run_export, ExportFormat, ExportRequest};
//! use tableport::{BlockReader, ExportError, TableSnapshot, VisibilityProvider};
//!
//! fn export_table<R: BlockReader + VisibilityProvider>(
//!     store: &R,
//!     snapshot: &TableSnapshot,
//!     read_ts: u64,
//! ) -> Result<(), ExportError> {
//!     let request = ExportRequest::new("/data/out/table.parquet", ExportFormat::Parquet)
//!         .with_limit(1_000_000);
//!     let summary = run_export(store, snapshot, read_ts, &request)?;
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```
//!
//! Storage integration happens through two traits: [`BlockReader`] fetches
//! one column of one block at a time, and [`VisibilityProvider`] answers
//! row visibility per segment. The crate never holds more than one block's
//! worth of column data at once.

pub mod error;
pub mod export;
pub mod scan;
pub mod storage;
pub mod types;

pub use error::ExportError;
pub use export::{
    run_export, run_export_cancellable, ExportFormat, ExportRequest, ExportSummary,
};
pub use scan::{ColumnSelector, RowSink, ScanDriver};
pub use storage::{
    BlockEntry, BlockId, BlockReader, ColumnVector, DeleteFilter, SegmentId, SegmentSnapshot,
    TableSnapshot, Timestamp, VisibilityProvider, DEFAULT_BLOCK_CAPACITY,
};
pub use types::{
    ColumnDef, ElementType, EmbeddingInfo, LogicalType, RowId, SparseData, SparseInfo, Value,
    VectorData,
};
