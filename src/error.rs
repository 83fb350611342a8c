//! Error types for export operations.
//!
//! Every error in this enum is recoverable from the caller's point of view:
//! the export aborts cleanly, open files are flushed or closed on drop, and
//! the caller may re-issue the whole export. Internal consistency violations
//! (a materialized column vector whose length disagrees with its block, an
//! unreachable type-lowering branch) are defects, not user errors, and panic
//! instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error types for export operations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during export.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The parent directory of the target path could not be created.
    #[error("failed to create output directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Arrow error.
    #[error("Arrow error: {0}")]
    Arrow(String),

    /// Parquet error.
    #[error("Parquet error: {0}")]
    Parquet(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested combination of encoding, columns and types is not
    /// exportable (e.g. a multi-column FVECS export, or a decimal column in
    /// a Parquet export).
    #[error("unsupported export configuration: {message}")]
    Unsupported {
        /// Description of the rejected configuration.
        message: String,
    },

    /// An explicit column index is out of range for the table's catalog.
    #[error("column index {index} out of range for table with {column_count} columns")]
    InvalidColumn {
        /// The offending column index.
        index: usize,
        /// Number of columns the catalog declares.
        column_count: usize,
    },

    /// The export was cancelled through the cooperative cancellation flag.
    #[error("export was cancelled")]
    Cancelled,
}

impl From<arrow::error::ArrowError> for ExportError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ExportError::Arrow(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for ExportError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        ExportError::Parquet(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_error_display() {
        let err = ExportError::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(err.to_string().contains("I/O error"));

        let err = ExportError::Unsupported {
            message: "only one column can be exported as FVECS".to_string(),
        };
        assert!(err.to_string().contains("unsupported export configuration"));

        let err = ExportError::InvalidColumn {
            index: 7,
            column_count: 3,
        };
        assert!(err.to_string().contains("column index 7"));
        assert!(err.to_string().contains("3 columns"));

        let err = ExportError::Cancelled;
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_export_error_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let export_err: ExportError = io_err.into();
        assert!(matches!(export_err, ExportError::Io(_)));
    }

    #[test]
    fn test_export_error_from_arrow_error() {
        let arrow_err = arrow::error::ArrowError::SchemaError("bad schema".to_string());
        let export_err: ExportError = arrow_err.into();
        assert!(matches!(export_err, ExportError::Arrow(_)));
        assert!(export_err.to_string().contains("bad schema"));
    }
}
