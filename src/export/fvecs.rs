//! Raw flat-vector binary sink.
//!
//! The FVECS layout is a bare sequence of records, one per row:
//! a little-endian `i32` dimension followed by `dimension` little-endian
//! `f32` elements. No header, no trailer. The encoding can carry exactly
//! one column, and only a float32 embedding column; anything else is
//! rejected when the sink is created.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::ExportError;
use crate::export::{open_output, part_path, ExportRequest};
use crate::scan::{ColumnSelector, RowSink};
use crate::storage::{ColumnVector, TableSnapshot};
use crate::types::{ElementType, LogicalType, Value, VectorData};

/// Writes float32 embedding rows as raw FVECS records, one file per split.
pub struct FvecsSink {
    base_path: PathBuf,
    writer: BufWriter<File>,
    dimension: usize,
}

impl FvecsSink {
    /// Validates the column selection against the encoding's constraints
    /// and opens the base output file.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Unsupported`] unless the selection is exactly
    /// one physical column of float32 embedding type, and I/O errors from
    /// opening the output file.
    pub fn create(
        request: &ExportRequest,
        selectors: &[ColumnSelector],
        snapshot: &TableSnapshot,
    ) -> Result<Self, ExportError> {
        let [ColumnSelector::Column(index)] = selectors else {
            return Err(ExportError::Unsupported {
                message: "FVECS export requires exactly one physical column".to_string(),
            });
        };
        let column = &snapshot.columns()[*index];
        let LogicalType::Embedding(info) = &column.dtype else {
            return Err(ExportError::Unsupported {
                message: format!(
                    "FVECS export requires an embedding column, got {:?} for column '{}'",
                    column.dtype, column.name
                ),
            });
        };
        if info.element != ElementType::Float32 {
            return Err(ExportError::Unsupported {
                message: format!(
                    "FVECS export requires float32 elements, got {:?} for column '{}'",
                    info.element, column.name
                ),
            });
        }
        Ok(Self {
            base_path: request.file_path.clone(),
            writer: open_output(&request.file_path)?,
            dimension: info.dimension,
        })
    }
}

impl RowSink for FvecsSink {
    fn write_row(&mut self, columns: &[ColumnVector], row_idx: usize) -> Result<(), ExportError> {
        // The selection passed validation, so anything but a float32
        // embedding of the declared dimension here is a storage defect.
        let Value::Embedding(VectorData::Float32(elements)) = columns[0].get(row_idx) else {
            panic!(
                "FVECS sink received a non-embedding value: {:?}",
                columns[0].get(row_idx)
            );
        };
        assert_eq!(
            elements.len(),
            self.dimension,
            "vector length disagrees with declared dimension"
        );

        let dimension = self.dimension as i32;
        self.writer.write_all(&dimension.to_le_bytes())?;
        for element in elements {
            self.writer.write_all(&element.to_le_bytes())?;
        }
        Ok(())
    }

    fn rotate(&mut self, part: usize) -> Result<(), ExportError> {
        self.writer.flush()?;
        self.writer = open_output(&part_path(&self.base_path, part))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}
