//! Line-delimited JSON sink.
//!
//! One JSON object per row, keys in selector order (`serde_json` is built
//! with `preserve_order`, so insertion order survives serialization).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde_json::Map;

use crate::error::ExportError;
use crate::export::{open_output, part_path, ExportRequest};
use crate::scan::{ColumnSelector, RowSink};
use crate::storage::{ColumnVector, TableSnapshot};

/// Writes rows as line-delimited JSON, one file per split.
pub struct JsonlSink {
    base_path: PathBuf,
    writer: BufWriter<File>,
    keys: Vec<String>,
}

impl JsonlSink {
    /// Opens the base output file and resolves the object keys.
    ///
    /// # Errors
    ///
    /// Fails when the output directory cannot be created or the file cannot
    /// be opened.
    pub fn create(
        request: &ExportRequest,
        selectors: &[ColumnSelector],
        snapshot: &TableSnapshot,
    ) -> Result<Self, ExportError> {
        let keys = selectors
            .iter()
            .map(|sel| sel.output_name(snapshot).to_string())
            .collect();
        Ok(Self {
            base_path: request.file_path.clone(),
            writer: open_output(&request.file_path)?,
            keys,
        })
    }
}

impl RowSink for JsonlSink {
    fn write_row(&mut self, columns: &[ColumnVector], row_idx: usize) -> Result<(), ExportError> {
        let mut object = Map::with_capacity(self.keys.len());
        for (key, column) in self.keys.iter().zip(columns) {
            object.insert(key.clone(), column.get(row_idx).to_json());
        }
        serde_json::to_writer(&mut self.writer, &object)?;
        self.writer.write_all(b"\n")?;
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
