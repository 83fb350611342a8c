//! Delimited-text sink.
//!
//! One line per row, fields joined by the request's delimiter. Nested
//! values (embeddings, tensors, sparse vectors) are wrapped in double
//! quotes so their internal commas stay inside one field. Plain text fields
//! are written unescaped even when they contain the delimiter; consumers of
//! these files rely on that byte layout, so it is preserved as-is.
//!
//! The optional header line is written to the base file only, never to
//! split files.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::error::ExportError;
use crate::export::{open_output, part_path, ExportRequest};
use crate::scan::{ColumnSelector, RowSink};
use crate::storage::{ColumnVector, TableSnapshot};

/// Writes rows as delimited text, one file per split.
pub struct CsvSink {
    base_path: PathBuf,
    writer: BufWriter<File>,
    delimiter: char,
}

impl CsvSink {
    /// Opens the base output file and writes the header line if requested.
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
        let mut writer = open_output(&request.file_path)?;
        if request.header {
            let mut header = String::new();
            for (i, selector) in selectors.iter().enumerate() {
                if i > 0 {
                    header.push(request.delimiter);
                }
                header.push_str(selector.output_name(snapshot));
            }
            header.push('\n');
            writer.write_all(header.as_bytes())?;
        }
        Ok(Self {
            base_path: request.file_path.clone(),
            writer,
            delimiter: request.delimiter,
        })
    }
}

impl RowSink for CsvSink {
    fn write_row(&mut self, columns: &[ColumnVector], row_idx: usize) -> Result<(), ExportError> {
        let mut line = String::new();
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            let value = column.get(row_idx);
            if value.is_nested() {
                let _ = write!(line, "\"{value}\"");
            } else {
                let _ = write!(line, "{value}");
            }
        }
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportFormat;
    use crate::types::{ColumnDef, LogicalType, Value, VectorData};

    fn int_column(values: &[i32]) -> ColumnVector {
        ColumnVector::new(
            LogicalType::Integer,
            values.iter().map(|v| Value::Int(*v)).collect(),
        )
    }

    fn varchar_column(values: &[&str]) -> ColumnVector {
        ColumnVector::new(
            LogicalType::Varchar,
            values.iter().map(|v| Value::Varchar(v.to_string())).collect(),
        )
    }

    fn snapshot_with(columns: Vec<ColumnDef>) -> TableSnapshot {
        TableSnapshot::new(columns, Default::default())
    }

    #[test]
    fn test_csv_rows_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let snapshot = snapshot_with(vec![
            ColumnDef::new("id", LogicalType::Integer),
            ColumnDef::new("name", LogicalType::Varchar),
        ]);
        let selectors = [ColumnSelector::Column(0), ColumnSelector::Column(1)];
        let request = ExportRequest::new(&path, ExportFormat::Csv).with_header(true);

        let mut sink = CsvSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![int_column(&[1, 2]), varchar_column(&["a", "b"])];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,name\n1,a\n2,b\n");
    }

    #[test]
    fn test_nested_values_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let snapshot = snapshot_with(vec![ColumnDef::new("vec", LogicalType::Varchar)]);
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Csv);

        let mut sink = CsvSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            LogicalType::Varchar,
            vec![Value::Embedding(VectorData::Float32(vec![1.0, 2.5]))],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "\"[1,2.5]\"\n");
    }

    #[test]
    fn test_rotation_opens_part_file_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let snapshot = snapshot_with(vec![ColumnDef::new("id", LogicalType::Integer)]);
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Csv).with_header(true);

        let mut sink = CsvSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![int_column(&[1, 2])];
        sink.write_row(&columns, 0).unwrap();
        sink.rotate(1).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id\n1\n");
        let part = std::fs::read_to_string(dir.path().join("out.csv.part1")).unwrap();
        assert_eq!(part, "2\n");
    }

    #[test]
    fn test_custom_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tsv");
        let snapshot = snapshot_with(vec![
            ColumnDef::new("id", LogicalType::Integer),
            ColumnDef::new("name", LogicalType::Varchar),
        ]);
        let selectors = [ColumnSelector::Column(0), ColumnSelector::Column(1)];
        let request = ExportRequest::new(&path, ExportFormat::Csv).with_delimiter('\t');

        let mut sink = CsvSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![int_column(&[7]), varchar_column(&["x"])];
        sink.write_row(&columns, 0).unwrap();
        sink.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "7\tx\n");
    }
}
