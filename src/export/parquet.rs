//! Columnar binary sink (Parquet via Arrow).
//!
//! The Arrow schema comes from the type lowering; each output file gets its
//! own [`ArrowWriter`]. Rows are appended into Arrow builders and flushed as
//! one `RecordBatch` per drained block sub-range, so memory stays bounded by
//! one block regardless of table size.
//!
//! The virtual creation and deletion timestamps export as plain `Int64`
//! fields. The virtual row id has no Arrow lowering and is rejected for
//! this encoding.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::ArrayBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::ExportError;
use crate::export::{create_parent_dir, part_path, ExportRequest};
use crate::scan::{ColumnSelector, RowSink};
use crate::storage::{ColumnVector, TableSnapshot};
use crate::types::lowering::{append_value, lower_field, new_builder};
use crate::types::LogicalType;

/// Writes rows as Parquet, one `ArrowWriter` per output file.
pub struct ParquetSink {
    base_path: PathBuf,
    schema: SchemaRef,
    dtypes: Vec<LogicalType>,
    builders: Vec<Box<dyn ArrayBuilder>>,
    writer: Option<ArrowWriter<File>>,
    buffered: usize,
}

impl ParquetSink {
    /// Lowers the column selection to an Arrow schema and opens the base
    /// output file.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Unsupported`] for column types without an
    /// Arrow lowering and for the virtual row id, and I/O or Parquet errors
    /// from opening the writer.
    pub fn create(
        request: &ExportRequest,
        selectors: &[ColumnSelector],
        snapshot: &TableSnapshot,
    ) -> Result<Self, ExportError> {
        let mut fields = Vec::with_capacity(selectors.len());
        let mut dtypes = Vec::with_capacity(selectors.len());
        for selector in selectors {
            match selector {
                ColumnSelector::Column(index) => {
                    let column = &snapshot.columns()[*index];
                    fields.push(lower_field(&column.name, &column.dtype)?);
                    dtypes.push(column.dtype.clone());
                }
                ColumnSelector::CreatedAt | ColumnSelector::DeletedAt => {
                    fields.push(Field::new(
                        selector.output_name(snapshot),
                        DataType::Int64,
                        true,
                    ));
                    dtypes.push(LogicalType::BigInt);
                }
                ColumnSelector::RowId => {
                    return Err(ExportError::Unsupported {
                        message: "the row id pseudo-column cannot be exported as Parquet"
                            .to_string(),
                    });
                }
            }
        }

        let schema = Arc::new(Schema::new(fields));
        let builders = dtypes.iter().map(new_builder).collect();
        let writer = Self::open_writer(&request.file_path, schema.clone())?;
        Ok(Self {
            base_path: request.file_path.clone(),
            schema,
            dtypes,
            builders,
            writer: Some(writer),
            buffered: 0,
        })
    }

    fn open_writer(path: &std::path::Path, schema: SchemaRef) -> Result<ArrowWriter<File>, ExportError> {
        create_parent_dir(path)?;
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        Ok(ArrowWriter::try_new(file, schema, Some(props))?)
    }

    fn writer_mut(&mut self) -> &mut ArrowWriter<File> {
        match self.writer.as_mut() {
            Some(writer) => writer,
            None => panic!("Parquet sink used after finish"),
        }
    }

    /// Drains the builders into one `RecordBatch` and writes it.
    fn write_pending(&mut self) -> Result<(), ExportError> {
        if self.buffered == 0 {
            return Ok(());
        }
        let arrays = self
            .builders
            .iter_mut()
            .map(|builder| builder.finish())
            .collect();
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        self.writer_mut().write(&batch)?;
        self.buffered = 0;
        Ok(())
    }
}

impl RowSink for ParquetSink {
    fn write_row(&mut self, columns: &[ColumnVector], row_idx: usize) -> Result<(), ExportError> {
        for ((dtype, builder), column) in self.dtypes.iter().zip(&mut self.builders).zip(columns) {
            append_value(dtype, column.get(row_idx), builder.as_mut());
        }
        self.buffered += 1;
        Ok(())
    }

    fn rotate(&mut self, part: usize) -> Result<(), ExportError> {
        self.write_pending()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        let writer = Self::open_writer(&part_path(&self.base_path, part), self.schema.clone())?;
        self.writer = Some(writer);
        Ok(())
    }

    fn flush_block(&mut self) -> Result<(), ExportError> {
        self.write_pending()
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        self.write_pending()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportFormat;
    use crate::types::{ColumnDef, ElementType, EmbeddingInfo, Value, VectorData};
    use arrow::array::{Array, FixedSizeListArray, Float32Array, Int32Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn read_all(path: &std::path::Path) -> Vec<RecordBatch> {
        let file = File::open(path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        reader.map(|batch| batch.unwrap()).collect()
    }

    #[test]
    fn test_parquet_scalar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![
                ColumnDef::new("id", LogicalType::Integer),
                ColumnDef::new("name", LogicalType::Varchar),
            ],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0), ColumnSelector::Column(1)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![
            ColumnVector::new(
                LogicalType::Integer,
                vec![Value::Int(1), Value::Int(2)],
            ),
            ColumnVector::new(
                LogicalType::Varchar,
                vec![
                    Value::Varchar("a".to_string()),
                    Value::Varchar("b".to_string()),
                ],
            ),
        ];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.flush_block().unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        let ids = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(ids.values(), &[1, 2]);
        let names = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(names.value(0), "a");
        assert_eq!(names.value(1), "b");
    }

    #[test]
    fn test_parquet_embedding_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let dtype = LogicalType::Embedding(EmbeddingInfo {
            element: ElementType::Float32,
            dimension: 2,
        });
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("vec", dtype.clone())],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            dtype,
            vec![
                Value::Embedding(VectorData::Float32(vec![1.0, 2.0])),
                Value::Embedding(VectorData::Float32(vec![3.0, 4.0])),
            ],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let lists = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap();
        assert_eq!(lists.len(), 2);
        let values = lists
            .values()
            .as_any()
            .downcast_ref::<Float32Array>()
            .unwrap();
        assert_eq!(values.values(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parquet_temporal_round_trip() {
        use arrow::array::{Date32Array, Time32SecondArray, TimestampSecondArray};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![
                ColumnDef::new("d", LogicalType::Date),
                ColumnDef::new("t", LogicalType::Time),
                ColumnDef::new("ts", LogicalType::Timestamp),
            ],
            Default::default(),
        );
        let selectors = [
            ColumnSelector::Column(0),
            ColumnSelector::Column(1),
            ColumnSelector::Column(2),
        ];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![
            ColumnVector::new(
                LogicalType::Date,
                vec![Value::Date(0), Value::Date(19_723)],
            ),
            ColumnVector::new(
                LogicalType::Time,
                vec![Value::Time(0), Value::Time(3_661)],
            ),
            ColumnVector::new(
                LogicalType::Timestamp,
                vec![Value::Timestamp(0), Value::Timestamp(1_704_067_200)],
            ),
        ];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        let dates = batch
            .column(0)
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();
        assert_eq!(dates.values(), &[0, 19_723]);
        let times = batch
            .column(1)
            .as_any()
            .downcast_ref::<Time32SecondArray>()
            .unwrap();
        assert_eq!(times.values(), &[0, 3_661]);
        let timestamps = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampSecondArray>()
            .unwrap();
        assert_eq!(timestamps.values(), &[0, 1_704_067_200]);
    }

    #[test]
    fn test_parquet_tensor_round_trip() {
        use arrow::array::{Int32Array, ListArray};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let dtype = LogicalType::Tensor(EmbeddingInfo {
            element: ElementType::Int32,
            dimension: 2,
        });
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("tensor", dtype.clone())],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            dtype,
            vec![
                Value::Tensor(vec![
                    VectorData::Int32(vec![1, 2]),
                    VectorData::Int32(vec![3, 4]),
                ]),
                Value::Tensor(vec![VectorData::Int32(vec![5, 6])]),
            ],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let lists = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists.value(0).len(), 2);
        assert_eq!(lists.value(1).len(), 1);
        let vectors = lists
            .values()
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap();
        let elements = vectors
            .values()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap();
        assert_eq!(elements.values(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_parquet_tensor_array_round_trip() {
        use arrow::array::ListArray;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let dtype = LogicalType::TensorArray(EmbeddingInfo {
            element: ElementType::Float32,
            dimension: 2,
        });
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("tensors", dtype.clone())],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            dtype,
            vec![Value::TensorArray(vec![
                vec![VectorData::Float32(vec![1.0, 2.0])],
                vec![
                    VectorData::Float32(vec![3.0, 4.0]),
                    VectorData::Float32(vec![5.0, 6.0]),
                ],
            ])],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let outer = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        assert_eq!(outer.len(), 1);
        let tensors = outer.value(0);
        let tensors = tensors.as_any().downcast_ref::<ListArray>().unwrap();
        assert_eq!(tensors.len(), 2);
        assert_eq!(tensors.value(0).len(), 1);
        assert_eq!(tensors.value(1).len(), 2);
    }

    #[test]
    fn test_parquet_sparse_round_trip() {
        use arrow::array::{Int32Array, ListArray, StructArray};
        use crate::types::{SparseData, SparseInfo};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let dtype = LogicalType::Sparse(SparseInfo {
            index_type: ElementType::Int32,
            element: ElementType::Float32,
        });
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("sparse", dtype.clone())],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            dtype,
            vec![Value::Sparse(SparseData {
                indices: VectorData::Int32(vec![2, 7]),
                values: Some(VectorData::Float32(vec![1.5, 2.5])),
            })],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.finish().unwrap();

        let batches = read_all(&path);
        assert_eq!(batches.len(), 1);
        let structs = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<StructArray>()
            .unwrap();
        assert_eq!(structs.len(), 1);
        let index_list = structs
            .column(0)
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        let indices = index_list.value(0);
        let indices = indices.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(indices.values(), &[2, 7]);
        let value_list = structs
            .column(1)
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        let values = value_list.value(0);
        let values = values.as_any().downcast_ref::<Float32Array>().unwrap();
        assert_eq!(values.values(), &[1.5, 2.5]);
    }

    #[test]
    fn test_parquet_rejects_row_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("id", LogicalType::Integer)],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0), ColumnSelector::RowId];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let err = ParquetSink::create(&request, &selectors, &snapshot).err().unwrap();
        assert!(matches!(err, ExportError::Unsupported { .. }));
        assert!(err.to_string().contains("row id"));
    }

    #[test]
    fn test_parquet_rejects_unsupported_column_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("d", LogicalType::Decimal)],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let err = ParquetSink::create(&request, &selectors, &snapshot).err().unwrap();
        assert!(matches!(err, ExportError::Unsupported { .. }));
    }

    #[test]
    fn test_parquet_rotation_writes_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("id", LogicalType::Integer)],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0)];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let mut sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let columns = vec![ColumnVector::new(
            LogicalType::Integer,
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        )];
        sink.write_row(&columns, 0).unwrap();
        sink.write_row(&columns, 1).unwrap();
        sink.rotate(1).unwrap();
        sink.write_row(&columns, 2).unwrap();
        sink.finish().unwrap();

        let base_rows: usize = read_all(&path).iter().map(|b| b.num_rows()).sum();
        assert_eq!(base_rows, 2);
        let part_rows: usize = read_all(&dir.path().join("out.parquet.part1"))
            .iter()
            .map(|b| b.num_rows())
            .sum();
        assert_eq!(part_rows, 1);
    }

    #[test]
    fn test_virtual_timestamps_export_as_int64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        let snapshot = TableSnapshot::new(
            vec![ColumnDef::new("id", LogicalType::Integer)],
            Default::default(),
        );
        let selectors = [ColumnSelector::Column(0), ColumnSelector::CreatedAt];
        let request = ExportRequest::new(&path, ExportFormat::Parquet);

        let sink = ParquetSink::create(&request, &selectors, &snapshot).unwrap();
        let schema = sink.schema.clone();
        assert_eq!(schema.field(1).name(), "_create_timestamp");
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
    }
}
