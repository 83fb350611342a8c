//! Lowering from logical column types to Arrow physical types.
//!
//! Two mappings live here, both total over the exportable subset of
//! [`LogicalType`]:
//!
//! - [`lower_type`] / [`lower_field`] map a logical type to the Arrow
//!   [`DataType`] used in columnar-binary schemas,
//! - [`new_builder`] and [`append_value`] map it to a stateful Arrow array
//!   builder and a per-value append routine.
//!
//! The vector family is one recursive case: an embedding lowers to a
//! fixed-size list of its element scalar; multi-vector and tensor wrap that
//! in one variable-length list; tensor-array wraps it in two. Sparse columns
//! lower to a struct of an `index` list and, unless the element type is
//! single-bit, a `value` list.
//!
//! [`lower_type`] rejects non-exportable logical types with a recoverable
//! configuration error; it runs before any file is opened. [`new_builder`]
//! and [`append_value`] run only on types that passed that validation, so a
//! non-exportable type or a value whose runtime shape disagrees with the
//! builder's declared nesting is an internal fault and panics.

use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, BooleanBuilder, Date32Builder, FixedSizeListBuilder, Float32Builder,
    Float64Builder, Int16Builder, Int32Builder, Int64Builder, Int8Builder, ListBuilder,
    StringBuilder, StructBuilder, Time32SecondBuilder, TimestampSecondBuilder, UInt8Builder,
};
use arrow::datatypes::{DataType, Field, Fields, TimeUnit};

use crate::error::ExportError;
use crate::types::{ElementType, EmbeddingInfo, LogicalType, SparseData, Value, VectorData};

/// Arrow scalar type of a vector element. 16-bit float formats are upcast to
/// 32-bit.
fn element_data_type(element: ElementType) -> DataType {
    match element {
        ElementType::Bit => DataType::Boolean,
        ElementType::Int8 => DataType::Int8,
        ElementType::Int16 => DataType::Int16,
        ElementType::Int32 => DataType::Int32,
        ElementType::Int64 => DataType::Int64,
        ElementType::UInt8 => DataType::UInt8,
        ElementType::Float16 | ElementType::BFloat16 | ElementType::Float32 => DataType::Float32,
        ElementType::Float64 => DataType::Float64,
    }
}

fn list_of(inner: DataType) -> DataType {
    DataType::List(Arc::new(Field::new_list_field(inner, true)))
}

/// Extra list-nesting depth of a vector-family type: 0 for embeddings, 1 for
/// multi-vectors and tensors, 2 for tensor arrays.
fn vector_nesting(dtype: &LogicalType) -> usize {
    match dtype {
        LogicalType::Embedding(_) => 0,
        LogicalType::MultiVector(_) | LogicalType::Tensor(_) => 1,
        LogicalType::TensorArray(_) => 2,
        _ => unreachable!("not a vector-family type: {dtype:?}"),
    }
}

fn embedding_data_type(info: &EmbeddingInfo) -> DataType {
    DataType::FixedSizeList(
        Arc::new(Field::new_list_field(element_data_type(info.element), true)),
        info.dimension as i32,
    )
}

/// Struct fields of a lowered sparse column. Assumes the index type already
/// passed [`lower_type`] validation.
fn sparse_struct_fields(info: &crate::types::SparseInfo) -> Fields {
    let mut fields = vec![Field::new(
        "index",
        list_of(element_data_type(info.index_type)),
        true,
    )];
    if info.element != ElementType::Bit {
        fields.push(Field::new(
            "value",
            list_of(element_data_type(info.element)),
            true,
        ));
    }
    Fields::from(fields)
}

/// Maps a logical column type to the Arrow type used in columnar output.
///
/// # Errors
///
/// Returns [`ExportError::Unsupported`] for logical types that are not valid
/// export column types (row-id, interval, decimal, geometric types, ...), and
/// for sparse columns whose declared index type is not a signed integer.
pub fn lower_type(dtype: &LogicalType) -> Result<DataType, ExportError> {
    match dtype {
        LogicalType::Boolean => Ok(DataType::Boolean),
        LogicalType::TinyInt => Ok(DataType::Int8),
        LogicalType::SmallInt => Ok(DataType::Int16),
        LogicalType::Integer => Ok(DataType::Int32),
        LogicalType::BigInt => Ok(DataType::Int64),
        LogicalType::Float16 | LogicalType::BFloat16 | LogicalType::Float => Ok(DataType::Float32),
        LogicalType::Double => Ok(DataType::Float64),
        LogicalType::Date => Ok(DataType::Date32),
        LogicalType::Time => Ok(DataType::Time32(TimeUnit::Second)),
        LogicalType::Timestamp => Ok(DataType::Timestamp(TimeUnit::Second, None)),
        LogicalType::Varchar => Ok(DataType::Utf8),
        LogicalType::Embedding(info)
        | LogicalType::MultiVector(info)
        | LogicalType::Tensor(info)
        | LogicalType::TensorArray(info) => {
            let mut lowered = embedding_data_type(info);
            for _ in 0..vector_nesting(dtype) {
                lowered = list_of(lowered);
            }
            Ok(lowered)
        }
        LogicalType::Sparse(info) => {
            if !info.index_type.is_integer() {
                return Err(ExportError::Unsupported {
                    message: format!(
                        "sparse index type {:?} is not an integer type",
                        info.index_type
                    ),
                });
            }
            Ok(DataType::Struct(sparse_struct_fields(info)))
        }
        LogicalType::RowId
        | LogicalType::Interval
        | LogicalType::HugeInt
        | LogicalType::Decimal
        | LogicalType::Array
        | LogicalType::Tuple
        | LogicalType::Point
        | LogicalType::Line
        | LogicalType::LineSegment
        | LogicalType::Box
        | LogicalType::Circle
        | LogicalType::Uuid
        | LogicalType::Mixed
        | LogicalType::Null
        | LogicalType::Missing
        | LogicalType::EmptyArray => Err(ExportError::Unsupported {
            message: format!("{dtype:?} is not a valid export column type"),
        }),
    }
}

/// Maps a named column to an Arrow schema field.
///
/// # Errors
///
/// Same conditions as [`lower_type`].
pub fn lower_field(name: &str, dtype: &LogicalType) -> Result<Field, ExportError> {
    Ok(Field::new(name, lower_type(dtype)?, true))
}

fn element_builder(element: ElementType) -> Box<dyn ArrayBuilder> {
    match element {
        ElementType::Bit => Box::new(BooleanBuilder::new()),
        ElementType::Int8 => Box::new(Int8Builder::new()),
        ElementType::Int16 => Box::new(Int16Builder::new()),
        ElementType::Int32 => Box::new(Int32Builder::new()),
        ElementType::Int64 => Box::new(Int64Builder::new()),
        ElementType::UInt8 => Box::new(UInt8Builder::new()),
        ElementType::Float16 | ElementType::BFloat16 | ElementType::Float32 => {
            Box::new(Float32Builder::new())
        }
        ElementType::Float64 => Box::new(Float64Builder::new()),
    }
}

/// Creates the stateful Arrow builder for one column of the given logical
/// type. Must only be called for types accepted by [`lower_type`]; a
/// non-exportable type here is an internal fault.
pub fn new_builder(dtype: &LogicalType) -> Box<dyn ArrayBuilder> {
    match dtype {
        LogicalType::Boolean => Box::new(BooleanBuilder::new()),
        LogicalType::TinyInt => Box::new(Int8Builder::new()),
        LogicalType::SmallInt => Box::new(Int16Builder::new()),
        LogicalType::Integer => Box::new(Int32Builder::new()),
        LogicalType::BigInt => Box::new(Int64Builder::new()),
        LogicalType::Float16 | LogicalType::BFloat16 | LogicalType::Float => {
            Box::new(Float32Builder::new())
        }
        LogicalType::Double => Box::new(Float64Builder::new()),
        LogicalType::Date => Box::new(Date32Builder::new()),
        LogicalType::Time => Box::new(Time32SecondBuilder::new()),
        LogicalType::Timestamp => Box::new(TimestampSecondBuilder::new()),
        LogicalType::Varchar => Box::new(StringBuilder::new()),
        LogicalType::Embedding(info)
        | LogicalType::MultiVector(info)
        | LogicalType::Tensor(info)
        | LogicalType::TensorArray(info) => {
            let fixed = FixedSizeListBuilder::new(element_builder(info.element), {
                i32::try_from(info.dimension)
                    .unwrap_or_else(|_| panic!("embedding dimension {} overflows", info.dimension))
            });
            let mut builder: Box<dyn ArrayBuilder> = Box::new(fixed);
            for _ in 0..vector_nesting(dtype) {
                builder = Box::new(ListBuilder::new(builder));
            }
            builder
        }
        LogicalType::Sparse(info) => {
            assert!(
                info.index_type.is_integer(),
                "sparse index type {:?} reached builder construction",
                info.index_type
            );
            let mut field_builders: Vec<Box<dyn ArrayBuilder>> =
                vec![Box::new(ListBuilder::new(element_builder(info.index_type)))];
            if info.element != ElementType::Bit {
                field_builders.push(Box::new(ListBuilder::new(element_builder(info.element))));
            }
            Box::new(StructBuilder::new(
                sparse_struct_fields(info),
                field_builders,
            ))
        }
        _ => panic!("non-exportable logical type {dtype:?} reached builder construction"),
    }
}

fn downcast<T: ArrayBuilder>(builder: &mut dyn ArrayBuilder) -> &mut T {
    match builder.as_any_mut().downcast_mut::<T>() {
        Some(builder) => builder,
        None => panic!("array builder does not match the lowered column type"),
    }
}

/// Appends one vector's elements into the innermost element builder,
/// checking the buffer against the declared element type.
fn append_elements(declared: ElementType, data: &VectorData, builder: &mut dyn ArrayBuilder) {
    match (data, declared) {
        (VectorData::Bit(v), ElementType::Bit) => {
            downcast::<BooleanBuilder>(builder).append_slice(v);
        }
        (VectorData::Int8(v), ElementType::Int8) => {
            downcast::<Int8Builder>(builder).append_slice(v);
        }
        (VectorData::Int16(v), ElementType::Int16) => {
            downcast::<Int16Builder>(builder).append_slice(v);
        }
        (VectorData::Int32(v), ElementType::Int32) => {
            downcast::<Int32Builder>(builder).append_slice(v);
        }
        (VectorData::Int64(v), ElementType::Int64) => {
            downcast::<Int64Builder>(builder).append_slice(v);
        }
        (VectorData::UInt8(v), ElementType::UInt8) => {
            downcast::<UInt8Builder>(builder).append_slice(v);
        }
        (
            VectorData::Float32(v),
            ElementType::Float16 | ElementType::BFloat16 | ElementType::Float32,
        ) => {
            downcast::<Float32Builder>(builder).append_slice(v);
        }
        (VectorData::Float64(v), ElementType::Float64) => {
            downcast::<Float64Builder>(builder).append_slice(v);
        }
        (data, declared) => {
            panic!("element buffer {data:?} does not match declared element type {declared:?}")
        }
    }
}

/// Appends one fixed-width vector, enforcing the declared dimension.
fn append_embedding(info: &EmbeddingInfo, data: &VectorData, builder: &mut dyn ArrayBuilder) {
    assert_eq!(
        data.len(),
        info.dimension,
        "vector length disagrees with declared dimension"
    );
    let fixed = downcast::<FixedSizeListBuilder<Box<dyn ArrayBuilder>>>(builder);
    append_elements(info.element, data, fixed.values().as_mut());
    fixed.append(true);
}

fn append_tensor(info: &EmbeddingInfo, vectors: &[VectorData], builder: &mut dyn ArrayBuilder) {
    let list = downcast::<ListBuilder<Box<dyn ArrayBuilder>>>(builder);
    for vector in vectors {
        append_embedding(info, vector, list.values().as_mut());
    }
    list.append(true);
}

fn append_sparse(
    info: &crate::types::SparseInfo,
    sparse: &SparseData,
    builder: &mut dyn ArrayBuilder,
) {
    let builder = downcast::<StructBuilder>(builder);
    {
        let index_list = builder
            .field_builder::<ListBuilder<Box<dyn ArrayBuilder>>>(0)
            .unwrap_or_else(|| panic!("sparse struct builder is missing its index list"));
        append_elements(info.index_type, &sparse.indices, index_list.values().as_mut());
        index_list.append(true);
    }
    if info.element != ElementType::Bit {
        let values = sparse
            .values
            .as_ref()
            .unwrap_or_else(|| panic!("sparse value buffer missing for element type {:?}", info.element));
        assert_eq!(
            values.len(),
            sparse.indices.len(),
            "sparse index and value lists are not aligned"
        );
        let value_list = builder
            .field_builder::<ListBuilder<Box<dyn ArrayBuilder>>>(1)
            .unwrap_or_else(|| panic!("sparse struct builder is missing its value list"));
        append_elements(info.element, values, value_list.values().as_mut());
        value_list.append(true);
    }
    builder.append(true);
}

/// Appends one value into a builder created by [`new_builder`] for the same
/// logical type. A value whose runtime shape disagrees with the builder's
/// declared nesting is an internal fault and panics.
pub fn append_value(dtype: &LogicalType, value: &Value, builder: &mut dyn ArrayBuilder) {
    match (dtype, value) {
        (LogicalType::Boolean, Value::Bool(v)) => {
            downcast::<BooleanBuilder>(builder).append_value(*v);
        }
        (LogicalType::TinyInt, Value::TinyInt(v)) => {
            downcast::<Int8Builder>(builder).append_value(*v);
        }
        (LogicalType::SmallInt, Value::SmallInt(v)) => {
            downcast::<Int16Builder>(builder).append_value(*v);
        }
        (LogicalType::Integer, Value::Int(v)) => {
            downcast::<Int32Builder>(builder).append_value(*v);
        }
        (LogicalType::BigInt, Value::BigInt(v)) => {
            downcast::<Int64Builder>(builder).append_value(*v);
        }
        (LogicalType::Float16 | LogicalType::BFloat16 | LogicalType::Float, Value::Float(v)) => {
            downcast::<Float32Builder>(builder).append_value(*v);
        }
        (LogicalType::Double, Value::Double(v)) => {
            downcast::<Float64Builder>(builder).append_value(*v);
        }
        (LogicalType::Date, Value::Date(v)) => {
            downcast::<Date32Builder>(builder).append_value(*v);
        }
        (LogicalType::Time, Value::Time(v)) => {
            downcast::<Time32SecondBuilder>(builder).append_value(*v);
        }
        (LogicalType::Timestamp, Value::Timestamp(v)) => {
            downcast::<TimestampSecondBuilder>(builder).append_value(*v);
        }
        (LogicalType::Varchar, Value::Varchar(v)) => {
            downcast::<StringBuilder>(builder).append_value(v);
        }
        (LogicalType::Embedding(info), Value::Embedding(data)) => {
            append_embedding(info, data, builder);
        }
        (LogicalType::MultiVector(info) | LogicalType::Tensor(info), Value::Tensor(vectors)) => {
            append_tensor(info, vectors, builder);
        }
        (LogicalType::TensorArray(info), Value::TensorArray(tensors)) => {
            let list = downcast::<ListBuilder<Box<dyn ArrayBuilder>>>(builder);
            for tensor in tensors {
                append_tensor(info, tensor, list.values().as_mut());
            }
            list.append(true);
        }
        (LogicalType::Sparse(info), Value::Sparse(sparse)) => {
            append_sparse(info, sparse, builder);
        }
        (dtype, value) => {
            panic!("value {value:?} does not match the lowered column type {dtype:?}")
        }
    }
}
