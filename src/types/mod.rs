//! The logical type system of the table engine and its row values.
//!
//! A [`LogicalType`] is the database's semantic column type, distinct from any
//! output encoding's physical type. Scalars map one-to-one onto native types;
//! the vector family (embedding, multi-vector, tensor, tensor array) nests a
//! fixed-width element run zero, one or two list levels deep; sparse vectors
//! carry an index list and an optional value list. The remaining variants
//! exist in the catalog but are not valid export column types.
//!
//! A [`Value`] is one row's interpretation of a column vector slot. It knows
//! how to render itself to text ([`std::fmt::Display`]), to a JSON attribute
//! ([`Value::to_json`]) and, via [`crate::types::lowering`], into an Arrow
//! array builder.

pub mod lowering;

use std::fmt;

use chrono::{DateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Element type of embedding, tensor and sparse columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Single-bit element, stored as booleans.
    Bit,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// IEEE-754 half-precision float. Upcast to 32-bit on every output path.
    Float16,
    /// bfloat16. Upcast to 32-bit on every output path.
    BFloat16,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
}

impl ElementType {
    /// Whether this element type is a signed integer, i.e. valid as the
    /// index type of a sparse column.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElementType::Int8 | ElementType::Int16 | ElementType::Int32 | ElementType::Int64
        )
    }
}

/// Shape of an embedding, multi-vector, tensor or tensor-array column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingInfo {
    /// Element type of the innermost fixed-width vector.
    pub element: ElementType,
    /// Number of elements per vector.
    pub dimension: usize,
}

/// Shape of a sparse vector column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseInfo {
    /// Integer width of the index list.
    pub index_type: ElementType,
    /// Element type of the value list. [`ElementType::Bit`] means the column
    /// stores indices only and the value list is omitted from output.
    pub element: ElementType,
}

/// The database's logical column types.
///
/// Only the scalar, vector-family and sparse variants are exportable; the
/// remaining variants are rejected during sink construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Boolean.
    Boolean,
    /// 8-bit signed integer.
    TinyInt,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInt,
    /// Half-precision float, upcast to 32-bit on output.
    Float16,
    /// bfloat16, upcast to 32-bit on output.
    BFloat16,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Calendar date, stored as days since the Unix epoch.
    Date,
    /// Time of day, stored as seconds since midnight.
    Time,
    /// Point in time, stored as seconds since the Unix epoch.
    Timestamp,
    /// Variable-length text.
    Varchar,
    /// Fixed-width vector.
    Embedding(EmbeddingInfo),
    /// Variable-length run of fixed-width vectors.
    MultiVector(EmbeddingInfo),
    /// Variable-length run of fixed-width vectors (tensor flavor).
    Tensor(EmbeddingInfo),
    /// Variable-length run of tensors.
    TensorArray(EmbeddingInfo),
    /// Sparse vector of (index, value) pairs.
    Sparse(SparseInfo),

    // Catalog-only types. Not valid export column types.
    /// Composite row identifier. Synthesized for the `_row_id` virtual
    /// column, never a physical column type.
    RowId,
    /// Time interval.
    Interval,
    /// 128-bit integer.
    HugeInt,
    /// Fixed-point decimal.
    Decimal,
    /// Generic array.
    Array,
    /// Tuple.
    Tuple,
    /// Geometric point.
    Point,
    /// Geometric line.
    Line,
    /// Geometric line segment.
    LineSegment,
    /// Geometric box.
    Box,
    /// Geometric circle.
    Circle,
    /// UUID.
    Uuid,
    /// Dynamically typed value.
    Mixed,
    /// Null type.
    Null,
    /// Missing value type.
    Missing,
    /// Empty array type.
    EmptyArray,
}

/// One column of the catalog: a name and a logical type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as declared in the catalog.
    pub name: String,
    /// Logical type of the column.
    pub dtype: LogicalType,
}

impl ColumnDef {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, dtype: LogicalType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Composite row identifier: the owning segment and the row's offset within
/// that segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    /// Segment the row lives in.
    pub segment_id: u32,
    /// Row offset within the segment.
    pub segment_offset: u32,
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.segment_offset)
    }
}

/// Element buffer of one fixed-width vector.
///
/// Half-precision and bfloat16 elements are carried as `f32`, matching the
/// upcast applied on every output path.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    /// Bit elements.
    Bit(Vec<bool>),
    /// 8-bit signed elements.
    Int8(Vec<i8>),
    /// 16-bit signed elements.
    Int16(Vec<i16>),
    /// 32-bit signed elements.
    Int32(Vec<i32>),
    /// 64-bit signed elements.
    Int64(Vec<i64>),
    /// 8-bit unsigned elements.
    UInt8(Vec<u8>),
    /// 32-bit float elements (also carries upcast f16/bf16 data).
    Float32(Vec<f32>),
    /// 64-bit float elements.
    Float64(Vec<f64>),
}

impl VectorData {
    /// Number of elements in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            VectorData::Bit(v) => v.len(),
            VectorData::Int8(v) => v.len(),
            VectorData::Int16(v) => v.len(),
            VectorData::Int32(v) => v.len(),
            VectorData::Int64(v) => v.len(),
            VectorData::UInt8(v) => v.len(),
            VectorData::Float32(v) => v.len(),
            VectorData::Float64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_text(&self, out: &mut String) {
        fn join<T: fmt::Display>(out: &mut String, items: &[T]) {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&item.to_string());
            }
        }
        out.push('[');
        match self {
            VectorData::Bit(v) => join(out, v),
            VectorData::Int8(v) => join(out, v),
            VectorData::Int16(v) => join(out, v),
            VectorData::Int32(v) => join(out, v),
            VectorData::Int64(v) => join(out, v),
            VectorData::UInt8(v) => join(out, v),
            VectorData::Float32(v) => join(out, v),
            VectorData::Float64(v) => join(out, v),
        }
        out.push(']');
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            VectorData::Bit(v) => json!(v),
            VectorData::Int8(v) => json!(v),
            VectorData::Int16(v) => json!(v),
            VectorData::Int32(v) => json!(v),
            VectorData::Int64(v) => json!(v),
            VectorData::UInt8(v) => json!(v),
            VectorData::Float32(v) => json!(v),
            VectorData::Float64(v) => json!(v),
        }
    }
}

/// Aligned index/value lists of one sparse vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseData {
    /// Element indices. Always an integer buffer.
    pub indices: VectorData,
    /// Element values, `None` for bit-element sparse columns.
    pub values: Option<VectorData>,
}

/// One row's typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 8-bit signed integer.
    TinyInt(i8),
    /// 16-bit signed integer.
    SmallInt(i16),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    BigInt(i64),
    /// 32-bit float (also carries upcast f16/bf16 scalars).
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Days since the Unix epoch.
    Date(i32),
    /// Seconds since midnight.
    Time(i32),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
    /// Text.
    Varchar(String),
    /// One fixed-width vector.
    Embedding(VectorData),
    /// A run of fixed-width vectors (multi-vector or tensor).
    Tensor(Vec<VectorData>),
    /// A run of tensors.
    TensorArray(Vec<Vec<VectorData>>),
    /// A sparse vector.
    Sparse(SparseData),
    /// A synthesized row identifier.
    RowId(RowId),
}

impl Value {
    /// Whether the value belongs to the nested vector/sparse family. Nested
    /// values are quoted in delimited-text output to protect embedded
    /// delimiters.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            Value::Embedding(_) | Value::Tensor(_) | Value::TensorArray(_) | Value::Sparse(_)
        )
    }

    /// Renders the value as a JSON attribute value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(v) => json!(v),
            Value::TinyInt(v) => json!(v),
            Value::SmallInt(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::BigInt(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::Double(v) => json!(v),
            Value::Date(days) => json!(format_date(*days)),
            Value::Time(seconds) => json!(format_time(*seconds)),
            Value::Timestamp(seconds) => json!(format_timestamp(*seconds)),
            Value::Varchar(v) => json!(v),
            Value::Embedding(data) => data.to_json(),
            Value::Tensor(vectors) => {
                json!(vectors.iter().map(VectorData::to_json).collect::<Vec<_>>())
            }
            Value::TensorArray(tensors) => json!(tensors
                .iter()
                .map(|t| t.iter().map(VectorData::to_json).collect::<Vec<_>>())
                .collect::<Vec<_>>()),
            Value::Sparse(sparse) => {
                let mut object = serde_json::Map::new();
                object.insert("index".to_string(), sparse.indices.to_json());
                if let Some(values) = &sparse.values {
                    object.insert("value".to_string(), values.to_json());
                }
                serde_json::Value::Object(object)
            }
            Value::RowId(row_id) => json!(row_id.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::TinyInt(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Date(days) => f.write_str(&format_date(*days)),
            Value::Time(seconds) => f.write_str(&format_time(*seconds)),
            Value::Timestamp(seconds) => f.write_str(&format_timestamp(*seconds)),
            Value::Varchar(v) => f.write_str(v),
            Value::Embedding(data) => {
                let mut out = String::new();
                data.write_text(&mut out);
                f.write_str(&out)
            }
            Value::Tensor(vectors) => {
                let mut out = String::new();
                write_tensor_text(&mut out, vectors);
                f.write_str(&out)
            }
            Value::TensorArray(tensors) => {
                let mut out = String::new();
                out.push('[');
                for (i, tensor) in tensors.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_tensor_text(&mut out, tensor);
                }
                out.push(']');
                f.write_str(&out)
            }
            Value::Sparse(sparse) => f.write_str(&sparse_text(sparse)),
            Value::RowId(row_id) => write!(f, "{row_id}"),
        }
    }
}

fn write_tensor_text(out: &mut String, vectors: &[VectorData]) {
    out.push('[');
    for (i, vector) in vectors.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        vector.write_text(out);
    }
    out.push(']');
}

/// Canonical sparse text form: `[i1:v1,i2:v2]`, or `[i1,i2]` when the column
/// has no value list.
fn sparse_text(sparse: &SparseData) -> String {
    fn entry(data: &VectorData, i: usize) -> String {
        match data {
            VectorData::Bit(v) => v[i].to_string(),
            VectorData::Int8(v) => v[i].to_string(),
            VectorData::Int16(v) => v[i].to_string(),
            VectorData::Int32(v) => v[i].to_string(),
            VectorData::Int64(v) => v[i].to_string(),
            VectorData::UInt8(v) => v[i].to_string(),
            VectorData::Float32(v) => v[i].to_string(),
            VectorData::Float64(v) => v[i].to_string(),
        }
    }
    let mut out = String::from("[");
    for i in 0..sparse.indices.len() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&entry(&sparse.indices, i));
        if let Some(values) = &sparse.values {
            out.push(':');
            out.push_str(&entry(values, i));
        }
    }
    out.push(']');
    out
}

fn format_date(days: i32) -> String {
    match DateTime::from_timestamp(i64::from(days) * 86_400, 0) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => days.to_string(),
    }
}

fn format_time(seconds: i32) -> String {
    let formatted = u32::try_from(seconds)
        .ok()
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, 0));
    match formatted {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}

fn format_timestamp(seconds: i64) -> String {
    match DateTime::from_timestamp(seconds, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}
