//! Storage-facing data model and collaborator traits.
//!
//! The export engine never owns table data. It walks a [`TableSnapshot`] (a
//! frozen view of segment and block metadata taken at a read timestamp) and
//! pulls one column of one block at a time through [`BlockReader`]. Row
//! visibility under that timestamp is answered by a [`DeleteFilter`] obtained
//! from [`VisibilityProvider`] once per segment.

use std::collections::BTreeMap;

use crate::error::ExportError;
use crate::types::{ColumnDef, LogicalType, Value};

/// Identifier of a segment within a table.
pub type SegmentId = u32;

/// Identifier of a block within a segment.
pub type BlockId = u16;

/// Logical commit timestamp.
pub type Timestamp = u64;

/// Rows per block in the default storage layout. Row ids are synthesized
/// from this stride.
pub const DEFAULT_BLOCK_CAPACITY: usize = 8192;

/// Metadata of one block inside a segment snapshot. The block's data stays
/// in the storage layer and is fetched on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Block id within the owning segment.
    pub block_id: BlockId,
    /// Offset of the block's first row within the segment.
    pub segment_offset: u32,
    /// Number of rows stored in this block.
    pub row_count: usize,
}

/// Frozen per-segment metadata.
#[derive(Debug, Clone, Default)]
pub struct SegmentSnapshot {
    /// Offset of the segment's first row within the table.
    pub base_offset: u64,
    /// Blocks in scan order.
    pub blocks: Vec<BlockEntry>,
}

/// Immutable view of a table at a read timestamp: the column catalog plus
/// the segment/block layout. Segment iteration is ascending by id.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    columns: Vec<ColumnDef>,
    segments: BTreeMap<SegmentId, SegmentSnapshot>,
}

impl TableSnapshot {
    pub fn new(columns: Vec<ColumnDef>, segments: BTreeMap<SegmentId, SegmentSnapshot>) -> Self {
        Self { columns, segments }
    }

    /// Column catalog in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Segments in ascending id order.
    pub fn segments(&self) -> impl Iterator<Item = (SegmentId, &SegmentSnapshot)> {
        self.segments.iter().map(|(id, seg)| (*id, seg))
    }

    /// Total row count across all blocks, before visibility filtering.
    pub fn stored_row_count(&self) -> usize {
        self.segments
            .values()
            .flat_map(|seg| &seg.blocks)
            .map(|block| block.row_count)
            .sum()
    }
}

/// One column of one block, materialized for the export. Read-only and
/// discarded after the block has been drained.
#[derive(Debug, Clone)]
pub struct ColumnVector {
    dtype: LogicalType,
    values: Vec<Value>,
}

impl ColumnVector {
    pub fn new(dtype: LogicalType, values: Vec<Value>) -> Self {
        Self { dtype, values }
    }

    pub fn dtype(&self) -> &LogicalType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a row index within the block.
    pub fn get(&self, row_idx: usize) -> &Value {
        &self.values[row_idx]
    }
}

/// Access to block-resident column data. Implemented by the storage paging
/// layer; fetches are per (segment, block, column) and may fault pages in.
pub trait BlockReader {
    /// Fetches one user column of one block.
    fn fetch_column(
        &self,
        segment_id: SegmentId,
        block: &BlockEntry,
        column_id: usize,
    ) -> Result<ColumnVector, ExportError>;

    /// Fetches the per-row creation timestamps of one block as a
    /// [`LogicalType::BigInt`] vector.
    fn fetch_created_at(
        &self,
        segment_id: SegmentId,
        block: &BlockEntry,
    ) -> Result<ColumnVector, ExportError>;

    /// Fetches the per-row deletion timestamps of one block as a
    /// [`LogicalType::BigInt`] vector.
    fn fetch_deleted_at(
        &self,
        segment_id: SegmentId,
        block: &BlockEntry,
    ) -> Result<ColumnVector, ExportError>;
}

/// Per-segment row visibility under a read timestamp. Built once per
/// segment and then consulted per row; the closure captures whatever
/// delete-bitmap state the provider needs.
pub struct DeleteFilter<'a> {
    predicate: Box<dyn Fn(u32) -> bool + 'a>,
}

impl<'a> DeleteFilter<'a> {
    pub fn new(predicate: impl Fn(u32) -> bool + 'a) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }

    /// A filter under which every row is visible.
    pub fn all_visible() -> Self {
        Self::new(|_| true)
    }

    /// Whether the row at this segment-relative offset is visible.
    pub fn visible(&self, segment_offset: u32) -> bool {
        (self.predicate)(segment_offset)
    }
}

impl std::fmt::Debug for DeleteFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeleteFilter")
    }
}

/// The visibility subsystem: turns a segment id and a read timestamp into a
/// row-level predicate.
pub trait VisibilityProvider {
    fn build_filter(
        &self,
        segment_id: SegmentId,
        read_ts: Timestamp,
        base_offset: u64,
    ) -> DeleteFilter<'_>;
}
