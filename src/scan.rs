//! Snapshot scan driver.
//!
//! [`ScanDriver::run`] walks a [`TableSnapshot`] in its canonical order
//! (segments ascending by id, blocks in declared order, rows ascending) and
//! feeds visible rows to a [`RowSink`]. The driver owns every row-level
//! policy the encodings share: visibility filtering, offset skipping, the
//! emission limit, deferred file rotation and cooperative cancellation. The
//! sinks only encode rows and manage files.
//!
//! Visibility is applied before the offset, and the offset before the limit:
//! invisible rows never consume the offset or limit budget, and skipped rows
//! never consume the limit.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ExportError;
use crate::storage::{
    BlockEntry, BlockReader, ColumnVector, SegmentId, TableSnapshot, Timestamp,
    VisibilityProvider, DEFAULT_BLOCK_CAPACITY,
};
use crate::types::{LogicalType, RowId, Value};

/// One output column of an export: either a physical catalog column by
/// index, or one of the synthesized per-row attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelector {
    /// Physical column at this catalog index.
    Column(usize),
    /// Synthesized row identifier (`segment:offset`).
    RowId,
    /// Commit timestamp of the row's insertion.
    CreatedAt,
    /// Commit timestamp of the row's deletion, or a sentinel when live.
    DeletedAt,
}

impl ColumnSelector {
    /// Column name used in headers and JSON keys. Physical columns resolve
    /// their catalog name through the snapshot.
    pub fn output_name<'a>(&self, snapshot: &'a TableSnapshot) -> &'a str {
        match self {
            ColumnSelector::Column(idx) => &snapshot.columns()[*idx].name,
            ColumnSelector::RowId => "_row_id",
            ColumnSelector::CreatedAt => "_create_timestamp",
            ColumnSelector::DeletedAt => "_delete_timestamp",
        }
    }
}

/// Materializes one selected column of one block: a physical fetch through
/// the reader, or synthesis of the virtual row-id / timestamp columns.
///
/// A materialized vector whose length disagrees with the block's row count
/// would silently misalign every later column, so that is treated as a
/// storage-layer defect and panics.
///
/// # Errors
///
/// Propagates reader fetch errors.
pub fn materialize_column<R: BlockReader>(
    reader: &R,
    segment_id: SegmentId,
    block: &BlockEntry,
    selector: &ColumnSelector,
) -> Result<ColumnVector, ExportError> {
    let column = match selector {
        ColumnSelector::Column(idx) => reader.fetch_column(segment_id, block, *idx)?,
        ColumnSelector::RowId => {
            let base = block.block_id as u32 * DEFAULT_BLOCK_CAPACITY as u32;
            let values = (0..block.row_count)
                .map(|i| {
                    Value::RowId(RowId {
                        segment_id,
                        segment_offset: base + i as u32,
                    })
                })
                .collect();
            ColumnVector::new(LogicalType::RowId, values)
        }
        ColumnSelector::CreatedAt => reader.fetch_created_at(segment_id, block)?,
        ColumnSelector::DeletedAt => reader.fetch_deleted_at(segment_id, block)?,
    };
    assert_eq!(
        column.len(),
        block.row_count,
        "column vector length {} disagrees with block row count {} \
         (segment {segment_id}, block {})",
        column.len(),
        block.row_count,
        block.block_id,
    );
    Ok(column)
}

/// Receives the rows of one export, in emission order. One implementation
/// per encoding.
pub trait RowSink {
    /// Writes one row. `columns` holds the current block's materialized
    /// vectors in selector order.
    fn write_row(&mut self, columns: &[ColumnVector], row_idx: usize) -> Result<(), ExportError>;

    /// Switches output to split file number `part` (1-based). Called
    /// between rows, never after the last one.
    fn rotate(&mut self, part: usize) -> Result<(), ExportError>;

    /// Called once per drained block, after its last row.
    fn flush_block(&mut self) -> Result<(), ExportError> {
        Ok(())
    }

    /// Finalizes the current output file. Called exactly once, on both the
    /// exhausted-snapshot and limit-reached paths.
    fn finish(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Outcome of draining one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanFlow {
    Continue,
    Finished,
}

struct ScanState {
    offset_remaining: u64,
    emitted: u64,
    next_part: usize,
    rotate_pending: bool,
}

/// Drives one export over a snapshot. See the module docs for the row
/// policies it owns.
pub struct ScanDriver<'a, R> {
    reader: &'a R,
    snapshot: &'a TableSnapshot,
    read_ts: Timestamp,
    selectors: &'a [ColumnSelector],
    offset: u64,
    limit: u64,
    row_limit: u64,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, R: BlockReader + VisibilityProvider> ScanDriver<'a, R> {
    /// `limit` of 0 means unbounded; `row_limit` of 0 disables splitting.
    pub fn new(
        reader: &'a R,
        snapshot: &'a TableSnapshot,
        read_ts: Timestamp,
        selectors: &'a [ColumnSelector],
        offset: u64,
        limit: u64,
        row_limit: u64,
    ) -> Self {
        Self {
            reader,
            snapshot,
            read_ts,
            selectors,
            offset,
            limit,
            row_limit,
            cancel: None,
        }
    }

    /// Arms cooperative cancellation: the flag is checked before every row
    /// and aborts the export with [`ExportError::Cancelled`].
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the scan to completion, returning the number of emitted rows.
    ///
    /// # Errors
    ///
    /// Propagates reader and sink errors, and [`ExportError::Cancelled`]
    /// when the cancellation flag is raised. The sink's `finish` is not
    /// called on error paths; open files are released by drop.
    pub fn run<S: RowSink>(&self, sink: &mut S) -> Result<u64, ExportError> {
        let mut state = ScanState {
            offset_remaining: self.offset,
            emitted: 0,
            next_part: 0,
            rotate_pending: false,
        };

        'segments: for (segment_id, segment) in self.snapshot.segments() {
            let filter = self.reader.build_filter(segment_id, self.read_ts, segment.base_offset);
            debug!(segment_id, blocks = segment.blocks.len(), "scanning segment");

            for block in &segment.blocks {
                let columns = self
                    .selectors
                    .iter()
                    .map(|sel| materialize_column(self.reader, segment_id, block, sel))
                    .collect::<Result<Vec<_>, _>>()?;
                trace!(
                    segment_id,
                    block_id = block.block_id,
                    rows = block.row_count,
                    "draining block"
                );

                let flow = self.drain_block(&mut state, &filter, block, &columns, sink)?;
                sink.flush_block()?;
                if flow == ScanFlow::Finished {
                    break 'segments;
                }
            }
        }

        sink.finish()?;
        Ok(state.emitted)
    }

    fn drain_block<S: RowSink>(
        &self,
        state: &mut ScanState,
        filter: &crate::storage::DeleteFilter<'_>,
        block: &BlockEntry,
        columns: &[ColumnVector],
        sink: &mut S,
    ) -> Result<ScanFlow, ExportError> {
        for row_idx in 0..block.row_count {
            if let Some(cancel) = self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    return Err(ExportError::Cancelled);
                }
            }

            if !filter.visible(block.segment_offset + row_idx as u32) {
                continue;
            }
            if state.offset_remaining > 0 {
                state.offset_remaining -= 1;
                continue;
            }

            if state.rotate_pending {
                state.rotate_pending = false;
                state.next_part += 1;
                sink.rotate(state.next_part)?;
            }

            sink.write_row(columns, row_idx)?;
            state.emitted += 1;

            // Rotation is deferred to the next written row, so a row count
            // that is an exact multiple of the split size leaves no empty
            // trailing file.
            if self.row_limit != 0 && state.emitted % self.row_limit == 0 {
                state.rotate_pending = true;
            }
            if self.limit != 0 && state.emitted == self.limit {
                return Ok(ScanFlow::Finished);
            }
        }
        Ok(ScanFlow::Continue)
    }
}
