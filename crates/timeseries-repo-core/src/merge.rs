//! Merge-on-write for unversioned datasets.
//!
//! Writing to a NONE-versioned dataset does not replace it. The existing rows
//! and the new rows are stacked, rows sharing a temporal key keep the newest
//! values, and the result is sorted by that key:
//!
//! 1. normalise both sides (UTC nanosecond dates, `Float64` series);
//! 2. stack them over the union of their columns;
//! 3. take the key as the date columns present on both sides;
//! 4. keep the last row for each key;
//! 5. sort ascending by the key.
//!
//! AS_OF and NAMES datasets never merge; a repeated marker overwrites its
//! snapshot wholesale.

use std::collections::HashMap;

use arrow::{
    array::{Array, ArrayRef, AsArray, RecordBatch, UInt32Array},
    compute::take,
    datatypes::TimestampNanosecondType,
};
use log::debug;
use snafu::prelude::*;

use crate::frame::{self, FrameError};

/// Errors from merging two versions of a dataset.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MergeError {
    /// Normalising or stacking the inputs failed.
    #[snafu(display("Cannot combine rows: {source}"))]
    Combine {
        /// Underlying frame error.
        source: FrameError,
    },

    /// The two sides share no date column to key rows by.
    #[snafu(display("No common date column among {expected:?}"))]
    NoTemporalKey {
        /// Date columns the dataset type declares.
        expected: Vec<String>,
    },

    /// Reordering rows failed.
    #[snafu(display("Cannot reorder rows: {source}"))]
    Reorder {
        /// Underlying Arrow error.
        source: arrow::error::ArrowError,
    },
}

/// Merge `new` into `old` keyed by `date_columns`.
///
/// `old` may be [`frame::empty_batch`] when nothing is persisted yet. When
/// the dataset type has no date columns at all, `new` replaces `old`.
pub fn merge_data(
    old: &RecordBatch,
    new: &RecordBatch,
    date_columns: &[&str],
) -> Result<RecordBatch, MergeError> {
    let new = frame::normalize(new, date_columns).context(CombineSnafu)?;
    if date_columns.is_empty() {
        return Ok(new);
    }
    let old = frame::normalize(old, date_columns).context(CombineSnafu)?;

    let has = |batch: &RecordBatch, col: &str| batch.schema().index_of(col).is_ok();
    let key: Vec<&str> = date_columns
        .iter()
        .copied()
        .filter(|c| has(&new, *c) && (frame::is_empty_frame(&old) || has(&old, *c)))
        .collect();
    ensure!(
        !key.is_empty(),
        NoTemporalKeySnafu {
            expected: date_columns.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        }
    );

    let combined = frame::concat_diagonal(&[old, new]).context(CombineSnafu)?;
    let deduped = dedup_sorted(&combined, &key)?;
    debug!(
        "merged {} stacked rows into {} on key {key:?}",
        combined.num_rows(),
        deduped.num_rows()
    );
    Ok(deduped)
}

type RowKey = Vec<Option<i64>>;

fn dedup_sorted(batch: &RecordBatch, key: &[&str]) -> Result<RecordBatch, MergeError> {
    let mut key_arrays = Vec::with_capacity(key.len());
    for name in key {
        let Some(values) = batch
            .column_by_name(name)
            .and_then(|c| c.as_primitive_opt::<TimestampNanosecondType>())
        else {
            return NoTemporalKeySnafu {
                expected: key.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            }
            .fail();
        };
        key_arrays.push(values);
    }

    let mut last: HashMap<RowKey, u32> = HashMap::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let row_key: RowKey = key_arrays
            .iter()
            .map(|a| a.is_valid(row).then(|| a.value(row)))
            .collect();
        last.insert(row_key, row as u32);
    }

    let mut rows: Vec<(RowKey, u32)> = last.into_iter().collect();
    rows.sort_unstable();
    let indices = UInt32Array::from(rows.into_iter().map(|(_, idx)| idx).collect::<Vec<_>>());

    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), &indices, None))
        .collect::<Result<Vec<ArrayRef>, _>>()
        .context(ReorderSnafu)?;
    RecordBatch::try_new(batch.schema(), columns).context(ReorderSnafu)
}
