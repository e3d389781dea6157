//! Arrow record batch helpers shared by handlers and the merge engine.
//!
//! Datasets are held as a single [`RecordBatch`]. Date columns are stored as
//! `Timestamp(Nanosecond, "UTC")`; every other column is a series and is
//! stored as nullable `Float64`. The helpers here bring arbitrary input into
//! that shape and combine batches whose column sets differ.

use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, AsArray, RecordBatch, RecordBatchOptions, TimestampNanosecondArray,
        new_null_array,
    },
    compute::{CastOptions, can_cast_types, cast_with_options, concat_batches},
    datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit, TimestampNanosecondType},
    error::ArrowError,
};
use chrono::{DateTime, Utc};
use snafu::prelude::*;

/// Errors from reshaping record batches.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    /// An Arrow kernel failed.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// A date column holds a type that cannot become a UTC timestamp.
    #[snafu(display("Date column {column} has unsupported type {datatype}"))]
    UnsupportedDateType {
        /// Column name.
        column: String,
        /// Rendered Arrow data type.
        datatype: String,
    },

    /// A series column is not numeric.
    #[snafu(display("Series column {column} has non-numeric type {datatype}"))]
    UnsupportedSeriesType {
        /// Column name.
        column: String,
        /// Rendered Arrow data type.
        datatype: String,
    },

    /// A required column is absent.
    #[snafu(display("Column {column} not found"))]
    MissingColumn {
        /// Column name.
        column: String,
    },

    /// A timestamp falls outside the nanosecond range.
    #[snafu(display("Timestamp {ts} cannot be stored with nanosecond precision"))]
    TimestampOutOfRange {
        /// The offending timestamp.
        ts: DateTime<Utc>,
    },
}

/// Convenience alias for frame results.
pub type FrameResult<T> = Result<T, FrameError>;

/// The Arrow type of every stored date column.
pub fn utc_timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into()))
}

/// A batch with no rows and no columns.
pub fn empty_batch() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

/// Whether the batch has no columns at all.
pub fn is_empty_frame(batch: &RecordBatch) -> bool {
    batch.num_columns() == 0
}

fn strict_cast() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

/// Names of the non-date columns, in batch order.
pub fn series_columns(batch: &RecordBatch, date_columns: &[&str]) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|n| !date_columns.contains(&n.as_str()))
        .collect()
}

/// Cast date columns to UTC nanosecond timestamps and series to `Float64`.
///
/// Naive timestamps are taken to be UTC. Field metadata is dropped; every
/// field becomes nullable.
pub fn normalize(batch: &RecordBatch, date_columns: &[&str]) -> FrameResult<RecordBatch> {
    let schema = batch.schema();
    let ts_type = utc_timestamp_type();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = field.name();
        let from = column.data_type();
        let target = if date_columns.contains(&name.as_str()) {
            ensure!(
                can_cast_types(from, &ts_type),
                UnsupportedDateTypeSnafu {
                    column: name.as_str(),
                    datatype: from.to_string(),
                }
            );
            ts_type.clone()
        } else {
            ensure!(
                from.is_numeric() || *from == DataType::Null,
                UnsupportedSeriesTypeSnafu {
                    column: name.as_str(),
                    datatype: from.to_string(),
                }
            );
            DataType::Float64
        };
        let cast = if *from == target {
            Arc::clone(column)
        } else {
            cast_with_options(column, &target, &strict_cast()).context(ArrowSnafu)?
        };
        fields.push(Field::new(name, target, true));
        columns.push(cast);
    }

    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
    )
    .context(ArrowSnafu)
}

/// Stack batches vertically over the union of their columns.
///
/// Columns are ordered by first appearance; a batch lacking a column
/// contributes nulls. Batches without columns are skipped, and the result of
/// stacking nothing is [`empty_batch`].
pub fn concat_diagonal(batches: &[RecordBatch]) -> FrameResult<RecordBatch> {
    let mut fields: Vec<Field> = Vec::new();
    for batch in batches {
        for field in batch.schema().fields() {
            if !fields.iter().any(|f| f.name() == field.name()) {
                fields.push(Field::new(field.name(), field.data_type().clone(), true));
            }
        }
    }
    if fields.is_empty() {
        return Ok(empty_batch());
    }

    let schema: SchemaRef = Arc::new(Schema::new(fields));
    let aligned = batches
        .iter()
        .filter(|b| !is_empty_frame(b))
        .map(|b| conform(b, &schema))
        .collect::<FrameResult<Vec<_>>>()?;
    concat_batches(&schema, &aligned).context(ArrowSnafu)
}

/// Rebuild `batch` with exactly the fields of `schema`, matched by name.
///
/// Columns are cast where types differ; missing columns become nulls and
/// extra columns are dropped.
pub fn conform(batch: &RecordBatch, schema: &SchemaRef) -> FrameResult<RecordBatch> {
    let rows = batch.num_rows();
    let columns = schema
        .fields()
        .iter()
        .map(|field| match batch.column_by_name(field.name()) {
            Some(col) if col.data_type() == field.data_type() => Ok(Arc::clone(col)),
            Some(col) => {
                cast_with_options(col, field.data_type(), &strict_cast()).context(ArrowSnafu)
            }
            None => Ok(new_null_array(field.data_type(), rows)),
        })
        .collect::<FrameResult<Vec<ArrayRef>>>()?;
    RecordBatch::try_new_with_options(
        Arc::clone(schema),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
    .context(ArrowSnafu)
}

/// Set column `name` to the constant timestamp `ts`, placing it first.
///
/// An existing column with that name is replaced.
pub fn with_constant_timestamp(
    batch: &RecordBatch,
    name: &str,
    ts: DateTime<Utc>,
) -> FrameResult<RecordBatch> {
    let nanos = ts
        .timestamp_nanos_opt()
        .context(TimestampOutOfRangeSnafu { ts })?;
    let values = TimestampNanosecondArray::from(vec![nanos; batch.num_rows()]).with_timezone("UTC");

    let schema = batch.schema();
    let mut fields = vec![Field::new(name, utc_timestamp_type(), false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(values)];
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if field.name() != name {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(column));
        }
    }
    RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &RecordBatchOptions::new().with_row_count(Some(batch.num_rows())),
    )
    .context(ArrowSnafu)
}

/// Remove the named columns if present.
pub fn drop_columns(batch: &RecordBatch, names: &[&str]) -> FrameResult<RecordBatch> {
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !names.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    if keep.len() == schema.fields().len() {
        return Ok(batch.clone());
    }
    if keep.is_empty() {
        return Ok(empty_batch());
    }
    batch.project(&keep).context(ArrowSnafu)
}

/// Smallest and largest value of a normalised date column, in nanoseconds.
pub fn timestamp_bounds(batch: &RecordBatch, column: &str) -> FrameResult<Option<(i64, i64)>> {
    let col = batch
        .column_by_name(column)
        .context(MissingColumnSnafu { column })?;
    let Some(values) = col.as_primitive_opt::<TimestampNanosecondType>() else {
        return UnsupportedDateTypeSnafu {
            column,
            datatype: col.data_type().to_string(),
        }
        .fail();
    };
    Ok(arrow::compute::min(values).zip(arrow::compute::max(values)))
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use arrow::array::{Float64Array, StringArray};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn normalize_widens_and_sets_utc() -> TestResult {
        let out = normalize(&mixed_precision_batch(), &["valid_at"])?;
        let schema = out.schema();
        assert_eq!(schema.field(0).data_type(), &utc_timestamp_type());
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        let ts = out.column(0).as_primitive::<TimestampNanosecondType>();
        assert_eq!(ts.value(0), 1_704_067_200_000_000_000);
        let b = out.column(2).as_primitive::<arrow::datatypes::Float64Type>();
        assert_eq!(b.value(0), 7.0);
        Ok(())
    }

    #[test]
    fn normalize_rejects_text_series() -> TestResult {
        let schema = Schema::new(vec![Field::new("label", DataType::Utf8, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec!["x"]))],
        )?;
        assert!(matches!(
            normalize(&batch, &[]),
            Err(FrameError::UnsupportedSeriesType { .. })
        ));
        Ok(())
    }

    #[test]
    fn diagonal_concat_fills_nulls() -> TestResult {
        let a = at_batch(&[month_start(2024, 1)], &[("x", vec![1.0])]);
        let b = at_batch(&[month_start(2024, 2)], &[("y", vec![2.0])]);
        let out = concat_diagonal(&[empty_batch(), a, b])?;
        assert_eq!(out.num_rows(), 2);
        assert_eq!(series_columns(&out, &["valid_at"]), vec!["x", "y"]);
        let x = out
            .column_by_name("x")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>().cloned());
        let Some(x) = x else {
            panic!("x column");
        };
        assert!(x.is_valid(0));
        assert!(x.is_null(1));
        assert!(is_empty_frame(&concat_diagonal(&[])?));
        Ok(())
    }

    #[test]
    fn constant_timestamp_goes_first_and_replaces() -> TestResult {
        let batch = at_batch(&[month_start(2024, 1), month_start(2024, 2)], &[("x", vec![1.0, 2.0])]);
        let with = with_constant_timestamp(&batch, "as_of", month_start(2024, 3))?;
        assert_eq!(with.schema().field(0).name(), "as_of");
        let again = with_constant_timestamp(&with, "as_of", month_start(2024, 4))?;
        assert_eq!(again.num_columns(), 3);
        assert_eq!(
            timestamp_bounds(&again, "as_of")?,
            month_start(2024, 4)
                .timestamp_nanos_opt()
                .map(|n| (n, n))
        );
        let dropped = drop_columns(&again, &["as_of"])?;
        assert_eq!(dropped.num_columns(), 2);
        Ok(())
    }
}
