//! Parquet encoding of dataset rows with embedded tags.
//!
//! A stored file has one `Timestamp(ns, "UTC")` field per stored date column,
//! in type order, followed by one nullable `Float64` field per series sorted
//! by name. Dataset attributes sit in the schema metadata and each series'
//! tags in its field metadata, both under the codec's `"json"` key.

use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use bytes::Bytes;
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::Compression,
    errors::ParquetError,
    file::properties::WriterProperties,
};

use crate::{
    frame,
    tags::{
        DatasetTags,
        codec::{self, CodecResult, EncodedTags, TAGS_METADATA_KEY},
    },
};

/// Target schema for `rows` with `tags` embedded.
///
/// `date_columns` lists the date fields the file stores; every other column
/// of `rows` is a series. Series without tags in `tags` are skipped by the
/// caller beforehand, so every series here has an entry.
pub(crate) fn storage_schema(
    rows: &RecordBatch,
    date_columns: &[&str],
    tags: &DatasetTags,
) -> CodecResult<SchemaRef> {
    let encoded = codec::encode_dataset_tags(tags)?;
    let mut fields: Vec<Field> = date_columns
        .iter()
        .filter(|c| rows.schema().index_of(**c).is_ok())
        .map(|c| Field::new(*c, frame::utc_timestamp_type(), true))
        .collect();

    let mut series = frame::series_columns(rows, date_columns);
    series.sort();
    for name in series {
        let mut field = Field::new(&name, DataType::Float64, true);
        if let Some(meta) = encoded.columns.get(&name) {
            field = field.with_metadata(meta.clone());
        }
        fields.push(field);
    }
    Ok(Arc::new(Schema::new_with_metadata(fields, encoded.schema)))
}

/// Encode `rows` (already conformed to `schema`) as an in-memory Parquet file.
pub(crate) fn encode(rows: &RecordBatch) -> Result<Vec<u8>, ParquetError> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, rows.schema(), Some(props))?;
    writer.write(rows)?;
    writer.close()?;
    Ok(buf)
}

/// Decode a whole Parquet file into one batch, keeping schema metadata.
pub(crate) fn decode(bytes: Vec<u8>) -> Result<RecordBatch, ParquetError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(arrow::compute::concat_batches(&schema, &batches)?)
}

/// Decode only the footer of a Parquet file: its Arrow schema with metadata.
pub(crate) fn decode_schema(bytes: Vec<u8>) -> Result<SchemaRef, ParquetError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))?;
    Ok(Arc::clone(builder.schema()))
}

/// Tags embedded in a stored schema, or `None` if the file carries none.
pub(crate) fn tags_from_schema(
    schema: &Schema,
    date_columns: &[&str],
) -> CodecResult<Option<DatasetTags>> {
    if !schema.metadata().contains_key(TAGS_METADATA_KEY) {
        return Ok(None);
    }
    let columns = schema
        .fields()
        .iter()
        .filter(|f| !date_columns.contains(&f.name().as_str()))
        .map(|f| (f.name().clone(), f.metadata().clone()))
        .collect::<std::collections::BTreeMap<String, HashMap<String, String>>>();
    let encoded = EncodedTags {
        schema: schema.metadata().clone(),
        columns,
    };
    codec::decode_dataset_tags(&encoded).map(Some)
}
