//! Storage handlers for dataset rows.
//!
//! A handler addresses one version of one dataset under a storage root and
//! implements the [`DataHandler`] contract:
//!
//! - `write` persists rows together with their tags; NONE datasets merge into
//!   what is already stored, other versionings replace the snapshot.
//! - `read` returns an empty batch (no rows, no columns) when nothing is
//!   stored.
//! - `exists` only probes paths.
//! - `versions` lists stored versions of the dataset in their natural order.
//!
//! Two layouts are available, selected by [`BackendKind`]: a flat file per
//! version ([`flat::FlatFileBackend`]) and Hive-style partition directories
//! ([`partitioned::PartitionedBackend`]). [`Handler`] dispatches between them;
//! the set of backends is closed.

pub mod flat;
pub mod json_metadata;
pub(crate) mod parquet_file;
pub mod partitioned;
pub mod snapshot;

use std::{fmt, path::PathBuf, str::FromStr};

use arrow::array::RecordBatch;
use log::debug;
use parquet::errors::ParquetError;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    error::{ConfigurationError, UnknownBackendSnafu, validate_dataset_name},
    frame::{self, FrameError},
    merge::{self, MergeError},
    series_type::{AS_OF_COLUMN, SeriesType, Versioning},
    storage::{StorageError, StorageLocation},
    tags::{DatasetTags, codec::TagCodecError},
};

pub use crate::version::VersionMarker;

/// Errors raised by storage handlers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HandlerError {
    /// The handler was addressed in a way that can never succeed.
    #[snafu(display("Invalid dataset address: {source}"))]
    Configuration {
        /// Underlying configuration error.
        source: ConfigurationError,
    },

    /// Reading or writing the underlying files failed.
    #[snafu(display("Storage error for dataset {dataset}: {source}"))]
    Storage {
        /// Dataset name.
        dataset: String,
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// The Parquet codec failed.
    #[snafu(display("Parquet error at {path}: {source}"))]
    Parquet {
        /// Relative path of the file.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },

    /// Input rows could not be brought into the stored shape.
    #[snafu(display("Invalid rows for dataset {dataset}: {source}"))]
    Rows {
        /// Dataset name.
        dataset: String,
        /// Underlying frame error.
        source: FrameError,
    },

    /// Merging with the stored rows failed.
    #[snafu(display("Merge failed for dataset {dataset}: {source}"))]
    Merge {
        /// Dataset name.
        dataset: String,
        /// Underlying merge error.
        source: MergeError,
    },

    /// Tags could not be encoded or decoded.
    #[snafu(display("Tag codec error for dataset {dataset}: {source}"))]
    Codec {
        /// Dataset name.
        dataset: String,
        /// Underlying codec error.
        source: TagCodecError,
    },

    /// The rows lack a date column their series type requires.
    #[snafu(display("Dataset {dataset} is {data_type} but has no {column} column"))]
    MissingDateColumn {
        /// Dataset name.
        dataset: String,
        /// Declared series type.
        data_type: SeriesType,
        /// The missing column.
        column: String,
    },
}

/// Convenience alias for handler results.
pub type HandlerResult<T> = Result<T, HandlerError>;

impl From<ConfigurationError> for HandlerError {
    fn from(source: ConfigurationError) -> Self {
        HandlerError::Configuration { source }
    }
}

/// Operations every storage layout provides for one dataset version.
pub trait DataHandler {
    /// Dataset name.
    fn dataset(&self) -> &str;

    /// Declared series type.
    fn data_type(&self) -> SeriesType;

    /// The version this handler addresses.
    fn version(&self) -> &VersionMarker;

    /// Root the layout is resolved against.
    fn location(&self) -> &StorageLocation;

    /// Relative path of this version's data file.
    fn data_file(&self) -> PathBuf;

    /// Whether this version's data file exists. Never reads its contents.
    fn exists(&self) -> HandlerResult<bool>;

    /// Rows of this version, or an empty batch if nothing is stored.
    fn read(&self) -> HandlerResult<RecordBatch>;

    /// Tags embedded in this version's file, if any.
    ///
    /// Only the Parquet footer is decoded.
    fn read_tags(&self) -> HandlerResult<Option<DatasetTags>>;

    /// Persist `data` with `tags` as this version.
    ///
    /// Returns the tags actually embedded: defaults, then stored tags for
    /// NONE datasets, then `tags`, restricted to the series written.
    fn write(&self, data: &RecordBatch, tags: &DatasetTags) -> HandlerResult<DatasetTags>;

    /// All stored versions of the dataset.
    fn versions(&self) -> HandlerResult<Vec<VersionMarker>>;
}

/// The available storage layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// One file per version under `<TYPE>/<name>/`.
    #[serde(alias = "simple")]
    Flat,
    /// Hive-style `data_type=/dataset=/as_of=` directories.
    #[serde(alias = "hive")]
    Partitioned,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Flat => f.write_str("flat"),
            BackendKind::Partitioned => f.write_str("partitioned"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "simple" => Ok(BackendKind::Flat),
            "partitioned" | "hive" => Ok(BackendKind::Partitioned),
            _ => UnknownBackendSnafu { name: s }.fail(),
        }
    }
}

/// A handler of either layout.
#[derive(Debug, Clone)]
pub enum Handler {
    /// Flat-file layout.
    Flat(flat::FlatFileBackend),
    /// Partitioned layout.
    Partitioned(partitioned::PartitionedBackend),
}

impl Handler {
    /// Open a handler of `kind` for one version of a dataset.
    ///
    /// Fails with a configuration error if `version` does not fit the
    /// dataset's versioning.
    pub fn open(
        kind: BackendKind,
        root: StorageLocation,
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
    ) -> Result<Self, ConfigurationError> {
        Ok(match kind {
            BackendKind::Flat => {
                Handler::Flat(flat::FlatFileBackend::new(root, name, data_type, version)?)
            }
            BackendKind::Partitioned => Handler::Partitioned(
                partitioned::PartitionedBackend::new(root, name, data_type, version)?,
            ),
        })
    }

    /// Stored versions of a dataset, without addressing any one of them.
    pub fn list_versions(
        kind: BackendKind,
        root: &StorageLocation,
        name: &str,
        data_type: SeriesType,
    ) -> HandlerResult<Vec<VersionMarker>> {
        validate_dataset_name(name)?;
        match kind {
            BackendKind::Flat => flat::list_versions(root, name, data_type),
            BackendKind::Partitioned => partitioned::list_versions(root, name, data_type),
        }
    }

    fn inner(&self) -> &dyn DataHandler {
        match self {
            Handler::Flat(h) => h,
            Handler::Partitioned(h) => h,
        }
    }
}

impl DataHandler for Handler {
    fn dataset(&self) -> &str {
        self.inner().dataset()
    }

    fn data_type(&self) -> SeriesType {
        self.inner().data_type()
    }

    fn version(&self) -> &VersionMarker {
        self.inner().version()
    }

    fn location(&self) -> &StorageLocation {
        self.inner().location()
    }

    fn data_file(&self) -> PathBuf {
        self.inner().data_file()
    }

    fn exists(&self) -> HandlerResult<bool> {
        self.inner().exists()
    }

    fn read(&self) -> HandlerResult<RecordBatch> {
        self.inner().read()
    }

    fn read_tags(&self) -> HandlerResult<Option<DatasetTags>> {
        self.inner().read_tags()
    }

    fn write(&self, data: &RecordBatch, tags: &DatasetTags) -> HandlerResult<DatasetTags> {
        self.inner().write(data, tags)
    }

    fn versions(&self) -> HandlerResult<Vec<VersionMarker>> {
        self.inner().versions()
    }
}

/// Normalise incoming rows and check the required date columns.
///
/// A caller-supplied `as_of` column is dropped; the handler's own marker
/// decides the version.
pub(crate) fn prepare_rows(
    name: &str,
    data_type: SeriesType,
    data: &RecordBatch,
) -> HandlerResult<RecordBatch> {
    for column in data_type.temporal_columns() {
        ensure!(
            data.schema().index_of(column).is_ok(),
            MissingDateColumnSnafu {
                dataset: name,
                data_type,
                column: *column,
            }
        );
    }
    let data = frame::drop_columns(data, &[AS_OF_COLUMN]).context(RowsSnafu { dataset: name })?;
    frame::normalize(&data, data_type.temporal_columns()).context(RowsSnafu { dataset: name })
}

/// Combine `rows` with what is stored, according to the versioning.
pub(crate) fn combine_with_stored(
    handler: &dyn DataHandler,
    rows: RecordBatch,
) -> HandlerResult<RecordBatch> {
    let data_type = handler.data_type();
    if data_type.versioning != Versioning::None {
        return Ok(rows);
    }
    let stored = handler.read()?;
    debug!(
        "DATASET {}: merging {} new rows into {} stored rows",
        handler.dataset(),
        rows.num_rows(),
        stored.num_rows()
    );
    merge::merge_data(&stored, &rows, data_type.temporal_columns()).context(MergeSnafu {
        dataset: handler.dataset(),
    })
}

/// Tags to embed for `rows`: defaults, then stored tags, then `tags`,
/// restricted to the series actually present.
pub(crate) fn effective_tags(
    handler: &dyn DataHandler,
    rows: &RecordBatch,
    tags: &DatasetTags,
) -> HandlerResult<DatasetTags> {
    let data_type = handler.data_type();
    let series = frame::series_columns(rows, &data_type.date_columns());
    let mut layered = DatasetTags::defaults(handler.dataset(), data_type, &series);
    if data_type.versioning == Versioning::None {
        if let Some(stored) = handler.read_tags()? {
            layered = layered.layer(&stored);
        }
    }
    let mut layered = layered.layer(tags);
    layered.retain_series(&series);
    Ok(layered)
}

/// Encode `rows` with `tags` and publish them at `handler.data_file()`.
pub(crate) fn publish(
    handler: &dyn DataHandler,
    rows: &RecordBatch,
    tags: &DatasetTags,
    stored_date_columns: &[&str],
) -> HandlerResult<()> {
    let dataset = handler.dataset();
    let path = handler.data_file();
    let schema = parquet_file::storage_schema(rows, stored_date_columns, tags)
        .context(CodecSnafu { dataset })?;
    let rows = frame::conform(rows, &schema).context(RowsSnafu { dataset })?;
    let bytes = parquet_file::encode(&rows).context(ParquetSnafu {
        path: path.display().to_string(),
    })?;
    crate::storage::write_atomic(handler.location(), &path, &bytes)
        .context(StorageSnafu { dataset })?;
    debug!(
        "DATASET {dataset}: wrote {} rows x {} columns to {}",
        rows.num_rows(),
        rows.num_columns(),
        path.display()
    );
    Ok(())
}

/// Read and decode the file at `path`; `None` if it does not exist.
pub(crate) fn read_file(
    location: &StorageLocation,
    path: &std::path::Path,
    dataset: &str,
) -> HandlerResult<Option<RecordBatch>> {
    let bytes = match crate::storage::read_all_bytes(location, path) {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e).context(StorageSnafu { dataset }),
    };
    parquet_file::decode(bytes)
        .map(Some)
        .context(ParquetSnafu {
            path: path.display().to_string(),
        })
}

/// Tags embedded in the file at `path`, decoding only its footer.
pub(crate) fn stored_tags(
    location: &StorageLocation,
    path: &std::path::Path,
    data_type: SeriesType,
    dataset: &str,
) -> HandlerResult<Option<DatasetTags>> {
    let bytes = match crate::storage::read_all_bytes(location, path) {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e).context(StorageSnafu { dataset }),
    };
    let schema = parquet_file::decode_schema(bytes).context(ParquetSnafu {
        path: path.display().to_string(),
    })?;
    parquet_file::tags_from_schema(&schema, &data_type.date_columns())
        .context(CodecSnafu { dataset })
}
