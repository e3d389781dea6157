//! Flat-file layout: one Parquet file per dataset version.
//!
//! ```text
//! <root>/<VERSIONING>_<TEMPORALITY>/<name>/<name>-latest-data.parquet
//! <root>/<VERSIONING>_<TEMPORALITY>/<name>/<name>-as_of_2024-01-31T120000+0000-data.parquet
//! <root>/<VERSIONING>_<TEMPORALITY>/<name>/<name>-named_<label>-data.parquet
//! ```
//!
//! Versions are recovered by parsing the file names in the dataset directory.
//! AS_OF files carry the `as_of` column alongside the temporal columns.

use std::path::PathBuf;

use arrow::array::RecordBatch;
use log::{debug, info};
use snafu::prelude::*;

use crate::{
    error::{ConfigurationError, validate_dataset_name},
    frame,
    io::{
        DataHandler, HandlerResult, RowsSnafu, StorageSnafu, VersionMarker, combine_with_stored,
        effective_tags, prepare_rows, publish, read_file, stored_tags,
    },
    series_type::{AS_OF_COLUMN, SeriesType},
    storage::{self, StorageLocation, layout},
    tags::DatasetTags,
};

/// Handler for one version of a dataset in the flat-file layout.
#[derive(Debug, Clone)]
pub struct FlatFileBackend {
    root: StorageLocation,
    name: String,
    data_type: SeriesType,
    version: VersionMarker,
}

impl FlatFileBackend {
    /// Address `version` of dataset `name` under `root`.
    pub fn new(
        root: StorageLocation,
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
    ) -> Result<Self, ConfigurationError> {
        validate_dataset_name(name)?;
        version.check_fits(data_type)?;
        Ok(Self {
            root,
            name: name.to_string(),
            data_type,
            version,
        })
    }

    /// Relative directory holding every version of the dataset.
    pub fn directory(&self) -> PathBuf {
        layout::flat_dataset_dir(&self.name, self.data_type)
    }
}

/// Stored versions of dataset `name`, in natural order.
pub fn list_versions(
    root: &StorageLocation,
    name: &str,
    data_type: SeriesType,
) -> HandlerResult<Vec<VersionMarker>> {
    let dir = layout::flat_dataset_dir(name, data_type);
    let entries = storage::list_dir(root, &dir).context(StorageSnafu { dataset: name })?;
    let mut versions: Vec<VersionMarker> = entries
        .iter()
        .filter(|e| !e.is_dir)
        .filter_map(|e| layout::parse_flat_file_name(name, data_type.versioning, &e.name))
        .collect();
    versions.sort();
    versions.dedup();
    debug!("DATASET {name}: found versions {versions:?} in {}", dir.display());
    Ok(versions)
}

impl DataHandler for FlatFileBackend {
    fn dataset(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> SeriesType {
        self.data_type
    }

    fn version(&self) -> &VersionMarker {
        &self.version
    }

    fn location(&self) -> &StorageLocation {
        &self.root
    }

    fn data_file(&self) -> PathBuf {
        layout::flat_file_path(&self.name, self.data_type, &self.version)
    }

    fn exists(&self) -> HandlerResult<bool> {
        storage::exists(&self.root, &self.data_file()).context(StorageSnafu {
            dataset: self.name.as_str(),
        })
    }

    fn read(&self) -> HandlerResult<RecordBatch> {
        let path = self.data_file();
        match read_file(&self.root, &path, &self.name)? {
            Some(batch) => {
                debug!(
                    "DATASET {}: read {} rows from {}",
                    self.name,
                    batch.num_rows(),
                    path.display()
                );
                Ok(batch)
            }
            None => {
                debug!("DATASET {}: no data at {}", self.name, path.display());
                Ok(frame::empty_batch())
            }
        }
    }

    fn read_tags(&self) -> HandlerResult<Option<DatasetTags>> {
        stored_tags(&self.root, &self.data_file(), self.data_type, &self.name)
    }

    fn write(&self, data: &RecordBatch, tags: &DatasetTags) -> HandlerResult<DatasetTags> {
        let rows = prepare_rows(&self.name, self.data_type, data)?;
        let rows = combine_with_stored(self, rows)?;
        let rows = match &self.version {
            VersionMarker::AsOf(ts) => frame::with_constant_timestamp(&rows, AS_OF_COLUMN, *ts)
                .context(RowsSnafu {
                    dataset: self.name.as_str(),
                })?,
            VersionMarker::Latest | VersionMarker::Named(_) => rows,
        };
        let tags = effective_tags(self, &rows, tags)?;
        publish(self, &rows, &tags, &self.data_type.date_columns())?;
        info!(
            "DATASET {}: saved version {} ({} rows)",
            self.name,
            self.version,
            rows.num_rows()
        );
        Ok(tags)
    }

    fn versions(&self) -> HandlerResult<Vec<VersionMarker>> {
        list_versions(&self.root, &self.name, self.data_type)
    }
}
