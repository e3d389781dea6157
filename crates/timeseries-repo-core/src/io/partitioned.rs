//! Hive-style partitioned layout.
//!
//! ```text
//! <root>/data_type=<TYPE>/dataset=<name>/as_of=<value>/part-0.parquet
//! ```
//!
//! `<value>` is the no-colon UTC timestamp for AS_OF datasets, the label for
//! NAMES datasets, and `__HIVE_DEFAULT_PARTITION__` for unversioned ones.
//! The `as_of` column is never stored in the file: it is rebuilt from the
//! directory name on read, and only for AS_OF datasets.

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

/// Handler for one version partition of a dataset.
#[derive(Debug, Clone)]
pub struct PartitionedBackend {
    root: StorageLocation,
    name: String,
    data_type: SeriesType,
    version: VersionMarker,
}

impl PartitionedBackend {
    /// Address the partition of `version` of dataset `name` under `root`.
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

    /// Relative directory holding every partition of the dataset.
    pub fn directory(&self) -> PathBuf {
        layout::partitioned_dataset_dir(&self.name, self.data_type)
    }

    /// Rows of every stored partition, stacked in version order.
    ///
    /// For AS_OF datasets each row carries the `as_of` of its partition.
    pub fn read_all(&self) -> HandlerResult<RecordBatch> {
        let mut batches = Vec::new();
        for version in list_versions(&self.root, &self.name, self.data_type)? {
            let path = layout::partition_file_path(&self.name, self.data_type, &version);
            if let Some(batch) = self.read_partition(&path, &version)? {
                batches.push(batch);
            }
        }
        debug!("DATASET {}: read {} partitions", self.name, batches.len());
        frame::concat_diagonal(&batches).context(RowsSnafu {
            dataset: self.name.as_str(),
        })
    }

    fn read_partition(
        &self,
        path: &std::path::Path,
        version: &VersionMarker,
    ) -> HandlerResult<Option<RecordBatch>> {
        let Some(batch) = read_file(&self.root, path, &self.name)? else {
            return Ok(None);
        };
        let batch = match version {
            VersionMarker::AsOf(ts) => frame::with_constant_timestamp(&batch, AS_OF_COLUMN, *ts)
                .context(RowsSnafu {
                    dataset: self.name.as_str(),
                })?,
            VersionMarker::Latest | VersionMarker::Named(_) => batch,
        };
        Ok(Some(batch))
    }
}

/// Stored versions of dataset `name`, parsed from its partition directories.
pub fn list_versions(
    root: &StorageLocation,
    name: &str,
    data_type: SeriesType,
) -> HandlerResult<Vec<VersionMarker>> {
    let dir = layout::partitioned_dataset_dir(name, data_type);
    let entries = storage::list_dir(root, &dir).context(StorageSnafu { dataset: name })?;
    let mut versions: Vec<VersionMarker> = entries
        .iter()
        .filter(|e| e.is_dir)
        .filter_map(|e| layout::parse_partition_dir_name(data_type.versioning, &e.name))
        .collect();
    versions.sort();
    Ok(versions)
}

impl DataHandler for PartitionedBackend {
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
        layout::partition_file_path(&self.name, self.data_type, &self.version)
    }

    fn exists(&self) -> HandlerResult<bool> {
        storage::exists(&self.root, &self.data_file()).context(StorageSnafu {
            dataset: self.name.as_str(),
        })
    }

    fn read(&self) -> HandlerResult<RecordBatch> {
        Ok(self
            .read_partition(&self.data_file(), &self.version)?
            .unwrap_or_else(frame::empty_batch))
    }

    fn read_tags(&self) -> HandlerResult<Option<DatasetTags>> {
        stored_tags(&self.root, &self.data_file(), self.data_type, &self.name)
    }

    fn write(&self, data: &RecordBatch, tags: &DatasetTags) -> HandlerResult<DatasetTags> {
        let rows = prepare_rows(&self.name, self.data_type, data)?;
        let rows = combine_with_stored(self, rows)?;
        let tags = effective_tags(self, &rows, tags)?;
        publish(self, &rows, &tags, self.data_type.temporal_columns())?;
        info!(
            "DATASET {}: saved partition {} ({} rows)",
            self.name,
            layout::partition_dir_name(&self.version),
            rows.num_rows()
        );
        Ok(tags)
    }

    fn versions(&self) -> HandlerResult<Vec<VersionMarker>> {
        list_versions(&self.root, &self.name, self.data_type)
    }
}
