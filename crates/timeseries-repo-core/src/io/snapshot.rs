//! Numbered snapshot copies of stored versions.
//!
//! A snapshot copies one version's data file, and the dataset's catalog
//! document when there is one, into
//! `<root>/<process_stage>/<product>/<name>/` under the stem
//! `<name>_p<from>_p<to>[_v<as_of>]_v<N>`. The period is the smallest and
//! largest value of the temporal columns; `N` counts up from the largest
//! sequence already present.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use snafu::prelude::*;

use crate::{
    dates::utc_iso_no_colon,
    frame,
    io::{DataHandler, HandlerResult, RowsSnafu, StorageSnafu, json_metadata::MetadataStore},
    storage::{self, StorageLocation, layout},
};

/// Destination of snapshot copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotStore {
    root: StorageLocation,
    process_stage: String,
    product: String,
}

impl SnapshotStore {
    /// Snapshots under `root/<process_stage>/<product>/`; `product` may be empty.
    pub fn new(
        root: StorageLocation,
        process_stage: impl Into<String>,
        product: impl Into<String>,
    ) -> Self {
        Self {
            root,
            process_stage: process_stage.into(),
            product: product.into(),
        }
    }

    /// Relative directory holding the snapshots of dataset `name`.
    pub fn directory(&self, name: &str) -> PathBuf {
        layout::snapshot_dir(&self.process_stage, &self.product, name)
    }

    /// Largest sequence number among stored snapshots of `name`; 0 if none.
    pub fn last_sequence(&self, name: &str) -> HandlerResult<u64> {
        let entries = storage::list_dir(&self.root, &self.directory(name))
            .context(StorageSnafu { dataset: name })?;
        Ok(entries
            .iter()
            .filter_map(|e| layout::parse_snapshot_sequence(&e.name))
            .max()
            .unwrap_or(0))
    }

    /// Copy the version `handler` addresses; returns the relative data path.
    ///
    /// `Ok(None)` when the version has no data file.
    pub fn publish(
        &self,
        handler: &dyn DataHandler,
        metadata: Option<&MetadataStore>,
    ) -> HandlerResult<Option<PathBuf>> {
        let name = handler.dataset();
        if !handler.exists()? {
            debug!("DATASET {name}: nothing stored, no snapshot taken");
            return Ok(None);
        }
        let rows = handler.read()?;
        let (from, to) = period(&rows, handler.data_type().temporal_columns())
            .context(RowsSnafu { dataset: name })?;
        let from = from.as_ref().map(utc_iso_no_colon).unwrap_or_default();
        let to = to.as_ref().map(utc_iso_no_colon).unwrap_or_default();

        let sequence = self.last_sequence(name)? + 1;
        let stem = layout::snapshot_stem(
            name,
            (&from, &to),
            Some(handler.version()),
            sequence,
        );
        let dir = self.directory(name);
        let data_path = dir.join(format!("{stem}.parquet"));
        storage::copy_file(handler.location(), &handler.data_file(), &self.root, &data_path)
            .context(StorageSnafu { dataset: name })?;

        if let Some(store) = metadata {
            let doc = PathBuf::from(layout::metadata_file_name(name));
            if storage::exists(store.location(), &doc).context(StorageSnafu { dataset: name })? {
                let meta_path = dir.join(format!("{stem}.json"));
                storage::copy_file(store.location(), &doc, &self.root, &meta_path)
                    .context(StorageSnafu { dataset: name })?;
            }
        }
        info!(
            "DATASET {name}: snapshot {sequence} written to {}",
            data_path.display()
        );
        Ok(Some(data_path))
    }

    /// Root the snapshot directories are resolved against.
    pub fn location(&self) -> &StorageLocation {
        &self.root
    }

    /// Absolute path of a relative snapshot path.
    pub fn resolve(&self, rel: &Path) -> PathBuf {
        self.root.resolve(rel)
    }
}

type Bound = Option<DateTime<Utc>>;

/// Smallest and largest value over the given date columns.
fn period(rows: &arrow::array::RecordBatch, columns: &[&str]) -> frame::FrameResult<(Bound, Bound)> {
    let mut lo: Option<i64> = None;
    let mut hi: Option<i64> = None;
    for column in columns {
        if rows.schema().index_of(column).is_err() {
            continue;
        }
        if let Some((min, max)) = frame::timestamp_bounds(rows, column)? {
            lo = Some(lo.map_or(min, |l| l.min(min)));
            hi = Some(hi.map_or(max, |h| h.max(max)));
        }
    }
    Ok((
        lo.map(DateTime::from_timestamp_nanos),
        hi.map(DateTime::from_timestamp_nanos),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::test_util::{at_batch, month_start},
        io::flat::FlatFileBackend,
        series_type::SeriesType,
        tags::DatasetTags,
        version::VersionMarker,
    };
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn snapshots_are_numbered_and_named_by_period() -> TestResult {
        let tmp = TempDir::new()?;
        let data = StorageLocation::local(tmp.path().join("data"));
        let meta = MetadataStore::new(StorageLocation::local(tmp.path().join("meta")));
        let handler = FlatFileBackend::new(data, "s", SeriesType::simple(), VersionMarker::Latest)?;
        let rows = at_batch(
            &[month_start(2024, 1), month_start(2024, 3)],
            &[("a", vec![1.0, 2.0])],
        );
        let tags = DatasetTags::defaults("s", SeriesType::simple(), &["a"]);
        handler.write(&rows, &tags)?;
        meta.write("s", SeriesType::simple(), &tags)?;

        let store = SnapshotStore::new(StorageLocation::local(tmp.path().join("shared")), "stage", "");
        let first = store.publish(&handler, Some(&meta))?;
        let second = store.publish(&handler, Some(&meta))?;

        assert_eq!(
            first,
            Some(PathBuf::from(
                "stage/s/s_p2024-01-01T000000+0000_p2024-03-01T000000+0000_v1.parquet"
            ))
        );
        assert_eq!(store.last_sequence("s")?, 2);
        let Some(second) = second else {
            panic!("second snapshot was written");
        };
        assert!(store.resolve(&second).is_file());
        assert!(store.resolve(&second.with_extension("json")).is_file());
        Ok(())
    }

    #[test]
    fn missing_version_is_not_snapshotted() -> TestResult {
        let tmp = TempDir::new()?;
        let handler = FlatFileBackend::new(
            StorageLocation::local(tmp.path()),
            "none",
            SeriesType::simple(),
            VersionMarker::Latest,
        )?;
        let store = SnapshotStore::new(StorageLocation::local(tmp.path()), "stage", "p");
        assert_eq!(store.publish(&handler, None)?, None);
        Ok(())
    }
}
