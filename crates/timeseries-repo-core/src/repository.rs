//! A repository: one data root, one catalog directory, one storage layout.
//!
//! Saving writes the rows through the configured handler and then refreshes
//! the dataset's catalog document. Loading resolves the version, reads the
//! rows, and layers tags as `defaults ⊕ stored ⊕ supplied`. Searches go
//! through the catalog directory only.

use std::path::PathBuf;

use arrow::array::RecordBatch;
use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    catalog::{
        CatalogItem, CatalogResult, MetadataSnafu, ObjectType, SearchCriteria, check_expectation,
        describe,
    },
    dataset::{Dataset, LoadOptions},
    error::ConfigurationError,
    frame,
    io::{
        BackendKind, DataHandler, Handler, HandlerError, json_metadata::MetadataStore,
        snapshot::SnapshotStore,
    },
    series_type::{SeriesType, Versioning},
    storage::StorageLocation,
    tags::{DatasetTags, TagValue},
    version::VersionMarker,
};

/// Errors from saving and loading datasets.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RepositoryError {
    /// The request can never succeed as stated.
    #[snafu(display("Invalid request: {source}"))]
    Configuration {
        /// Underlying configuration error.
        source: ConfigurationError,
    },

    /// The storage handler failed.
    #[snafu(display("Repository {repository}: {source}"))]
    Handler {
        /// Repository name.
        repository: String,
        /// Underlying handler error.
        source: HandlerError,
    },

    /// A versioned dataset was loaded without a version and none is stored.
    #[snafu(display("Dataset {dataset} ({data_type}) has no stored versions"))]
    NoVersions {
        /// Dataset name.
        dataset: String,
        /// Declared series type.
        data_type: SeriesType,
    },
}

/// Convenience alias for repository results.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<ConfigurationError> for RepositoryError {
    fn from(source: ConfigurationError) -> Self {
        RepositoryError::Configuration { source }
    }
}

/// A named pair of data and catalog directories.
#[derive(Debug, Clone)]
pub struct Repository {
    name: String,
    data: StorageLocation,
    catalog: MetadataStore,
    backend: BackendKind,
}

impl Repository {
    /// A repository storing rows under `data` and documents under `catalog`.
    pub fn new(
        name: impl Into<String>,
        data: impl Into<PathBuf>,
        catalog: impl Into<PathBuf>,
        backend: BackendKind,
    ) -> Self {
        Self {
            name: name.into(),
            data: StorageLocation::local(data),
            catalog: MetadataStore::new(StorageLocation::local(catalog)),
            backend,
        }
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root of the data tree.
    pub fn data_location(&self) -> &StorageLocation {
        &self.data
    }

    /// The catalog document store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.catalog
    }

    /// Storage layout of the data tree.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    fn handler_err(&self) -> HandlerSnafu<&str> {
        HandlerSnafu {
            repository: self.name.as_str(),
        }
    }

    /// A handler for one version of dataset `name`.
    pub fn handler(
        &self,
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
    ) -> RepositoryResult<Handler> {
        Ok(Handler::open(
            self.backend,
            self.data.clone(),
            name,
            data_type,
            version,
        )?)
    }

    /// Persist `dataset` and refresh its catalog document.
    pub fn save(&self, dataset: &Dataset) -> RepositoryResult<()> {
        let handler = self.handler(&dataset.name, dataset.data_type, dataset.version.clone())?;
        let tags = handler
            .write(&dataset.data, &dataset.tags)
            .context(self.handler_err())?;
        self.catalog
            .write(&dataset.name, dataset.data_type, &tags)
            .context(self.handler_err())?;
        info!(
            "REPOSITORY {}: saved {} version {}",
            self.name, dataset.name, dataset.version
        );
        Ok(())
    }

    /// Stored versions of dataset `name`, in natural order.
    pub fn versions(&self, name: &str, data_type: SeriesType) -> RepositoryResult<Vec<VersionMarker>> {
        Handler::list_versions(self.backend, &self.data, name, data_type).context(self.handler_err())
    }

    /// The version `options` select, or the newest stored one.
    pub fn resolve_version(
        &self,
        name: &str,
        data_type: SeriesType,
        options: &LoadOptions,
    ) -> RepositoryResult<VersionMarker> {
        let requested = match data_type.versioning {
            Versioning::AsOf => options
                .as_of
                .map(|ts| VersionMarker::for_type(name, data_type, Some(ts)))
                .transpose()?,
            Versioning::Names => options
                .version_name
                .as_ref()
                .map(|label| VersionMarker::named(label.as_str()))
                .transpose()?,
            Versioning::None | Versioning::Semantic => {
                Some(VersionMarker::for_type(name, data_type, None)?)
            }
        };
        if let Some(version) = requested {
            return Ok(version);
        }
        let newest = self.versions(name, data_type)?.pop();
        debug!("DATASET {name}: newest stored version is {newest:?}");
        newest.context(NoVersionsSnafu {
            dataset: name,
            data_type,
        })
    }

    /// Rows of one version; an empty batch if nothing is stored.
    pub fn read_data(
        &self,
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
    ) -> RepositoryResult<RecordBatch> {
        self.handler(name, data_type, version)?
            .read()
            .context(self.handler_err())
    }

    /// Load dataset `name` with its tags.
    ///
    /// Stored tags come from the catalog document, or from the data file when
    /// no document exists. Tags of series missing from the rows are dropped.
    pub fn load(
        &self,
        name: &str,
        data_type: SeriesType,
        options: LoadOptions,
    ) -> RepositoryResult<Dataset> {
        let version = self.resolve_version(name, data_type, &options)?;
        let handler = self.handler(name, data_type, version.clone())?;
        let data = handler.read().context(self.handler_err())?;

        let stored = match self.catalog.read(name).context(self.handler_err())? {
            Some(tags) => Some(tags),
            None => handler.read_tags().context(self.handler_err())?,
        };
        let series = frame::series_columns(&data, &data_type.date_columns());
        let mut tags = DatasetTags::defaults(name, data_type, &series);
        if let Some(stored) = &stored {
            tags = tags.layer(stored);
        }
        if let Some(supplied) = &options.tags {
            tags = tags.layer(supplied);
        }
        tags.retain_series(&series);

        debug!(
            "DATASET {name}: loaded version {version} with {} rows",
            data.num_rows()
        );
        Ok(Dataset {
            name: name.to_string(),
            data_type,
            version,
            data,
            tags,
        })
    }

    /// Copy one stored version, with its catalog document, into `store`.
    ///
    /// Returns the relative path of the copied data file, or `None` if the
    /// version is not stored.
    pub fn snapshot(
        &self,
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
        store: &SnapshotStore,
    ) -> RepositoryResult<Option<PathBuf>> {
        let handler = self.handler(name, data_type, version)?;
        store
            .publish(&handler, Some(&self.catalog))
            .context(self.handler_err())
    }

    /// Datasets matching `criteria`.
    pub fn datasets(&self, criteria: &SearchCriteria) -> CatalogResult<Vec<CatalogItem>> {
        self.items(true, false, criteria)
    }

    /// Series matching `criteria`.
    pub fn series(&self, criteria: &SearchCriteria) -> CatalogResult<Vec<CatalogItem>> {
        self.items(false, true, criteria)
    }

    /// Datasets and/or series matching `criteria`.
    pub fn items(
        &self,
        datasets: bool,
        series: bool,
        criteria: &SearchCriteria,
    ) -> CatalogResult<Vec<CatalogItem>> {
        let found = self.collect_items(datasets, series, criteria)?;
        check_expectation(criteria.expect, describe(datasets, series), found)
    }

    /// Number of matches; `None` counts datasets and series together.
    pub fn count(
        &self,
        object_type: Option<ObjectType>,
        criteria: &SearchCriteria,
    ) -> CatalogResult<usize> {
        let (datasets, series) = match object_type {
            Some(ObjectType::Dataset) => (true, false),
            Some(ObjectType::Series) => (false, true),
            None => (true, true),
        };
        Ok(self.items(datasets, series, criteria)?.len())
    }

    /// Matches without checking the expectation.
    pub(crate) fn collect_items(
        &self,
        datasets: bool,
        series: bool,
        criteria: &SearchCriteria,
    ) -> CatalogResult<Vec<CatalogItem>> {
        let names = self
            .catalog
            .list(&criteria.equals, &criteria.contains)
            .context(MetadataSnafu {
                repository: self.name.as_str(),
            })?;

        let mut out = Vec::new();
        for file_name in names {
            let tags = match self.catalog.read(&file_name) {
                Ok(Some(tags)) => tags,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "REPOSITORY {}: skipping unreadable metadata for {file_name}: {e}",
                        self.name
                    );
                    continue;
                }
            };
            let dataset_name = tags.name().unwrap_or(file_name.as_str()).to_string();

            if datasets && criteria.matches_tags(&tags.attributes) {
                out.push(CatalogItem {
                    repository_name: self.name.clone(),
                    object_name: dataset_name.clone(),
                    object_type: ObjectType::Dataset,
                    object_tags: tags.attributes.clone(),
                    parent: tags
                        .attributes
                        .get("parent")
                        .and_then(TagValue::as_scalar)
                        .map(str::to_string),
                    children: tags.series.keys().cloned().collect(),
                });
            }
            if series {
                for (series_name, series_tags) in &tags.series {
                    if criteria.matches_tags(series_tags) {
                        out.push(CatalogItem {
                            repository_name: self.name.clone(),
                            object_name: series_name.clone(),
                            object_type: ObjectType::Series,
                            object_tags: series_tags.clone(),
                            parent: Some(dataset_name.clone()),
                            children: Vec::new(),
                        });
                    }
                }
            }
        }
        debug!(
            "REPOSITORY {}: {} {} match {criteria:?}",
            self.name,
            out.len(),
            describe(datasets, series)
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::test_util::{at_batch, month_start};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn repo(tmp: &TempDir) -> Repository {
        Repository::new(
            "test",
            tmp.path().join("data"),
            tmp.path().join("meta"),
            BackendKind::Flat,
        )
    }

    #[test]
    fn load_of_unsaved_dataset_is_empty() -> TestResult {
        let tmp = TempDir::new()?;
        let ds = repo(&tmp).load("ghost", SeriesType::simple(), LoadOptions::default())?;
        assert!(ds.is_empty());
        assert!(ds.tags.series.is_empty());
        assert_eq!(ds.tags.name(), Some("ghost"));
        Ok(())
    }

    #[test]
    fn unversioned_load_needs_no_options() -> TestResult {
        let tmp = TempDir::new()?;
        let repo = repo(&tmp);
        let rows = at_batch(&[month_start(2024, 1)], &[("a", vec![1.0])]);
        repo.save(&Dataset::for_type("s", SeriesType::simple(), None, rows)?)?;
        let ds = repo.load("s", SeriesType::simple(), LoadOptions::default())?;
        assert_eq!(ds.data.num_rows(), 1);
        assert_eq!(ds.series(), vec!["a"]);
        Ok(())
    }

    #[test]
    fn as_of_without_versions_is_an_error() -> TestResult {
        let tmp = TempDir::new()?;
        let result = repo(&tmp).load("e", SeriesType::estimate(), LoadOptions::default());
        assert!(matches!(result, Err(RepositoryError::NoVersions { .. })));
        Ok(())
    }

    #[test]
    fn supplied_tags_win() -> TestResult {
        let tmp = TempDir::new()?;
        let repo = repo(&tmp);
        let rows = at_batch(&[month_start(2024, 1)], &[("a", vec![1.0])]);
        let ds = Dataset::for_type("s", SeriesType::simple(), None, rows)?
            .with_attributes(&crate::tags::tag_dict([("unit", "NOK")]));
        repo.save(&ds)?;

        let mut supplied = DatasetTags::default();
        supplied
            .attributes
            .insert("unit".into(), TagValue::from("EUR"));
        let loaded = repo.load("s", SeriesType::simple(), LoadOptions::default().tags(supplied))?;
        assert_eq!(loaded.tags.attributes["unit"], TagValue::from("EUR"));
        assert_eq!(loaded.tags.series["a"]["unit"], TagValue::from("NOK"));
        Ok(())
    }

    #[test]
    fn catalog_document_matches_embedded_tags() -> TestResult {
        let tmp = TempDir::new()?;
        let repo = repo(&tmp);
        let rows = at_batch(&[month_start(2024, 1)], &[("a", vec![1.0])]);
        repo.save(
            &Dataset::for_type("s", SeriesType::simple(), None, rows)?
                .with_attributes(&crate::tags::tag_dict([("unit", "NOK")])),
        )?;
        let more = at_batch(&[month_start(2024, 2)], &[("b", vec![2.0])]);
        repo.save(&Dataset::for_type("s", SeriesType::simple(), None, more)?)?;

        let handler = repo.handler("s", SeriesType::simple(), VersionMarker::Latest)?;
        let embedded = handler.read_tags()?;
        let document = repo.metadata().read("s")?;
        assert_eq!(document, embedded);
        let Some(document) = document else {
            panic!("catalog document written");
        };
        assert_eq!(document.series_names(), vec!["a", "b"]);
        assert_eq!(document.attributes["unit"], TagValue::from("NOK"));
        Ok(())
    }

    #[test]
    fn unreadable_catalog_documents_are_skipped() -> TestResult {
        let tmp = TempDir::new()?;
        let repo = repo(&tmp);
        let rows = at_batch(&[month_start(2024, 1)], &[("a", vec![1.0])]);
        repo.save(&Dataset::for_type("good", SeriesType::simple(), None, rows)?)?;
        std::fs::write(tmp.path().join("meta/broken-metadata.json"), "{not json")?;
        std::fs::write(tmp.path().join("meta/odd-metadata.json"), r#"["a list"]"#)?;

        let found = repo.datasets(&SearchCriteria::new())?;
        let names: Vec<_> = found.iter().map(|i| i.object_name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
        assert_eq!(repo.count(None, &SearchCriteria::new())?, 2);
        Ok(())
    }
}
