//! JSON metadata catalog: one `<name>-metadata.json` document per dataset.
//!
//! The document is the dataset's full tag tree,
//! `{"name", "versioning", "temporality", ..., "series": {...}}`, with every
//! typed marker sanitised to a string. Catalog searches only ever scan this
//! directory; they never open data files.

use std::path::PathBuf;

use log::{debug, info};
use snafu::prelude::*;

use crate::{
    error::validate_dataset_name,
    io::{CodecSnafu, HandlerResult, StorageSnafu},
    series_type::SeriesType,
    storage::{self, StorageLocation, layout},
    tags::{
        DatasetTags, TEMPORALITY_KEY, VERSIONING_KEY,
        codec::{JsonSnafu, TagNode},
    },
};

/// Reads and writes catalog documents under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStore {
    location: StorageLocation,
}

impl MetadataStore {
    /// A store rooted at `location`.
    pub fn new(location: StorageLocation) -> Self {
        Self { location }
    }

    /// The catalog root.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    fn document(name: &str) -> PathBuf {
        PathBuf::from(layout::metadata_file_name(name))
    }

    /// Replace the catalog document of dataset `name`.
    pub fn write(&self, name: &str, data_type: SeriesType, tags: &DatasetTags) -> HandlerResult<()> {
        validate_dataset_name(name)?;
        let mut node = TagNode::from(tags);
        if let TagNode::Map(map) = &mut node {
            map.insert(
                VERSIONING_KEY.to_string(),
                TagNode::Versioning(data_type.versioning),
            );
            map.insert(
                TEMPORALITY_KEY.to_string(),
                TagNode::Temporality(data_type.temporality),
            );
        }
        let json = serde_json::to_vec_pretty(&node.sanitize())
            .context(JsonSnafu)
            .context(CodecSnafu { dataset: name })?;

        let path = Self::document(name);
        storage::write_atomic(&self.location, &path, &json).context(StorageSnafu { dataset: name })?;
        info!("DATASET {name}: wrote metadata to {}", path.display());
        Ok(())
    }

    /// The catalog document of dataset `name`, or `None` if there is none.
    pub fn read(&self, name: &str) -> HandlerResult<Option<DatasetTags>> {
        validate_dataset_name(name)?;
        let path = Self::document(name);
        let text = match storage::read_to_string(&self.location, &path) {
            Ok(text) => text,
            Err(e) if e.is_not_found() => {
                debug!("DATASET {name}: no metadata at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e).context(StorageSnafu { dataset: name }),
        };
        let node: TagNode = serde_json::from_str(&text)
            .context(JsonSnafu)
            .context(CodecSnafu { dataset: name })?;
        let tags = DatasetTags::try_from(&node).context(CodecSnafu { dataset: name })?;
        Ok(Some(tags))
    }

    /// Whether a catalog document exists for dataset `name`.
    pub fn exists(&self, name: &str) -> HandlerResult<bool> {
        storage::exists(&self.location, &Self::document(name)).context(StorageSnafu { dataset: name })
    }

    /// Names of catalogued datasets, sorted.
    ///
    /// A non-empty `equals` selects that exact name; otherwise a non-empty
    /// `contains` keeps names containing it.
    pub fn list(&self, equals: &str, contains: &str) -> HandlerResult<Vec<String>> {
        let entries = storage::list_dir(&self.location, std::path::Path::new(""))
            .context(StorageSnafu { dataset: "*" })?;
        let names = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| layout::dataset_name_from_metadata_file(&e.name))
            .filter(|n| {
                if !equals.is_empty() {
                    *n == equals
                } else {
                    n.contains(contains)
                }
            })
            .map(str::to_string)
            .collect();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{TagValue, tag_dict};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn document_round_trips_and_carries_type() -> TestResult {
        let tmp = TempDir::new()?;
        let store = MetadataStore::new(StorageLocation::local(tmp.path()));
        let mut tags = DatasetTags::defaults("gdp", SeriesType::estimate(), &["a"]);
        tags.attributes
            .insert("about".into(), TagValue::from("growth"));

        store.write("gdp", SeriesType::estimate(), &tags)?;
        assert!(store.exists("gdp")?);

        let text = std::fs::read_to_string(tmp.path().join("gdp-metadata.json"))?;
        let doc: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(doc["versioning"], "AS_OF");
        assert_eq!(doc["temporality"], "AT");
        assert_eq!(doc["series"]["a"]["dataset"], "gdp");

        assert_eq!(store.read("gdp")?, Some(tags));
        assert_eq!(store.read("other")?, None);
        Ok(())
    }

    #[test]
    fn equals_is_exact_and_contains_is_substring() -> TestResult {
        let tmp = TempDir::new()?;
        let store = MetadataStore::new(StorageLocation::local(tmp.path()));
        for name in ["x", "xy", "z"] {
            let mut tags = DatasetTags::defaults(name, SeriesType::simple(), &["s"]);
            tags.tag_dataset(&tag_dict([("k", "v")]), crate::tags::Propagation::DatasetOnly);
            store.write(name, SeriesType::simple(), &tags)?;
        }
        std::fs::write(tmp.path().join("notes.txt"), "ignored")?;

        assert_eq!(store.list("x", "")?, vec!["x"]);
        assert_eq!(store.list("", "x")?, vec!["x", "xy"]);
        assert_eq!(store.list("", "")?.len(), 3);
        Ok(())
    }
}
