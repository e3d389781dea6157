//! In-memory datasets: rows plus tags, addressed by name, type and version.

use arrow::array::RecordBatch;
use chrono::{DateTime, Utc};

use crate::{
    error::{ConfigurationError, validate_dataset_name},
    frame,
    series_type::SeriesType,
    tags::{DatasetTags, Propagation, TagCriteria, TagDict},
    version::VersionMarker,
};

/// A named dataset held in memory.
///
/// `tags.series` starts with one entry per series column of `data`, each
/// inheriting the dataset attributes present at construction. Later edits to
/// dataset attributes reach the series only with [`Propagation::Propagate`].
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Dataset name; also the file and catalog key.
    pub name: String,
    /// Declared series type.
    pub data_type: SeriesType,
    /// The version these rows belong to.
    pub version: VersionMarker,
    /// Rows: date columns followed by series columns.
    pub data: RecordBatch,
    /// Dataset and series tags.
    pub tags: DatasetTags,
}

impl Dataset {
    /// A dataset with default tags for the series columns of `data`.
    pub fn new(
        name: &str,
        data_type: SeriesType,
        version: VersionMarker,
        data: RecordBatch,
    ) -> Result<Self, ConfigurationError> {
        validate_dataset_name(name)?;
        version.check_fits(data_type)?;
        let series = frame::series_columns(&data, &data_type.date_columns());
        Ok(Self {
            name: name.to_string(),
            data_type,
            version,
            data,
            tags: DatasetTags::defaults(name, data_type, &series),
        })
    }

    /// Like [`Dataset::new`], resolving the version from an optional `as_of`.
    ///
    /// AS_OF datasets require the timestamp; NONE datasets ignore it.
    pub fn for_type(
        name: &str,
        data_type: SeriesType,
        as_of: Option<DateTime<Utc>>,
        data: RecordBatch,
    ) -> Result<Self, ConfigurationError> {
        let version = VersionMarker::for_type(name, data_type, as_of)?;
        Self::new(name, data_type, version, data)
    }

    /// Overlay `tags` on the current tags, then re-inherit into every series.
    ///
    /// Use this to set attributes at creation time; it is the only place
    /// dataset attributes reach the series implicitly.
    pub fn with_attributes(mut self, attributes: &TagDict) -> Self {
        self.tags.attributes.extend(
            attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.tags.tag_series(None::<&[String]>, &TagDict::new());
        self
    }

    /// Replace the tags wholesale, keeping only entries for present series.
    pub fn with_tags(mut self, tags: DatasetTags) -> Self {
        let series = self.series();
        self.tags = tags;
        self.tags.retain_series(&series);
        self
    }

    /// Series (non-date) column names, in column order.
    pub fn series(&self) -> Vec<String> {
        frame::series_columns(&self.data, &self.data_type.date_columns())
    }

    /// The `as_of` timestamp of an AS_OF dataset.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.version.as_of()
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.num_rows() == 0
    }

    /// Add values to the dataset attributes.
    pub fn tag_dataset(&mut self, tags: &TagDict, propagation: Propagation) {
        self.tags.tag_dataset(tags, propagation);
    }

    /// Rebuild tags of the named series, or all series for `None`.
    ///
    /// Names that are not series columns of this dataset are ignored.
    pub fn tag_series<S: AsRef<str>>(&mut self, names: Option<&[S]>, tags: &TagDict) {
        let present = self.series();
        match names {
            Some(names) => {
                let known: Vec<&str> = names
                    .iter()
                    .map(AsRef::as_ref)
                    .filter(|n| present.iter().any(|p| p == n))
                    .collect();
                self.tags.tag_series(Some(&known[..]), tags);
            }
            None => self.tags.tag_series(Some(&present[..]), tags),
        }
    }

    /// Remove keys and values from the dataset attributes.
    pub fn detag_dataset<S: AsRef<str>>(
        &mut self,
        keys: &[S],
        values: &TagDict,
        propagation: Propagation,
    ) {
        self.tags.detag_dataset(keys, values, propagation);
    }

    /// Remove keys and values from every series.
    pub fn detag_series<S: AsRef<str>>(&mut self, keys: &[S], values: &TagDict) {
        self.tags.detag_series(keys, values);
    }

    /// Swap `old` tag values for `new`.
    pub fn replace_tags(&mut self, old: &TagDict, new: &TagDict, propagation: Propagation) {
        self.tags.replace_tags(old, new, propagation);
    }

    /// Derive series tags from name parts; returns the names that did not fit.
    pub fn series_names_to_tags<S: AsRef<str>>(
        &mut self,
        attributes: &[S],
        separator: &str,
    ) -> Vec<String> {
        self.tags.series_names_to_tags(attributes, separator)
    }

    /// Series whose tags match `criteria`.
    pub fn search_series(&self, criteria: &TagCriteria) -> Vec<&str> {
        self.tags.search_series(criteria)
    }
}

/// Options for [`crate::Repository::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Version timestamp of an AS_OF dataset; the newest when unset.
    pub as_of: Option<DateTime<Utc>>,
    /// Version label of a NAMES dataset; the last alphabetically when unset.
    pub version_name: Option<String>,
    /// Tags layered over the stored ones.
    pub tags: Option<DatasetTags>,
}

impl LoadOptions {
    /// Load a specific AS_OF version.
    pub fn as_of(mut self, ts: DateTime<Utc>) -> Self {
        self.as_of = Some(ts);
        self
    }

    /// Load a specific NAMES version.
    pub fn version_name(mut self, label: impl Into<String>) -> Self {
        self.version_name = Some(label.into());
        self
    }

    /// Layer `tags` over the stored tags.
    pub fn tags(mut self, tags: DatasetTags) -> Self {
        self.tags = Some(tags);
        self
    }
}
