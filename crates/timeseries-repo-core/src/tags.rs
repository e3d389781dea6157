//! Tag values, dataset/series tag documents, and tag maintenance.
//!
//! Tags are string-keyed attributes attached to a dataset and to each of its
//! series. A tag value is either a single string or a sorted set of strings;
//! a set with one member is always stored as the plain string.
//!
//! Dataset attributes are copied into series tags once, when series are
//! (re)tagged. Later dataset-level edits reach the series only when the caller
//! asks for it with [`Propagation::Propagate`].

pub mod codec;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::series_type::SeriesType;

/// Key of the dataset name attribute.
pub const NAME_KEY: &str = "name";
/// Key of the owning dataset in series tags.
pub const DATASET_KEY: &str = "dataset";
/// Key of the series map in a serialised dataset tag document.
pub const SERIES_KEY: &str = "series";
/// Key of the versioning attribute.
pub const VERSIONING_KEY: &str = "versioning";
/// Key of the temporality attribute.
pub const TEMPORALITY_KEY: &str = "temporality";

/// A tag value: one string, or a sorted set of two or more strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagValue {
    /// A single value.
    Scalar(String),
    /// Two or more distinct values, sorted.
    Set(Vec<String>),
}

impl TagValue {
    /// Build a value from any collection of strings.
    ///
    /// Values are sorted and deduplicated; one distinct value collapses to
    /// [`TagValue::Scalar`]. Returns `None` for an empty collection.
    pub fn from_values<I, S>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        let mut items: Vec<String> = set.into_iter().collect();
        match items.len() {
            0 => None,
            1 => items.pop().map(TagValue::Scalar),
            _ => Some(TagValue::Set(items)),
        }
    }

    /// All member values, sorted.
    pub fn values(&self) -> Vec<&str> {
        match self {
            TagValue::Scalar(v) => vec![v.as_str()],
            TagValue::Set(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// The single value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            TagValue::Scalar(v) => Some(v),
            TagValue::Set(_) => None,
        }
    }

    /// Whether `value` is a member.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            TagValue::Scalar(v) => v == value,
            TagValue::Set(vs) => vs.binary_search_by(|v| v.as_str().cmp(value)).is_ok(),
        }
    }

    /// Set union of two values.
    pub fn union(&self, other: &TagValue) -> TagValue {
        let merged = self.values().into_iter().chain(other.values());
        TagValue::from_values(merged).unwrap_or_else(|| self.clone())
    }

    /// Members of `self` not in `other`, or `None` if nothing remains.
    pub fn difference(&self, other: &TagValue) -> Option<TagValue> {
        TagValue::from_values(self.values().into_iter().filter(|v| !other.contains(v)))
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Scalar(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Scalar(v)
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagValue::Scalar(v) => serializer.serialize_str(v),
            TagValue::Set(vs) => serializer.collect_seq(vs),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTagValue {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for TagValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawTagValue::deserialize(deserializer)? {
            RawTagValue::One(v) => Ok(TagValue::Scalar(v)),
            RawTagValue::Many(vs) => TagValue::from_values(vs)
                .ok_or_else(|| serde::de::Error::custom("tag value list must not be empty")),
        }
    }
}

/// Flat mapping from tag key to value.
pub type TagDict = BTreeMap<String, TagValue>;

/// Build a [`TagDict`] from `(key, value)` pairs.
pub fn tag_dict<K, V, I>(pairs: I) -> TagDict
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<TagValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Whether dataset-level edits are also applied to every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Only the dataset attributes change.
    DatasetOnly,
    /// The same edit is applied to every series' tags.
    Propagate,
}

/// One criteria dictionary, or several of which any may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagCriteria {
    /// All keys must match.
    All(TagDict),
    /// At least one of the dictionaries must match; an empty list matches
    /// nothing.
    Any(Vec<TagDict>),
}

impl TagCriteria {
    /// Whether `tags` satisfies these criteria.
    pub fn matches(&self, tags: &TagDict) -> bool {
        match self {
            TagCriteria::All(criteria) => matches_criteria(tags, criteria),
            TagCriteria::Any(list) => list.iter().any(|c| matches_criteria(tags, c)),
        }
    }
}

impl From<TagDict> for TagCriteria {
    fn from(d: TagDict) -> Self {
        TagCriteria::All(d)
    }
}

/// Check `tags` against one criteria dictionary.
///
/// Every criteria key must be present. A scalar criterion requires an equal
/// value; a set criterion also accepts any single member.
pub fn matches_criteria(tags: &TagDict, criteria: &TagDict) -> bool {
    criteria.iter().all(|(key, wanted)| match tags.get(key) {
        None => false,
        Some(actual) => match (wanted, actual) {
            (TagValue::Set(options), TagValue::Scalar(v)) => {
                options.binary_search(v).is_ok()
            }
            _ => actual == wanted,
        },
    })
}

/// Union `additions` into `existing`, value by value.
pub fn add_tag_values(existing: &TagDict, additions: &TagDict) -> TagDict {
    let mut out = existing.clone();
    for (key, value) in additions {
        let merged = match out.get(key) {
            Some(old) => old.union(value),
            None => value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    out
}

/// Remove the given values; keys left without values are dropped.
pub fn remove_tag_values(existing: &TagDict, removals: &TagDict) -> TagDict {
    let mut out = existing.clone();
    for (key, value) in removals {
        if let Some(old) = out.get(key) {
            match old.difference(value) {
                Some(rest) => out.insert(key.clone(), rest),
                None => out.remove(key),
            };
        }
    }
    out
}

/// Remove whole keys.
pub fn remove_tags<S: AsRef<str>>(existing: &TagDict, keys: &[S]) -> TagDict {
    let mut out = existing.clone();
    for key in keys {
        out.remove(key.as_ref());
    }
    out
}

/// If `existing` contains every value in `old`, swap them for `new`.
///
/// Otherwise `existing` is returned unchanged.
pub fn replace_tag_values(existing: &TagDict, old: &TagDict, new: &TagDict) -> TagDict {
    let holds_all = old.iter().all(|(key, value)| {
        existing
            .get(key)
            .is_some_and(|have| value.values().iter().all(|v| have.contains(v)))
    });
    if !holds_all {
        return existing.clone();
    }
    add_tag_values(&remove_tag_values(existing, old), new)
}

/// Tags of a dataset and of each of its series.
///
/// Serialises as one JSON object: the dataset attributes at top level and the
/// per-series dictionaries under `"series"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTags {
    /// Dataset-level attributes.
    #[serde(flatten)]
    pub attributes: TagDict,
    /// Per-series tags, keyed by series (column) name.
    #[serde(default)]
    pub series: BTreeMap<String, TagDict>,
}

impl DatasetTags {
    /// Tags every dataset starts from.
    ///
    /// `{name, versioning, temporality, series: {s: {dataset: name, name: s}}}`
    pub fn defaults<S: AsRef<str>>(name: &str, data_type: SeriesType, series: &[S]) -> Self {
        let attributes = tag_dict([
            (NAME_KEY, name.to_string()),
            (VERSIONING_KEY, data_type.versioning.to_string()),
            (TEMPORALITY_KEY, data_type.temporality.to_string()),
        ]);
        let series = series
            .iter()
            .map(|s| {
                let s = s.as_ref();
                (
                    s.to_string(),
                    tag_dict([(DATASET_KEY, name), (NAME_KEY, s)]),
                )
            })
            .collect();
        Self { attributes, series }
    }

    /// Overlay `other` on `self`, key by key; `other` wins on conflicts.
    pub fn layer(mut self, other: &DatasetTags) -> Self {
        self.attributes
            .extend(other.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (series, tags) in &other.series {
            let entry = self.series.entry(series.clone()).or_default();
            entry.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self
    }

    /// The dataset name attribute, if set.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(NAME_KEY).and_then(TagValue::as_scalar)
    }

    /// Series names, sorted.
    pub fn series_names(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    /// Drop tags of series that are not among `columns`.
    pub fn retain_series<S: AsRef<str>>(&mut self, columns: &[S]) {
        self.series
            .retain(|s, _| columns.iter().any(|c| c.as_ref() == s));
    }

    /// Attributes a series inherits from its dataset.
    ///
    /// The dataset's `name` becomes the series' `dataset` key.
    pub fn inherited_series_tags(&self) -> TagDict {
        let mut out: TagDict = self
            .attributes
            .iter()
            .filter(|(k, _)| k.as_str() != NAME_KEY && k.as_str() != SERIES_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(name) = self.name() {
            out.insert(DATASET_KEY.to_string(), TagValue::from(name));
        }
        out
    }

    /// Add values to dataset attributes.
    pub fn tag_dataset(&mut self, tags: &TagDict, propagation: Propagation) {
        self.attributes = add_tag_values(&self.attributes, tags);
        if propagation == Propagation::Propagate {
            for series_tags in self.series.values_mut() {
                *series_tags = add_tag_values(series_tags, tags);
            }
        }
    }

    /// Rebuild tags for the named series (all series when `names` is `None`).
    ///
    /// Each series gets `{name}` plus the inherited dataset attributes, with
    /// `tags` overriding both.
    pub fn tag_series<S: AsRef<str>>(&mut self, names: Option<&[S]>, tags: &TagDict) {
        let inherited = self.inherited_series_tags();
        let targets: Vec<String> = match names {
            Some(names) => names.iter().map(|n| n.as_ref().to_string()).collect(),
            None => self.series.keys().cloned().collect(),
        };
        for name in targets {
            let mut fresh = tag_dict([(NAME_KEY, name.as_str())]);
            fresh.extend(inherited.iter().map(|(k, v)| (k.clone(), v.clone())));
            fresh.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            self.series.insert(name, fresh);
        }
    }

    /// Remove whole keys and individual values from dataset attributes.
    pub fn detag_dataset<S: AsRef<str>>(
        &mut self,
        keys: &[S],
        values: &TagDict,
        propagation: Propagation,
    ) {
        self.attributes = remove_tag_values(&remove_tags(&self.attributes, keys), values);
        if propagation == Propagation::Propagate {
            for series_tags in self.series.values_mut() {
                *series_tags = remove_tag_values(&remove_tags(series_tags, keys), values);
            }
        }
    }

    /// Remove whole keys and individual values from every series.
    pub fn detag_series<S: AsRef<str>>(&mut self, keys: &[S], values: &TagDict) {
        for series_tags in self.series.values_mut() {
            *series_tags = remove_tag_values(&remove_tags(series_tags, keys), values);
        }
    }

    /// Swap `old` values for `new` wherever all of `old` is present.
    pub fn replace_tags(&mut self, old: &TagDict, new: &TagDict, propagation: Propagation) {
        self.attributes = replace_tag_values(&self.attributes, old, new);
        if propagation == Propagation::Propagate {
            for series_tags in self.series.values_mut() {
                *series_tags = replace_tag_values(series_tags, old, new);
            }
        }
    }

    /// Derive series tags from the parts of their names.
    ///
    /// Each series name is split on `separator` and the parts are assigned to
    /// `attributes` in order. Series whose names have a different number of
    /// parts are left untouched; their names are returned.
    pub fn series_names_to_tags<S: AsRef<str>>(
        &mut self,
        attributes: &[S],
        separator: &str,
    ) -> Vec<String> {
        let mut skipped = Vec::new();
        for (series, tags) in self.series.iter_mut() {
            let parts: Vec<&str> = series.split(separator).collect();
            if parts.len() != attributes.len() {
                skipped.push(series.clone());
                continue;
            }
            for (attr, part) in attributes.iter().zip(parts) {
                tags.insert(attr.as_ref().to_string(), TagValue::from(part));
            }
        }
        skipped
    }

    /// Series whose tags satisfy `criteria`, sorted by name.
    pub fn search_series(&self, criteria: &TagCriteria) -> Vec<&str> {
        self.series
            .iter()
            .filter(|(_, tags)| criteria.matches(tags))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> TagValue {
        TagValue::from_values(values.iter().copied()).unwrap_or_else(|| TagValue::from(""))
    }

    #[test]
    fn singleton_sets_collapse() {
        assert_eq!(set(&["a"]), TagValue::from("a"));
        assert_eq!(set(&["b", "a", "b"]), TagValue::Set(vec!["a".into(), "b".into()]));
        assert_eq!(TagValue::from_values(Vec::<String>::new()), None);
    }

    #[test]
    fn serde_shape_is_string_or_list() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&TagValue::from("x"))?, r#""x""#);
        assert_eq!(serde_json::to_string(&set(&["y", "x"]))?, r#"["x","y"]"#);
        let v: TagValue = serde_json::from_str(r#"["z"]"#)?;
        assert_eq!(v, TagValue::from("z"));
        assert!(serde_json::from_str::<TagValue>("[]").is_err());
        Ok(())
    }

    #[test]
    fn criteria_ands_keys_and_ors_list_values() {
        let tags = tag_dict([("unit", "NOK"), ("freq", "M")]);
        assert!(matches_criteria(&tags, &tag_dict([("unit", "NOK")])));
        assert!(matches_criteria(
            &tags,
            &tag_dict([("unit", set(&["NOK", "EUR"])), ("freq", TagValue::from("M"))])
        ));
        assert!(!matches_criteria(
            &tags,
            &tag_dict([("unit", "NOK"), ("freq", "Q")])
        ));
        assert!(!matches_criteria(&tags, &tag_dict([("missing", "x")])));
        assert!(matches_criteria(&tags, &TagDict::new()));

        let any = TagCriteria::Any(vec![
            tag_dict([("freq", "Q")]),
            tag_dict([("unit", "NOK")]),
        ]);
        assert!(any.matches(&tags));
        assert!(!TagCriteria::Any(Vec::new()).matches(&tags));
    }

    #[test]
    fn add_and_remove_values() {
        let base = tag_dict([("about", "GDP")]);
        let added = add_tag_values(&base, &tag_dict([("about", "growth"), ("unit", "NOK")]));
        assert_eq!(added["about"], set(&["GDP", "growth"]));
        assert_eq!(added["unit"], TagValue::from("NOK"));

        let removed = remove_tag_values(&added, &tag_dict([("about", "GDP"), ("unit", "NOK")]));
        assert_eq!(removed["about"], TagValue::from("growth"));
        assert!(!removed.contains_key("unit"));

        let dropped = remove_tags(&added, &["about"]);
        assert_eq!(dropped.len(), 1);
    }

    #[test]
    fn replace_requires_all_old_values() {
        let base = tag_dict([("about", set(&["GDP", "growth"]))]);
        let replaced = replace_tag_values(
            &base,
            &tag_dict([("about", "GDP")]),
            &tag_dict([("about", "BNP")]),
        );
        assert_eq!(replaced["about"], set(&["BNP", "growth"]));

        let untouched = replace_tag_values(
            &base,
            &tag_dict([("about", "inflation")]),
            &tag_dict([("about", "BNP")]),
        );
        assert_eq!(untouched, base);
    }

    #[test]
    fn defaults_and_layering() {
        let defaults = DatasetTags::defaults("gdp", SeriesType::simple(), &["a", "b"]);
        assert_eq!(defaults.name(), Some("gdp"));
        assert_eq!(defaults.attributes["versioning"], TagValue::from("NONE"));
        assert_eq!(defaults.attributes["temporality"], TagValue::from("AT"));
        assert_eq!(defaults.series["a"]["dataset"], TagValue::from("gdp"));
        assert_eq!(defaults.series["b"]["name"], TagValue::from("b"));

        let mut stored = DatasetTags::default();
        stored.attributes.insert("unit".into(), "NOK".into());
        stored
            .series
            .insert("a".into(), tag_dict([("unit", "EUR")]));
        let mut supplied = DatasetTags::default();
        supplied.attributes.insert("unit".into(), "USD".into());

        let layered = defaults.layer(&stored).layer(&supplied);
        assert_eq!(layered.attributes["unit"], TagValue::from("USD"));
        assert_eq!(layered.series["a"]["unit"], TagValue::from("EUR"));
        assert_eq!(layered.series["a"]["name"], TagValue::from("a"));
    }

    #[test]
    fn propagation_is_explicit() {
        let mut tags = DatasetTags::defaults("gdp", SeriesType::simple(), &["a"]);
        tags.tag_dataset(&tag_dict([("unit", "NOK")]), Propagation::DatasetOnly);
        assert!(!tags.series["a"].contains_key("unit"));

        tags.tag_dataset(&tag_dict([("source", "ssb")]), Propagation::Propagate);
        assert_eq!(tags.series["a"]["source"], TagValue::from("ssb"));

        tags.detag_dataset(&["source"], &TagDict::new(), Propagation::DatasetOnly);
        assert!(!tags.attributes.contains_key("source"));
        assert!(tags.series["a"].contains_key("source"));

        tags.detag_dataset(&["source"], &TagDict::new(), Propagation::Propagate);
        assert!(!tags.series["a"].contains_key("source"));
    }

    #[test]
    fn tag_series_inherits_dataset_attributes() {
        let mut tags = DatasetTags::defaults("gdp", SeriesType::simple(), &["a", "b"]);
        tags.tag_dataset(&tag_dict([("unit", "NOK")]), Propagation::DatasetOnly);
        tags.tag_series(Some(&["a"][..]), &tag_dict([("color", "red")]));
        let a = &tags.series["a"];
        assert_eq!(a["unit"], TagValue::from("NOK"));
        assert_eq!(a["dataset"], TagValue::from("gdp"));
        assert_eq!(a["color"], TagValue::from("red"));
        assert_eq!(a["versioning"], TagValue::from("NONE"));
        assert!(!a.contains_key("series"));
        assert!(!tags.series["b"].contains_key("color"));
    }

    #[test]
    fn names_split_into_attributes() {
        let mut tags =
            DatasetTags::defaults("trade", SeriesType::simple(), &["no_exp", "se_imp", "total"]);
        let skipped = tags.series_names_to_tags(&["country", "flow"], "_");
        assert_eq!(skipped, vec!["total".to_string()]);
        assert_eq!(tags.series["se_imp"]["country"], TagValue::from("se"));
        assert_eq!(tags.series["se_imp"]["flow"], TagValue::from("imp"));

        let found = tags.search_series(&tag_dict([("flow", "exp")]).into());
        assert_eq!(found, vec!["no_exp"]);
    }

    #[test]
    fn dataset_tags_serialise_flat_with_series() -> Result<(), serde_json::Error> {
        let tags = DatasetTags::defaults("x", SeriesType::estimate(), &["s"]);
        let json = serde_json::to_value(&tags)?;
        assert_eq!(json["name"], "x");
        assert_eq!(json["versioning"], "AS_OF");
        assert_eq!(json["series"]["s"]["dataset"], "x");
        let back: DatasetTags = serde_json::from_value(json)?;
        assert_eq!(back, tags);
        Ok(())
    }
}
