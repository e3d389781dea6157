//! Embedding tags into Parquet key-value metadata.
//!
//! Tags travel as a UTF-8 JSON blob under the [`TAGS_METADATA_KEY`] key: the
//! dataset attributes at file (schema) level, and each series' tags on that
//! series' column. Tag trees built in code may hold typed markers (series
//! types, timestamps); [`TagNode::sanitize`] turns those into plain strings
//! before anything is serialised.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::prelude::*;

use crate::{
    dates::utc_rfc3339,
    error::ConfigurationError,
    series_type::{SeriesType, Temporality, Versioning},
    tags::{DatasetTags, SERIES_KEY, TagDict, TagValue},
};

/// Metadata key holding the JSON-encoded tags.
pub const TAGS_METADATA_KEY: &str = "json";

/// Errors from encoding or decoding embedded tags.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TagCodecError {
    /// The tags cannot be persisted as given.
    #[snafu(display("Invalid tags: {source}"))]
    Invalid {
        /// Underlying configuration error.
        source: ConfigurationError,
    },

    /// JSON (de)serialisation failed.
    #[snafu(display("Tag JSON error: {source}"))]
    Json {
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// Metadata lacks the tag key.
    #[snafu(display("Metadata has no {key:?} entry"))]
    MissingKey {
        /// The missing key.
        key: String,
    },

    /// The decoded tree does not have the shape of a tag document.
    #[snafu(display("Unexpected tag structure at {path}: {detail}"))]
    Shape {
        /// Location inside the tree.
        path: String,
        /// What was found instead.
        detail: String,
    },
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, TagCodecError>;

/// A loosely-typed tag tree.
///
/// Only `Text`, `List` and `Map` survive serialisation; the remaining
/// variants are markers for values that still carry their Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagNode {
    /// A string.
    Text(String),
    /// An ordered list.
    List(Vec<TagNode>),
    /// A string-keyed map.
    Map(BTreeMap<String, TagNode>),
    /// A series type marker.
    SeriesType(SeriesType),
    /// A versioning marker.
    Versioning(Versioning),
    /// A temporality marker.
    Temporality(Temporality),
    /// A UTC timestamp marker.
    Timestamp(DateTime<Utc>),
}

impl TagNode {
    /// A copy with every marker replaced by its string form.
    ///
    /// Applying it twice gives the same tree as applying it once.
    pub fn sanitize(&self) -> TagNode {
        match self {
            TagNode::Text(s) => TagNode::Text(s.clone()),
            TagNode::List(items) => TagNode::List(items.iter().map(TagNode::sanitize).collect()),
            TagNode::Map(map) => TagNode::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.sanitize()))
                    .collect(),
            ),
            TagNode::SeriesType(t) => TagNode::Text(t.to_string()),
            TagNode::Versioning(v) => TagNode::Text(v.to_string()),
            TagNode::Temporality(t) => TagNode::Text(t.to_string()),
            TagNode::Timestamp(ts) => TagNode::Text(utc_rfc3339(ts)),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            TagNode::Text(_) => "a string",
            TagNode::List(_) => "a list",
            TagNode::Map(_) => "a map",
            _ => "a typed marker",
        }
    }
}

impl Serialize for TagNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagNode::Text(s) => serializer.serialize_str(s),
            TagNode::List(items) => serializer.collect_seq(items),
            TagNode::Map(map) => serializer.collect_map(map),
            marker => marker.sanitize().serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNode {
    Text(String),
    List(Vec<RawNode>),
    Map(BTreeMap<String, RawNode>),
}

impl From<RawNode> for TagNode {
    fn from(raw: RawNode) -> Self {
        match raw {
            RawNode::Text(s) => TagNode::Text(s),
            RawNode::List(items) => TagNode::List(items.into_iter().map(Into::into).collect()),
            RawNode::Map(map) => {
                TagNode::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl<'de> Deserialize<'de> for TagNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawNode::deserialize(deserializer).map(Into::into)
    }
}

impl From<&TagValue> for TagNode {
    fn from(v: &TagValue) -> Self {
        match v {
            TagValue::Scalar(s) => TagNode::Text(s.clone()),
            TagValue::Set(vs) => TagNode::List(vs.iter().cloned().map(TagNode::Text).collect()),
        }
    }
}

impl From<&TagDict> for TagNode {
    fn from(d: &TagDict) -> Self {
        TagNode::Map(d.iter().map(|(k, v)| (k.clone(), v.into())).collect())
    }
}

impl From<&DatasetTags> for TagNode {
    fn from(tags: &DatasetTags) -> Self {
        let mut map: BTreeMap<String, TagNode> = tags
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.into()))
            .collect();
        let series = tags
            .series
            .iter()
            .map(|(k, v)| (k.clone(), TagNode::from(v)))
            .collect();
        map.insert(SERIES_KEY.to_string(), TagNode::Map(series));
        TagNode::Map(map)
    }
}

fn value_from_node(node: &TagNode, path: &str) -> CodecResult<TagValue> {
    match node.sanitize() {
        TagNode::Text(s) => Ok(TagValue::Scalar(s)),
        TagNode::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    TagNode::Text(s) => values.push(s),
                    other => {
                        return ShapeSnafu {
                            path: format!("{path}[{idx}]"),
                            detail: format!("expected a string, found {}", other.describe()),
                        }
                        .fail();
                    }
                }
            }
            TagValue::from_values(values).context(ShapeSnafu {
                path,
                detail: "empty list",
            })
        }
        other => ShapeSnafu {
            path,
            detail: format!("expected a string or list, found {}", other.describe()),
        }
        .fail(),
    }
}

/// Interpret a tree as a flat tag dictionary.
pub fn dict_from_node(node: &TagNode, path: &str) -> CodecResult<TagDict> {
    match node {
        TagNode::Map(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), value_from_node(v, &format!("{path}.{k}"))?)))
            .collect(),
        other => ShapeSnafu {
            path,
            detail: format!("expected a map, found {}", other.describe()),
        }
        .fail(),
    }
}

impl TryFrom<&TagNode> for DatasetTags {
    type Error = TagCodecError;

    fn try_from(node: &TagNode) -> CodecResult<Self> {
        let TagNode::Map(map) = node else {
            return ShapeSnafu {
                path: "$",
                detail: format!("expected a map, found {}", node.describe()),
            }
            .fail();
        };
        let mut tags = DatasetTags::default();
        for (key, value) in map {
            if key == SERIES_KEY {
                let TagNode::Map(series) = value else {
                    return ShapeSnafu {
                        path: "$.series",
                        detail: format!("expected a map, found {}", value.describe()),
                    }
                    .fail();
                };
                for (name, series_tags) in series {
                    let dict = dict_from_node(series_tags, &format!("$.series.{name}"))?;
                    tags.series.insert(name.clone(), dict);
                }
            } else {
                let v = value_from_node(value, &format!("$.{key}"))?;
                tags.attributes.insert(key.clone(), v);
            }
        }
        Ok(tags)
    }
}

/// Encode a tag tree as `{"json": <sanitised JSON>}`.
pub fn tags_to_metadata(node: &TagNode) -> CodecResult<HashMap<String, String>> {
    let json = serde_json::to_string(&node.sanitize()).context(JsonSnafu)?;
    Ok(HashMap::from([(TAGS_METADATA_KEY.to_string(), json)]))
}

/// Decode the tag tree stored under the `"json"` key.
pub fn tags_from_metadata(metadata: &HashMap<String, String>) -> CodecResult<TagNode> {
    let json = metadata.get(TAGS_METADATA_KEY).context(MissingKeySnafu {
        key: TAGS_METADATA_KEY,
    })?;
    serde_json::from_str(json).context(JsonSnafu)
}

/// Dataset tags split the way they are stored in a Parquet file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTags {
    /// File-level metadata: the dataset attributes.
    pub schema: HashMap<String, String>,
    /// Column-level metadata per series.
    pub columns: BTreeMap<String, HashMap<String, String>>,
}

/// Split dataset tags into file-level and per-column metadata.
///
/// A dataset without series has nothing to persist and is rejected.
pub fn encode_dataset_tags(tags: &DatasetTags) -> CodecResult<EncodedTags> {
    if tags.series.is_empty() {
        return Err(TagCodecError::Invalid {
            source: ConfigurationError::EmptyTags,
        });
    }
    let schema = tags_to_metadata(&TagNode::from(&tags.attributes))?;
    let columns = tags
        .series
        .iter()
        .map(|(name, dict)| Ok((name.clone(), tags_to_metadata(&TagNode::from(dict))?)))
        .collect::<CodecResult<_>>()?;
    Ok(EncodedTags { schema, columns })
}

/// Rebuild dataset tags from file-level and per-column metadata.
///
/// Columns without tag metadata are skipped.
pub fn decode_dataset_tags(encoded: &EncodedTags) -> CodecResult<DatasetTags> {
    let attributes = dict_from_node(&tags_from_metadata(&encoded.schema)?, "$")?;
    let mut series = BTreeMap::new();
    for (name, metadata) in &encoded.columns {
        if !metadata.contains_key(TAGS_METADATA_KEY) {
            continue;
        }
        let node = tags_from_metadata(metadata)?;
        series.insert(name.clone(), dict_from_node(&node, &format!("$.series.{name}"))?);
    }
    Ok(DatasetTags { attributes, series })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::tag_dict;
    use chrono::TimeZone;

    fn sample() -> DatasetTags {
        let mut tags = DatasetTags::defaults("gdp", SeriesType::estimate(), &["a", "b"]);
        tags.attributes.insert(
            "about".into(),
            TagValue::from_values(["growth", "GDP"]).unwrap_or_else(|| "x".into()),
        );
        if let Some(a) = tags.series.get_mut("a") {
            a.insert("unit".into(), "NOK".into());
        }
        tags
    }

    #[test]
    fn dataset_tags_round_trip() -> CodecResult<()> {
        let tags = sample();
        let encoded = encode_dataset_tags(&tags)?;
        assert_eq!(encoded.columns.len(), 2);
        assert!(encoded.schema[TAGS_METADATA_KEY].contains("\"about\":[\"GDP\",\"growth\"]"));
        assert!(!encoded.schema[TAGS_METADATA_KEY].contains("series"));
        assert_eq!(decode_dataset_tags(&encoded)?, tags);
        Ok(())
    }

    #[test]
    fn node_round_trip_through_metadata() -> CodecResult<()> {
        let node = TagNode::from(&sample());
        let back = tags_from_metadata(&tags_to_metadata(&node)?)?;
        assert_eq!(back, node);
        assert_eq!(DatasetTags::try_from(&back)?, sample());
        Ok(())
    }

    #[test]
    fn empty_series_is_rejected() {
        let tags = DatasetTags {
            attributes: tag_dict([("name", "x")]),
            series: BTreeMap::new(),
        };
        assert!(matches!(
            encode_dataset_tags(&tags),
            Err(TagCodecError::Invalid {
                source: ConfigurationError::EmptyTags
            })
        ));
    }

    #[test]
    fn sanitize_is_idempotent_and_non_mutating() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single();
        let Some(ts) = ts else {
            panic!("valid timestamp");
        };
        let node = TagNode::Map(BTreeMap::from([
            ("type".to_string(), TagNode::SeriesType(SeriesType::estimate())),
            ("versioning".to_string(), TagNode::Versioning(Versioning::AsOf)),
            (
                "nested".to_string(),
                TagNode::List(vec![
                    TagNode::Temporality(Temporality::FromTo),
                    TagNode::Timestamp(ts),
                ]),
            ),
        ]));
        let original = node.clone();
        let once = node.sanitize();
        assert_eq!(once.sanitize(), once);
        assert_eq!(node, original);

        let TagNode::Map(map) = &once else {
            panic!("expected a map");
        };
        assert_eq!(map["type"], TagNode::Text("AS_OF_AT".into()));
        assert_eq!(map["versioning"], TagNode::Text("AS_OF".into()));
        assert_eq!(
            map["nested"],
            TagNode::List(vec![
                TagNode::Text("FROM_TO".into()),
                TagNode::Text("2024-03-01T00:00:00Z".into())
            ])
        );
    }

    #[test]
    fn missing_key_and_bad_shape_are_errors() {
        assert!(matches!(
            tags_from_metadata(&HashMap::new()),
            Err(TagCodecError::MissingKey { .. })
        ));
        let nested = TagNode::Map(BTreeMap::from([(
            "name".to_string(),
            TagNode::Map(BTreeMap::new()),
        )]));
        assert!(matches!(
            DatasetTags::try_from(&nested),
            Err(TagCodecError::Shape { .. })
        ));
    }
}
