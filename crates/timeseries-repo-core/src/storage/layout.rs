//! On-disk layout conventions.
//!
//! This module centralizes all *relative* path conventions:
//! - the flat-file layout (`<TYPE>/<name>/<name>-<version>-data.parquet`)
//! - the Hive-style partitioned layout
//!   (`data_type=<TYPE>/dataset=<name>/as_of=<value>/part-0.parquet`)
//! - metadata catalog documents (`<name>-metadata.json`)
//! - snapshot publishing (`<stage>/<product>/<name>/<name>_p.._v<N>.<ext>`)
//!
//! Functions return relative [`PathBuf`] values or file names; callers join
//! them with a [`crate::storage::StorageLocation`] before doing IO. Parsers are
//! the exact inverses of the builders and return `None` for foreign names.

use std::path::PathBuf;

use crate::{
    dates::{parse_utc_iso_no_colon, utc_iso_no_colon},
    series_type::{SeriesType, Versioning},
    version::VersionMarker,
};

// ====================
// Flat-file layout
// ====================

/// Suffix shared by every flat-file data file.
pub const FLAT_DATA_SUFFIX: &str = "-data.parquet";

/// Version token of an unversioned data file.
pub const LATEST_TOKEN: &str = "latest";

/// Prefix of the version token of AS_OF data files.
pub const AS_OF_PREFIX: &str = "as_of_";

/// Prefix of the version token of NAMES data files.
pub const NAMED_PREFIX: &str = "named_";

/// Relative path: `<VERSIONING>_<TEMPORALITY>/<name>/`
pub fn flat_dataset_dir(name: &str, data_type: SeriesType) -> PathBuf {
    PathBuf::from(data_type.to_string()).join(name)
}

fn flat_version_token(version: &VersionMarker) -> String {
    match version {
        VersionMarker::Latest => LATEST_TOKEN.to_string(),
        VersionMarker::AsOf(ts) => format!("{AS_OF_PREFIX}{}", utc_iso_no_colon(ts)),
        VersionMarker::Named(label) => format!("{NAMED_PREFIX}{label}"),
    }
}

/// File name: `<name>-<version token>-data.parquet`
pub fn flat_file_name(name: &str, version: &VersionMarker) -> String {
    format!("{name}-{}{FLAT_DATA_SUFFIX}", flat_version_token(version))
}

/// Relative path of one flat data file.
pub fn flat_file_path(name: &str, data_type: SeriesType, version: &VersionMarker) -> PathBuf {
    flat_dataset_dir(name, data_type).join(flat_file_name(name, version))
}

/// Recover the version marker from a flat data file name.
pub fn parse_flat_file_name(
    name: &str,
    versioning: Versioning,
    file_name: &str,
) -> Option<VersionMarker> {
    let token = file_name
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(FLAT_DATA_SUFFIX)?;
    match versioning {
        Versioning::None => (token == LATEST_TOKEN).then_some(VersionMarker::Latest),
        Versioning::AsOf => token
            .strip_prefix(AS_OF_PREFIX)
            .and_then(parse_utc_iso_no_colon)
            .map(VersionMarker::AsOf),
        Versioning::Names => token
            .strip_prefix(NAMED_PREFIX)
            .filter(|label| !label.is_empty())
            .map(|label| VersionMarker::Named(label.to_string())),
        Versioning::Semantic => None,
    }
}

// ====================
// Partitioned layout
// ====================

/// Partition key of the series type directory.
pub const DATA_TYPE_PARTITION: &str = "data_type";

/// Partition key of the dataset directory.
pub const DATASET_PARTITION: &str = "dataset";

/// Partition key of the version directory.
pub const AS_OF_PARTITION: &str = "as_of";

/// Partition value used when a dataset has no version.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// The single data file written into each version partition.
pub const PART_FILE_NAME: &str = "part-0.parquet";

/// Relative path: `data_type=<TYPE>/dataset=<name>/`
pub fn partitioned_dataset_dir(name: &str, data_type: SeriesType) -> PathBuf {
    PathBuf::from(format!("{DATA_TYPE_PARTITION}={data_type}"))
        .join(format!("{DATASET_PARTITION}={name}"))
}

/// Directory name: `as_of=<value>`
pub fn partition_dir_name(version: &VersionMarker) -> String {
    let value = match version {
        VersionMarker::Latest => DEFAULT_PARTITION.to_string(),
        VersionMarker::AsOf(ts) => utc_iso_no_colon(ts),
        VersionMarker::Named(label) => label.clone(),
    };
    format!("{AS_OF_PARTITION}={value}")
}

/// Relative path of the data file of one version partition.
pub fn partition_file_path(name: &str, data_type: SeriesType, version: &VersionMarker) -> PathBuf {
    partitioned_dataset_dir(name, data_type)
        .join(partition_dir_name(version))
        .join(PART_FILE_NAME)
}

/// Recover the version marker from an `as_of=<value>` directory name.
pub fn parse_partition_dir_name(versioning: Versioning, dir_name: &str) -> Option<VersionMarker> {
    let value = dir_name
        .strip_prefix(AS_OF_PARTITION)?
        .strip_prefix('=')?;
    match versioning {
        Versioning::None => (value == DEFAULT_PARTITION).then_some(VersionMarker::Latest),
        Versioning::AsOf => parse_utc_iso_no_colon(value).map(VersionMarker::AsOf),
        Versioning::Names => {
            (!value.is_empty() && value != DEFAULT_PARTITION)
                .then(|| VersionMarker::Named(value.to_string()))
        }
        Versioning::Semantic => None,
    }
}

// ====================
// Metadata catalog layout
// ====================

/// Suffix of catalog documents.
pub const METADATA_SUFFIX: &str = "-metadata.json";

/// File name: `<name>-metadata.json`
pub fn metadata_file_name(name: &str) -> String {
    format!("{name}{METADATA_SUFFIX}")
}

/// Dataset name of a catalog document, or `None` for other files.
pub fn dataset_name_from_metadata_file(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(METADATA_SUFFIX)
        .filter(|n| !n.is_empty())
}

// ====================
// Snapshot layout
// ====================

/// Relative path: `<process_stage>/<product>/<name>/`
pub fn snapshot_dir(process_stage: &str, product: &str, name: &str) -> PathBuf {
    let mut dir = PathBuf::from(process_stage);
    if !product.is_empty() {
        dir.push(product);
    }
    dir.join(name)
}

/// File stem: `<name>_p<from>_p<to>[_v<as_of>]_v<sequence>`
pub fn snapshot_stem(
    name: &str,
    period: (&str, &str),
    as_of: Option<&VersionMarker>,
    sequence: u64,
) -> String {
    let (from, to) = period;
    match as_of {
        Some(VersionMarker::AsOf(ts)) => {
            format!("{name}_p{from}_p{to}_v{}_v{sequence}", utc_iso_no_colon(ts))
        }
        Some(VersionMarker::Named(label)) => format!("{name}_p{from}_p{to}_v{label}_v{sequence}"),
        Some(VersionMarker::Latest) | None => format!("{name}_p{from}_p{to}_v{sequence}"),
    }
}

/// Sequence number of a snapshot data file (`..._v<N>.parquet`).
pub fn parse_snapshot_sequence(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".parquet")?;
    let (_, seq) = stem.rsplit_once("_v")?;
    seq.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series_type::Temporality;
    use chrono::{TimeZone, Utc};

    fn ts() -> VersionMarker {
        match Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).single() {
            Some(t) => VersionMarker::AsOf(t),
            None => panic!("valid timestamp"),
        }
    }

    #[test]
    fn flat_paths() {
        let t = SeriesType::estimate();
        assert_eq!(
            flat_file_path("gdp", t, &ts()),
            PathBuf::from("AS_OF_AT/gdp/gdp-as_of_2023-01-01T120000+0000-data.parquet")
        );
        assert_eq!(
            flat_file_path("gdp", SeriesType::simple(), &VersionMarker::Latest),
            PathBuf::from("NONE_AT/gdp/gdp-latest-data.parquet")
        );
        assert_eq!(
            flat_file_name("gdp", &VersionMarker::Named("draft".into())),
            "gdp-named_draft-data.parquet"
        );
    }

    #[test]
    fn flat_names_parse_back() {
        let file = flat_file_name("a-b", &ts());
        assert_eq!(parse_flat_file_name("a-b", Versioning::AsOf, &file), Some(ts()));
        assert_eq!(
            parse_flat_file_name("a-b", Versioning::None, "a-b-latest-data.parquet"),
            Some(VersionMarker::Latest)
        );
        assert_eq!(
            parse_flat_file_name("a-b", Versioning::Names, "a-b-named_v1.2-data.parquet"),
            Some(VersionMarker::Named("v1.2".into()))
        );
        assert_eq!(
            parse_flat_file_name("a", Versioning::AsOf, "a-latest-data.parquet"),
            None
        );
        assert_eq!(parse_flat_file_name("a", Versioning::None, "b-latest-data.parquet"), None);
        assert_eq!(parse_flat_file_name("a", Versioning::None, "a-latest-data.json"), None);
    }

    #[test]
    fn partitioned_paths() {
        let t = SeriesType::new(Versioning::None, Temporality::FromTo);
        assert_eq!(
            partition_file_path("x", t, &VersionMarker::Latest),
            PathBuf::from(
                "data_type=NONE_FROM_TO/dataset=x/as_of=__HIVE_DEFAULT_PARTITION__/part-0.parquet"
            )
        );
        assert_eq!(partition_dir_name(&ts()), "as_of=2023-01-01T120000+0000");
        assert_eq!(
            parse_partition_dir_name(Versioning::AsOf, "as_of=2023-01-01T120000+0000"),
            Some(ts())
        );
        assert_eq!(
            parse_partition_dir_name(Versioning::None, "as_of=__HIVE_DEFAULT_PARTITION__"),
            Some(VersionMarker::Latest)
        );
        assert_eq!(parse_partition_dir_name(Versioning::AsOf, "dataset=x"), None);
    }

    #[test]
    fn metadata_names() {
        assert_eq!(metadata_file_name("gdp"), "gdp-metadata.json");
        assert_eq!(dataset_name_from_metadata_file("gdp-metadata.json"), Some("gdp"));
        assert_eq!(dataset_name_from_metadata_file("-metadata.json"), None);
        assert_eq!(dataset_name_from_metadata_file("gdp.json"), None);
    }

    #[test]
    fn snapshot_names() {
        let stem = snapshot_stem("gdp", ("2023-01-01", "2023-12-01"), Some(&ts()), 3);
        assert_eq!(
            stem,
            "gdp_p2023-01-01_p2023-12-01_v2023-01-01T120000+0000_v3"
        );
        assert_eq!(parse_snapshot_sequence(&format!("{stem}.parquet")), Some(3));
        assert_eq!(parse_snapshot_sequence(&format!("{stem}.json")), None);
        assert_eq!(
            snapshot_dir("statistikk", "", "gdp"),
            PathBuf::from("statistikk/gdp")
        );
    }
}
