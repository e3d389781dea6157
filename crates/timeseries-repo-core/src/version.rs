//! Version markers addressing one snapshot of a dataset.

use std::fmt;

use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::{
    dates::{truncate_to_seconds, utc_rfc3339},
    error::{
        ConfigurationError, InvalidVersionNameSnafu, MissingAsOfSnafu, MissingVersionNameSnafu,
        UnsupportedVersioningSnafu, VersionMismatchSnafu, validate_path_component,
    },
    series_type::{SeriesType, Versioning},
};

/// Identifies one version of a dataset.
///
/// Markers of the same kind order naturally: timestamps chronologically,
/// labels alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionMarker {
    /// The single version of an unversioned dataset.
    Latest,
    /// A snapshot taken at a UTC timestamp (second precision).
    AsOf(DateTime<Utc>),
    /// A snapshot identified by a label.
    Named(String),
}

impl VersionMarker {
    /// Resolve the marker for writing or reading one version of `dataset`.
    ///
    /// - NONE: always [`VersionMarker::Latest`]; a supplied `as_of` is ignored.
    /// - AS_OF: requires `as_of`, never defaults to the current time.
    /// - NAMES: use [`VersionMarker::named`] instead; this returns an error.
    /// - SEMANTIC: no storage layout exists.
    pub fn for_type(
        dataset: &str,
        data_type: SeriesType,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Self, ConfigurationError> {
        match data_type.versioning {
            Versioning::None => Ok(VersionMarker::Latest),
            Versioning::AsOf => {
                let ts = as_of.context(MissingAsOfSnafu { dataset, data_type })?;
                Ok(VersionMarker::AsOf(truncate_to_seconds(ts)))
            }
            Versioning::Names => MissingVersionNameSnafu { dataset, data_type }.fail(),
            Versioning::Semantic => UnsupportedVersioningSnafu {
                versioning: data_type.versioning,
            }
            .fail(),
        }
    }

    /// A label marker, validated for use in file and directory names.
    pub fn named(label: impl Into<String>) -> Result<Self, ConfigurationError> {
        let label = label.into();
        ensure!(
            validate_path_component(&label),
            InvalidVersionNameSnafu { name: label }
        );
        Ok(VersionMarker::Named(label))
    }

    /// Check that this marker can address a dataset of `data_type`.
    pub fn check_fits(&self, data_type: SeriesType) -> Result<(), ConfigurationError> {
        let fits = match (self, data_type.versioning) {
            (_, Versioning::Semantic) => {
                return UnsupportedVersioningSnafu {
                    versioning: data_type.versioning,
                }
                .fail();
            }
            (VersionMarker::Latest, Versioning::None)
            | (VersionMarker::AsOf(_), Versioning::AsOf)
            | (VersionMarker::Named(_), Versioning::Names) => true,
            _ => false,
        };
        ensure!(
            fits,
            VersionMismatchSnafu {
                version: self.to_string(),
                versioning: data_type.versioning,
            }
        );
        Ok(())
    }

    /// The timestamp of an AS_OF marker.
    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        match self {
            VersionMarker::AsOf(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionMarker::Latest => f.write_str("latest"),
            VersionMarker::AsOf(ts) => f.write_str(&utc_rfc3339(ts)),
            VersionMarker::Named(label) => f.write_str(label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series_type::Temporality;
    use chrono::TimeZone;

    #[test]
    fn as_of_requires_timestamp() {
        let err = VersionMarker::for_type("x", SeriesType::estimate(), None);
        assert_eq!(
            err,
            Err(ConfigurationError::MissingAsOf {
                dataset: "x".into(),
                data_type: SeriesType::estimate()
            })
        );
    }

    #[test]
    fn none_ignores_as_of_and_as_of_truncates() -> Result<(), ConfigurationError> {
        let ts = Utc.timestamp_opt(1_700_000_000, 999).single();
        assert_eq!(
            VersionMarker::for_type("x", SeriesType::simple(), ts)?,
            VersionMarker::Latest
        );
        let marker = VersionMarker::for_type("x", SeriesType::estimate(), ts)?;
        assert_eq!(
            marker.as_of().map(|t| t.timestamp_subsec_nanos()),
            Some(0)
        );
        Ok(())
    }

    #[test]
    fn names_and_semantic_are_rejected_by_for_type() {
        let names = SeriesType::new(Versioning::Names, Temporality::At);
        assert!(matches!(
            VersionMarker::for_type("x", names, None),
            Err(ConfigurationError::MissingVersionName { .. })
        ));
        let semantic = SeriesType::new(Versioning::Semantic, Temporality::At);
        assert!(matches!(
            VersionMarker::for_type("x", semantic, None),
            Err(ConfigurationError::UnsupportedVersioning { .. })
        ));
    }

    #[test]
    fn markers_must_fit_versioning() -> Result<(), ConfigurationError> {
        let names = SeriesType::new(Versioning::Names, Temporality::At);
        VersionMarker::named("draft")?.check_fits(names)?;
        assert!(VersionMarker::Latest.check_fits(names).is_err());
        assert!(VersionMarker::named("a/b").is_err());
        Ok(())
    }

    #[test]
    fn markers_order_within_kind() -> Result<(), ConfigurationError> {
        let mut labels = vec![VersionMarker::named("b")?, VersionMarker::named("a")?];
        labels.sort();
        assert_eq!(labels[0].to_string(), "a");
        Ok(())
    }
}
