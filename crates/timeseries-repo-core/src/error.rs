//! Configuration errors shared across the crate.
//!
//! A configuration error means the caller asked for something that can never
//! succeed as stated: an unknown series-type keyword, an AS_OF handler without
//! a timestamp, a dataset name that cannot be mapped to a path. These are
//! raised before any IO happens and are never retried.

use snafu::Snafu;

use crate::series_type::{SeriesType, Versioning};

/// Errors raised when a request is invalid independently of storage state.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigurationError {
    /// The keyword does not name any known series type.
    #[snafu(display("Unknown series type keyword: {keyword}"))]
    UnknownSeriesType {
        /// The keyword as supplied by the caller.
        keyword: String,
    },

    /// An AS_OF dataset was addressed without a version timestamp.
    #[snafu(display("Dataset {dataset} is {data_type} but no as_of timestamp was given"))]
    MissingAsOf {
        /// Dataset name.
        dataset: String,
        /// Declared series type of the dataset.
        data_type: SeriesType,
    },

    /// A NAMES dataset was addressed without a version label.
    #[snafu(display("Dataset {dataset} is {data_type} but no version name was given"))]
    MissingVersionName {
        /// Dataset name.
        dataset: String,
        /// Declared series type of the dataset.
        data_type: SeriesType,
    },

    /// The version marker kind does not fit the dataset's versioning.
    #[snafu(display("Version {version} cannot address a dataset versioned by {versioning}"))]
    VersionMismatch {
        /// Rendered version marker.
        version: String,
        /// Versioning of the dataset.
        versioning: Versioning,
    },

    /// Storage handlers have no layout for this versioning.
    #[snafu(display("Versioning {versioning} is not supported by the storage handlers"))]
    UnsupportedVersioning {
        /// The unsupported versioning.
        versioning: Versioning,
    },

    /// Tag encoding was asked to persist a dataset with no series.
    #[snafu(display("Dataset tags contain no series; nothing to persist"))]
    EmptyTags,

    /// The dataset name cannot be used as a path component.
    #[snafu(display("Invalid dataset name: {name:?}"))]
    InvalidDatasetName {
        /// The rejected name.
        name: String,
    },

    /// The version label cannot be used as a path component.
    #[snafu(display("Invalid version name: {name:?}"))]
    InvalidVersionName {
        /// The rejected label.
        name: String,
    },

    /// No storage handler is registered under this name.
    #[snafu(display("Unknown storage handler: {name}"))]
    UnknownBackend {
        /// The handler name as supplied.
        name: String,
    },
}

/// Reject names that would escape or break the on-disk layout.
pub(crate) fn validate_path_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '=', '\0'])
}

/// Check a dataset name before it is turned into directory and file names.
pub fn validate_dataset_name(name: &str) -> Result<(), ConfigurationError> {
    if validate_path_component(name) {
        Ok(())
    } else {
        InvalidDatasetNameSnafu { name }.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_names_reject_separators() {
        assert!(validate_dataset_name("gdp_by_region").is_ok());
        assert!(validate_dataset_name("a-b.c").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "as_of=1"] {
            assert_eq!(
                validate_dataset_name(bad),
                Err(ConfigurationError::InvalidDatasetName {
                    name: bad.to_string()
                })
            );
        }
    }
}
