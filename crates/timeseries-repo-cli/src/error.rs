use timeseries_repo_core::{CatalogError, ConfigError, ConfigurationError, RepositoryError};

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("Invalid --type '{keyword}': {source}"))]
    InvalidType {
        keyword: String,
        source: ConfigurationError,
    },

    #[snafu(display("Invalid --tag '{spec}': expected KEY=VALUE"))]
    InvalidTag { spec: String },

    #[snafu(display("Invalid --object-type '{value}': expected dataset, series or items"))]
    InvalidObjectType { value: String, source: CatalogError },

    #[snafu(display("Search failed: {source}"))]
    Search { source: CatalogError },

    #[snafu(display(
        "Cannot list versions of {name} in repository {repository}. \
         Check the dataset name and --type."
    ))]
    Versions {
        name: String,
        repository: String,
        #[snafu(source(from(RepositoryError, Box::new)))]
        source: Box<RepositoryError>,
    },

    #[snafu(display("Cannot render output as JSON: {source}"))]
    Render { source: serde_json::Error },
}
