//! Repository configuration.
//!
//! A configuration file is JSON:
//!
//! ```json
//! {
//!   "repositories": [
//!     {
//!       "name": "team",
//!       "default": true,
//!       "directory": { "handler": "flat", "options": { "path": "/data/series" } },
//!       "catalog": { "options": { "path": "/data/series/metadata" } }
//!     }
//!   ]
//! }
//! ```
//!
//! The file is located, in order of precedence, from an explicit path, the
//! `TIMESERIES_CONFIG` environment variable, or
//! `$HOME/.config/timeseries_repo/timeseries_config.json`.

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    catalog::Catalog,
    io::BackendKind,
    repository::Repository,
    storage::{self, StorageError, StorageLocation},
};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "TIMESERIES_CONFIG";

/// File name of the configuration under the default directory.
pub const CONFIG_FILE_NAME: &str = "timeseries_config.json";

/// Default configuration directory, relative to `$HOME`.
pub const CONFIG_DIR: &str = ".config/timeseries_repo";

/// Errors from locating, reading or writing configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// No explicit path, no environment variable, and no home directory.
    #[snafu(display("Cannot locate a configuration file: set {CONFIG_ENV_VAR} or HOME"))]
    NoLocation,

    /// The configuration file could not be read or written.
    #[snafu(display("Cannot access configuration file {path}: {source}"))]
    Access {
        /// Path of the configuration file.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// The configuration file is not valid JSON of the expected shape.
    #[snafu(display("Invalid configuration in {path}: {source}"))]
    Parse {
        /// Path of the configuration file.
        path: String,
        /// Underlying serde_json error.
        source: serde_json::Error,
    },

    /// No repository fits the requested name.
    #[snafu(display("No repository {name:?} among {available:?}"))]
    NoSuchRepository {
        /// Requested name; empty when the default was requested.
        name: String,
        /// Configured repository names.
        available: Vec<String>,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Options of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOptions {
    /// Filesystem path.
    pub path: PathBuf,
}

/// Where a repository keeps its data and which layout it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Storage layout.
    #[serde(default = "default_handler")]
    pub handler: BackendKind,
    /// Data root.
    pub options: PathOptions,
}

fn default_handler() -> BackendKind {
    BackendKind::Flat
}

/// Where a repository keeps its catalog documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog directory.
    pub options: PathOptions,
}

/// One configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository name.
    pub name: String,
    /// Whether this repository is picked when no name is given.
    #[serde(default)]
    pub default: bool,
    /// Data directory and layout.
    pub directory: DirectoryConfig,
    /// Catalog directory.
    pub catalog: CatalogConfig,
}

impl RepositoryConfig {
    /// A configuration entry for the given directories.
    pub fn new(
        name: impl Into<String>,
        data: impl Into<PathBuf>,
        catalog: impl Into<PathBuf>,
        handler: BackendKind,
    ) -> Self {
        Self {
            name: name.into(),
            default: false,
            directory: DirectoryConfig {
                handler,
                options: PathOptions { path: data.into() },
            },
            catalog: CatalogConfig {
                options: PathOptions {
                    path: catalog.into(),
                },
            },
        }
    }

    /// The repository this entry describes.
    pub fn repository(&self) -> Repository {
        Repository::new(
            self.name.clone(),
            self.directory.options.path.clone(),
            self.catalog.options.path.clone(),
            self.directory.handler,
        )
    }
}

/// All configured repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Repositories, in catalog search order.
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

fn split(path: &Path) -> (StorageLocation, PathBuf) {
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf());
    (StorageLocation::local(parent), file)
}

impl Config {
    /// Locate the configuration file.
    ///
    /// `env` is the value of [`CONFIG_ENV_VAR`] and `home` the user's home
    /// directory; empty values are ignored.
    pub fn resolve_path(
        explicit: Option<&Path>,
        env: Option<&str>,
        home: Option<&Path>,
    ) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(env) = env.filter(|e| !e.is_empty()) {
            return Some(PathBuf::from(env));
        }
        home.filter(|h| !h.as_os_str().is_empty())
            .map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE_NAME))
    }

    /// The configuration file path for this process.
    pub fn default_path(explicit: Option<&Path>) -> ConfigResult<PathBuf> {
        let env = std::env::var(CONFIG_ENV_VAR).ok();
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::resolve_path(explicit, env.as_deref(), home.as_deref()).context(NoLocationSnafu)
    }

    /// Load the configuration for this process.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        Self::from_file(&Self::default_path(explicit)?)
    }

    /// Read a configuration file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let display = path.display().to_string();
        let (location, file) = split(path);
        let text = storage::read_to_string(&location, &file).context(AccessSnafu {
            path: display.as_str(),
        })?;
        let config: Config = serde_json::from_str(&text).context(ParseSnafu {
            path: display.as_str(),
        })?;
        debug!(
            "loaded {} repositories from {display}",
            config.repositories.len()
        );
        Ok(config)
    }

    /// Write this configuration to `path`, replacing it atomically.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let display = path.display().to_string();
        let json = serde_json::to_vec_pretty(self).context(ParseSnafu {
            path: display.as_str(),
        })?;
        let (location, file) = split(path);
        storage::write_atomic(&location, &file, &json).context(AccessSnafu {
            path: display.as_str(),
        })?;
        info!("saved configuration to {display}");
        Ok(())
    }

    /// Pick a repository.
    ///
    /// A sole repository is always picked. Otherwise a non-empty `name` must
    /// match exactly, and an empty `name` picks the first one marked default.
    pub fn select_repository(&self, name: &str) -> ConfigResult<&RepositoryConfig> {
        let found = match self.repositories.as_slice() {
            [only] => Some(only),
            repos if !name.is_empty() => repos.iter().find(|r| r.name == name),
            repos => repos.iter().find(|r| r.default),
        };
        found.context(NoSuchRepositorySnafu {
            name,
            available: self
                .repositories
                .iter()
                .map(|r| r.name.clone())
                .collect::<Vec<_>>(),
        })
    }

    /// A catalog over every configured repository.
    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            self.repositories
                .iter()
                .map(RepositoryConfig::repository)
                .collect(),
        )
    }
}
