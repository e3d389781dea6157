//! Core engine for versioned time-series repositories.
//!
//! This crate stores named, tabular time-series datasets as Parquet files
//! together with per-dataset and per-series tags:
//!
//! - A small type system describing how a dataset is versioned and what
//!   temporal shape its rows have (`series_type` module).
//! - Tag values, tag maintenance and criteria matching (`tags` module), plus
//!   the codec that embeds tags into Parquet metadata (`tags::codec`).
//! - Pluggable storage handlers for a flat-file layout and a Hive-style
//!   partitioned layout (`io` module), both writing through atomic
//!   write-then-rename helpers (`storage` module).
//! - Merge-on-write for unversioned datasets (`merge` module).
//! - Numbered snapshot copies of stored versions (`io::snapshot`).
//! - A JSON metadata catalog and search over one or many repositories
//!   (`repository` and `catalog` modules), configured from a JSON file
//!   (`config` module).
//!
//! All operations are synchronous and single-threaded; the filesystem is the
//! only shared state.
#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod dates;
pub mod error;
pub mod frame;
pub mod io;
pub mod merge;
pub mod repository;
pub mod series_type;
pub mod storage;
pub mod tags;
pub mod version;

pub use catalog::{Catalog, CatalogError, CatalogItem, Expect, ObjectType, SearchCriteria};
pub use config::{Config, ConfigError, RepositoryConfig};
pub use dataset::{Dataset, LoadOptions};
pub use error::ConfigurationError;
pub use io::{BackendKind, DataHandler, Handler, HandlerError, VersionMarker};
pub use repository::{Repository, RepositoryError};
pub use series_type::{SeriesType, Temporality, Versioning};
pub use tags::{DatasetTags, Propagation, TagCriteria, TagDict, TagValue};
