//! Versioning × temporality type system for datasets.
//!
//! Every dataset declares a [`SeriesType`]. The versioning part decides how
//! snapshots are told apart (not at all, by an `as_of` timestamp, or by a
//! label); the temporality part decides which date columns key a row. Both
//! parts are closed enumerations, and the pair determines the dataset's
//! directory on disk and the date columns its rows must carry.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, UnknownSeriesTypeSnafu};

/// Name of the version timestamp column for AS_OF datasets.
pub const AS_OF_COLUMN: &str = "as_of";
/// Name of the point-in-time column for AT datasets.
pub const VALID_AT_COLUMN: &str = "valid_at";
/// Name of the interval start column for FROM_TO datasets.
pub const VALID_FROM_COLUMN: &str = "valid_from";
/// Name of the interval end column for FROM_TO datasets.
pub const VALID_TO_COLUMN: &str = "valid_to";

/// How successive snapshots of a dataset are distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Versioning {
    /// A single logical version; writes merge into it.
    None,
    /// Snapshots identified by a UTC timestamp.
    AsOf,
    /// Snapshots identified by a free-text label.
    Names,
    /// Reserved for semantic version numbers; no storage layout yet.
    Semantic,
}

/// Temporal shape of the rows in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Temporality {
    /// Rows carry no date key.
    None,
    /// Rows are valid at a point in time.
    At,
    /// Rows are valid over an interval.
    FromTo,
}

impl Versioning {
    /// Upper-case token used in directory names and tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Versioning::None => "NONE",
            Versioning::AsOf => "AS_OF",
            Versioning::Names => "NAMES",
            Versioning::Semantic => "SEMANTIC",
        }
    }

    fn date_columns(self) -> &'static [&'static str] {
        match self {
            Versioning::AsOf => &[AS_OF_COLUMN],
            Versioning::None | Versioning::Names | Versioning::Semantic => &[],
        }
    }
}

impl Temporality {
    /// Upper-case token used in directory names and tags.
    pub fn as_str(self) -> &'static str {
        match self {
            Temporality::None => "NONE",
            Temporality::At => "AT",
            Temporality::FromTo => "FROM_TO",
        }
    }

    fn date_columns(self) -> &'static [&'static str] {
        match self {
            Temporality::None => &[],
            Temporality::At => &[VALID_AT_COLUMN],
            Temporality::FromTo => &[VALID_FROM_COLUMN, VALID_TO_COLUMN],
        }
    }
}

impl fmt::Display for Versioning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Versioning {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Versioning::None),
            "AS_OF" => Ok(Versioning::AsOf),
            "NAMES" => Ok(Versioning::Names),
            "SEMANTIC" => Ok(Versioning::Semantic),
            _ => UnknownSeriesTypeSnafu { keyword: s }.fail(),
        }
    }
}

impl FromStr for Temporality {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Temporality::None),
            "AT" => Ok(Temporality::At),
            "FROM_TO" => Ok(Temporality::FromTo),
            _ => UnknownSeriesTypeSnafu { keyword: s }.fail(),
        }
    }
}

/// The declared (versioning, temporality) pair of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesType {
    /// How snapshots are distinguished.
    pub versioning: Versioning,
    /// Which date columns key the rows.
    pub temporality: Temporality,
}

impl SeriesType {
    /// Build a series type from its two parts.
    pub const fn new(versioning: Versioning, temporality: Temporality) -> Self {
        Self {
            versioning,
            temporality,
        }
    }

    /// Unversioned point-in-time series (`simple`).
    pub const fn simple() -> Self {
        Self::new(Versioning::None, Temporality::At)
    }

    /// Unversioned interval series (`from_to`).
    pub const fn from_to() -> Self {
        Self::new(Versioning::None, Temporality::FromTo)
    }

    /// Point-in-time series versioned by `as_of` (`estimate`).
    pub const fn estimate() -> Self {
        Self::new(Versioning::AsOf, Temporality::At)
    }

    /// Interval series versioned by `as_of`.
    pub const fn as_of_from_to() -> Self {
        Self::new(Versioning::AsOf, Temporality::FromTo)
    }

    /// Date columns that key a row, `as_of` first, without duplicates.
    pub fn date_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::with_capacity(3);
        for col in self
            .versioning
            .date_columns()
            .iter()
            .chain(self.temporality.date_columns())
        {
            if !columns.contains(col) {
                columns.push(col);
            }
        }
        columns
    }

    /// Date columns excluding the version column.
    pub fn temporal_columns(&self) -> &'static [&'static str] {
        self.temporality.date_columns()
    }

    /// All combinations the storage handlers can persist, in a stable order.
    pub fn permutations() -> Vec<SeriesType> {
        let mut out = Vec::with_capacity(9);
        for versioning in [Versioning::None, Versioning::AsOf, Versioning::Names] {
            for temporality in [Temporality::None, Temporality::At, Temporality::FromTo] {
                out.push(SeriesType::new(versioning, temporality));
            }
        }
        out
    }
}

impl fmt::Display for SeriesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.versioning, self.temporality)
    }
}

impl FromStr for SeriesType {
    type Err = ConfigurationError;

    /// Parse a shorthand keyword (`simple`, `estimate`, ...) or a
    /// `<VERSIONING>_<TEMPORALITY>` token such as `AS_OF_FROM_TO`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let shorthand = match lowered.as_str() {
            "simple" => Some(SeriesType::simple()),
            "from_to" => Some(SeriesType::from_to()),
            "estimate" => Some(SeriesType::estimate()),
            _ => None,
        };
        if let Some(t) = shorthand {
            return Ok(t);
        }

        // Versioning tokens never end in a temporality token, so the first
        // split that parses on both sides is the only one.
        let upper = lowered.to_ascii_uppercase();
        for (idx, _) in upper.match_indices('_') {
            let (v, t) = (&upper[..idx], &upper[idx + 1..]);
            if let (Ok(versioning), Ok(temporality)) = (v.parse(), t.parse()) {
                return Ok(SeriesType::new(versioning, temporality));
            }
        }
        UnknownSeriesTypeSnafu { keyword: s }.fail()
    }
}
