//! Search for datasets and series across one or more repositories.
//!
//! Searches read only catalog documents. Names are matched against the
//! dataset name (`equals` exactly, else `contains` as a substring), then tag
//! criteria filter the dataset or series items. A [`Catalog`] runs the same
//! search over each of its repositories in order and concatenates the
//! results; the same name in two repositories yields two items.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    io::HandlerError,
    repository::Repository,
    tags::{TagCriteria, TagDict},
};

/// Errors raised by catalog searches.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CatalogError {
    /// The result count violates the requested expectation.
    #[snafu(display("Expected {expect} {object}, found {found}"))]
    Lookup {
        /// The violated expectation.
        expect: Expect,
        /// What was searched for.
        object: String,
        /// Number of items found.
        found: usize,
    },

    /// A catalog document could not be listed or decoded.
    #[snafu(display("Cannot read catalog of repository {repository}: {source}"))]
    Metadata {
        /// Repository name.
        repository: String,
        /// Underlying handler error.
        source: HandlerError,
    },

    /// A count was asked for an object type that does not exist.
    #[snafu(display("Unknown object type {value:?}; expected dataset, series or items"))]
    UnknownObjectType {
        /// The value as supplied.
        value: String,
    },
}

/// Convenience alias for catalog results.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Kinds of catalog objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// A whole dataset.
    Dataset,
    /// One series of a dataset.
    Series,
}

impl ObjectType {
    /// Parse the object type argument of a count.
    ///
    /// `set`, `sets`, `dataset` and `datasets` count datasets, `series`
    /// counts series, and `items` or `all` (`None`) counts both. Any other
    /// value is rejected.
    pub fn count_target(s: &str) -> CatalogResult<Option<ObjectType>> {
        match s.to_ascii_lowercase().as_str() {
            "set" | "sets" | "dataset" | "datasets" => Ok(Some(ObjectType::Dataset)),
            "series" => Ok(Some(ObjectType::Series)),
            "items" | "all" => Ok(None),
            _ => UnknownObjectTypeSnafu { value: s }.fail(),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Dataset => f.write_str("dataset"),
            ObjectType::Series => f.write_str("series"),
        }
    }
}

/// Cardinality a caller expects from a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Expect {
    /// Any number of results, including none.
    #[default]
    Any,
    /// At least one result.
    NonEmpty,
    /// Exactly one result.
    Unique,
}

impl Expect {
    fn holds(self, found: usize) -> bool {
        match self {
            Expect::Any => true,
            Expect::NonEmpty => found > 0,
            Expect::Unique => found == 1,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Any => f.write_str("any number of"),
            Expect::NonEmpty => f.write_str("at least one"),
            Expect::Unique => f.write_str("exactly one"),
        }
    }
}

impl FromStr for Expect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Expect::Any),
            "non_empty" | "non-empty" | "nonempty" => Ok(Expect::NonEmpty),
            "unique" | "one" => Ok(Expect::Unique),
            other => Err(format!("unknown expectation: {other}")),
        }
    }
}

/// Name and tag criteria for a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Exact dataset name; empty matches all.
    pub equals: String,
    /// Dataset name substring, used when `equals` is empty.
    pub contains: String,
    /// Tag criteria for the returned items.
    pub tags: Option<TagCriteria>,
    /// Required cardinality of the result.
    pub expect: Expect,
}

impl SearchCriteria {
    /// Match everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the dataset named exactly `name`.
    pub fn equals(mut self, name: impl Into<String>) -> Self {
        self.equals = name.into();
        self
    }

    /// Restrict to datasets whose name contains `part`.
    pub fn contains(mut self, part: impl Into<String>) -> Self {
        self.contains = part.into();
        self
    }

    /// Require every key of `tags`.
    pub fn tags(mut self, tags: TagDict) -> Self {
        self.tags = Some(TagCriteria::All(tags));
        self
    }

    /// Require any one of `alternatives`.
    pub fn any_of(mut self, alternatives: Vec<TagDict>) -> Self {
        self.tags = Some(TagCriteria::Any(alternatives));
        self
    }

    /// Require a result cardinality.
    pub fn expect(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }

    pub(crate) fn matches_tags(&self, tags: &TagDict) -> bool {
        self.tags.as_ref().is_none_or(|c| c.matches(tags))
    }
}

/// A dataset or series found by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    /// Repository holding the object.
    pub repository_name: String,
    /// Dataset or series name.
    pub object_name: String,
    /// Kind of object.
    pub object_type: ObjectType,
    /// Dataset attributes, or the series' tags.
    pub object_tags: TagDict,
    /// The dataset of a series, or a dataset's `parent` attribute.
    pub parent: Option<String>,
    /// Series of a dataset; empty for series.
    pub children: Vec<String>,
}

pub(crate) fn check_expectation(
    expect: Expect,
    object: &str,
    items: Vec<CatalogItem>,
) -> CatalogResult<Vec<CatalogItem>> {
    ensure!(
        expect.holds(items.len()),
        LookupSnafu {
            expect,
            object,
            found: items.len(),
        }
    );
    Ok(items)
}

pub(crate) fn describe(datasets: bool, series: bool) -> &'static str {
    match (datasets, series) {
        (true, false) => "datasets",
        (false, true) => "series",
        _ => "items",
    }
}

/// An ordered collection of repositories searched together.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    repositories: Vec<Repository>,
}

impl Catalog {
    /// A catalog over `repositories`, searched in the given order.
    pub fn new(repositories: Vec<Repository>) -> Self {
        Self { repositories }
    }

    /// The repositories, in search order.
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Datasets matching `criteria` in every repository.
    pub fn datasets(&self, criteria: &SearchCriteria) -> CatalogResult<Vec<CatalogItem>> {
        self.items(true, false, criteria)
    }

    /// Series matching `criteria` in every repository.
    pub fn series(&self, criteria: &SearchCriteria) -> CatalogResult<Vec<CatalogItem>> {
        self.items(false, true, criteria)
    }

    /// Datasets and/or series matching `criteria` in every repository.
    ///
    /// The expectation applies to the combined result.
    pub fn items(
        &self,
        datasets: bool,
        series: bool,
        criteria: &SearchCriteria,
    ) -> CatalogResult<Vec<CatalogItem>> {
        let mut out = Vec::new();
        for repository in &self.repositories {
            out.extend(repository.collect_items(datasets, series, criteria)?);
        }
        check_expectation(criteria.expect, describe(datasets, series), out)
    }

    /// Number of matches; `None` counts datasets and series together.
    pub fn count(
        &self,
        object_type: Option<ObjectType>,
        criteria: &SearchCriteria,
    ) -> CatalogResult<usize> {
        let items = match object_type {
            Some(ObjectType::Dataset) => self.datasets(criteria)?,
            Some(ObjectType::Series) => self.series(criteria)?,
            None => self.items(true, true, criteria)?,
        };
        Ok(items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_aliases() -> CatalogResult<()> {
        assert_eq!(ObjectType::count_target("Sets")?, Some(ObjectType::Dataset));
        assert_eq!(ObjectType::count_target("series")?, Some(ObjectType::Series));
        assert_eq!(ObjectType::count_target("items")?, None);
        assert_eq!(ObjectType::count_target("ALL")?, None);
        for typo in ["seris", "", "tables"] {
            assert!(matches!(
                ObjectType::count_target(typo),
                Err(CatalogError::UnknownObjectType { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn expectations() {
        assert!(Expect::Any.holds(0));
        assert!(!Expect::NonEmpty.holds(0));
        assert!(Expect::Unique.holds(1));
        assert!(!Expect::Unique.holds(2));
        assert!(matches!(
            check_expectation(Expect::Unique, "datasets", Vec::new()),
            Err(CatalogError::Lookup { found: 0, .. })
        ));
    }
}
