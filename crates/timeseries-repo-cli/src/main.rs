//! CLI tool for searching and inspecting time-series repositories.

mod error;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::debug;
use snafu::{ResultExt, ensure};
use timeseries_repo_core::{
    CatalogItem, Config, Expect, ObjectType, SearchCriteria, SeriesType, TagDict, TagValue,
    catalog::CatalogResult,
};

use crate::error::{
    CliResult, ConfigSnafu, InvalidObjectTypeSnafu, InvalidTagSnafu, InvalidTypeSnafu,
    RenderSnafu, SearchSnafu, VersionsSnafu,
};

#[derive(Debug, Args)]
struct SearchArgs {
    /// Search one repository instead of all configured ones
    #[arg(long)]
    repository: Option<String>,

    /// Exact dataset name
    #[arg(long, default_value = "")]
    equals: String,

    /// Dataset name substring (ignored when --equals is given)
    #[arg(long, default_value = "")]
    contains: String,

    /// Tag criterion KEY=VALUE; repeat a key to accept any of its values
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// Required number of results: any, nonempty or unique
    #[arg(long, default_value = "any")]
    expect: Expect,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List datasets matching the search
    Datasets {
        #[command(flatten)]
        search: SearchArgs,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// List series matching the search
    Series {
        #[command(flatten)]
        search: SearchArgs,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Count datasets, series or both
    Count {
        /// dataset, series or items
        #[arg(long = "object-type", default_value = "items")]
        object_type: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// List the stored versions of one dataset
    Versions {
        /// Repository name; the default repository when omitted
        #[arg(long, default_value = "")]
        repository: String,

        #[arg(long)]
        name: String,

        /// Series type keyword, e.g. simple, estimate or AS_OF_FROM_TO
        #[arg(long = "type")]
        data_type: String,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Debug, Parser)]
#[command(name = "tsrepo", version, about = "Versioned time-series repositories")]
struct Cli {
    /// Configuration file; overrides TIMESERIES_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env = env_logger::Env::default().default_filter_or(level);
    // A logger installed by an embedding process stays in place.
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Turn repeated `KEY=VALUE` flags into tag criteria.
fn parse_tags(specs: &[String]) -> CliResult<Option<TagDict>> {
    if specs.is_empty() {
        return Ok(None);
    }
    let mut tags = TagDict::new();
    for spec in specs {
        let Some((key, value)) = spec.split_once('=') else {
            return InvalidTagSnafu { spec: spec.as_str() }.fail();
        };
        let (key, value) = (key.trim(), value.trim());
        ensure!(!key.is_empty(), InvalidTagSnafu { spec: spec.as_str() });
        let value = TagValue::from(value);
        let merged = match tags.get(key) {
            Some(existing) => existing.union(&value),
            None => value,
        };
        tags.insert(key.to_string(), merged);
    }
    Ok(Some(tags))
}

fn criteria(search: &SearchArgs) -> CliResult<SearchCriteria> {
    let mut criteria = SearchCriteria::new()
        .equals(search.equals.as_str())
        .contains(search.contains.as_str())
        .expect(search.expect);
    if let Some(tags) = parse_tags(&search.tags)? {
        criteria = criteria.tags(tags);
    }
    Ok(criteria)
}

/// Run a search against one repository or the whole catalog.
fn search<F, G>(
    config: &Config,
    repository: Option<&str>,
    in_repository: F,
    in_catalog: G,
) -> CliResult<Vec<CatalogItem>>
where
    F: FnOnce(&timeseries_repo_core::Repository) -> CatalogResult<Vec<CatalogItem>>,
    G: FnOnce(&timeseries_repo_core::Catalog) -> CatalogResult<Vec<CatalogItem>>,
{
    let found = match repository {
        Some(name) => {
            let repo = config.select_repository(name).context(ConfigSnafu)?;
            in_repository(&repo.repository())
        }
        None => in_catalog(&config.catalog()),
    };
    found.context(SearchSnafu)
}

fn print_items(items: &[CatalogItem], json: bool) -> CliResult<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(items).context(RenderSnafu)?
        );
        return Ok(());
    }
    for item in items {
        match (&item.object_type, &item.parent) {
            (ObjectType::Series, Some(parent)) => println!(
                "{}\t{}\t{}",
                item.repository_name, parent, item.object_name
            ),
            _ => println!("{}\t{}", item.repository_name, item.object_name),
        }
    }
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context(ConfigSnafu)?;
    debug!("{} repositories configured", config.repositories.len());

    match cli.cmd {
        Command::Datasets { search: args, json } => {
            let criteria = criteria(&args)?;
            let items = search(
                &config,
                args.repository.as_deref(),
                |r| r.datasets(&criteria),
                |c| c.datasets(&criteria),
            )?;
            print_items(&items, json)
        }
        Command::Series { search: args, json } => {
            let criteria = criteria(&args)?;
            let items = search(
                &config,
                args.repository.as_deref(),
                |r| r.series(&criteria),
                |c| c.series(&criteria),
            )?;
            print_items(&items, json)
        }
        Command::Count {
            object_type,
            search: args,
        } => {
            let target = ObjectType::count_target(&object_type).context(InvalidObjectTypeSnafu {
                value: object_type.as_str(),
            })?;
            let criteria = criteria(&args)?;
            let (datasets, series) = match target {
                Some(ObjectType::Dataset) => (true, false),
                Some(ObjectType::Series) => (false, true),
                None => (true, true),
            };
            let items = search(
                &config,
                args.repository.as_deref(),
                |r| r.items(datasets, series, &criteria),
                |c| c.items(datasets, series, &criteria),
            )?;
            println!("{}", items.len());
            Ok(())
        }
        Command::Versions {
            repository,
            name,
            data_type,
        } => {
            let parsed: SeriesType = data_type.parse().context(InvalidTypeSnafu {
                keyword: data_type.as_str(),
            })?;
            let entry = config
                .select_repository(&repository)
                .context(ConfigSnafu)?;
            let versions = entry
                .repository()
                .versions(&name, parsed)
                .context(VersionsSnafu {
                    name: name.as_str(),
                    repository: entry.name.as_str(),
                })?;
            for version in versions {
                println!("{version}");
            }
            Ok(())
        }
        Command::Config => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context(RenderSnafu)?
            );
            Ok(())
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
