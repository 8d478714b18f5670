// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for pageflow.

pub mod cache;
pub mod query;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Environment, Settings};

/// Page pipeline runner
///
/// Run, validate and debug page definitions against a Datasette instance.
#[derive(Parser, Debug)]
#[clap(
    name = "pageflow",
    version,
    about = "Run and validate page data pipelines",
    long_about = None,
    after_help = "Examples:\n\
        pageflow validate pages/overview.yaml             Check a page definition\n\
        pageflow run pages/overview.yaml -p lpa=some-lpa  Run a page\n\
        pageflow query 'select * from dataset' --one      Run a single query\n\n\
        See 'pageflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Config directory holding default.yaml and environment overlays
    #[clap(long, global = true, value_name = "DIR", env = "PAGEFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment overlay to apply (local, development, test, staging, production)
    #[clap(long = "env", global = true, value_name = "NAME", env = "PAGEFLOW_ENV")]
    pub environment: Option<Environment>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a page definition and run it
    Run {
        /// Page definition file
        page: PathBuf,

        /// Route parameter, repeatable (e.g. -p lpa=some-lpa)
        #[clap(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Endpoint recorded on the request
        #[clap(long, default_value = "/")]
        endpoint: String,

        /// Skip the cache even when it is enabled
        #[clap(long)]
        no_cache: bool,
    },

    /// Validate a page definition
    Validate {
        /// Page definition file to validate
        page: PathBuf,
    },

    /// Run a single query through a fetch step
    Query {
        /// SQL to run
        sql: String,

        /// Dataset to query (defaults to the configured default dataset)
        #[clap(short, long)]
        dataset: Option<String>,

        /// Keep only the first row
        #[clap(long)]
        one: bool,
    },

    /// Cache management
    Cache {
        #[clap(subcommand)]
        action: CacheAction,
    },
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },
}

/// Parse a `key=value` route parameter
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Load settings for a command
pub fn load_settings(
    config: Option<&Path>,
    environment: Option<Environment>,
) -> miette::Result<Settings> {
    let dir = config.map(Path::to_path_buf).or_else(|| {
        let default = PathBuf::from("config");
        default.is_dir().then_some(default)
    });
    Ok(Settings::load(dir.as_deref(), environment)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("lpa=some-lpa").unwrap(),
            ("lpa".to_string(), "some-lpa".to_string())
        );
        assert_eq!(parse_param("q=a=b").unwrap().1, "a=b");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "pageflow", "run", "page.yaml", "-p", "lpa=x", "-p", "dataset=tree", "--env", "test",
        ])
        .unwrap();
        assert_eq!(cli.environment, Some(Environment::Test));
        match cli.command {
            Commands::Run { page, params, .. } => {
                assert_eq!(page, PathBuf::from("page.yaml"));
                assert_eq!(params.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
