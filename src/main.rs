// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! pageflow - page request pipelines
//!
//! Run and validate page definitions from the command line.

use clap::Parser;
use miette::Result;

use pageflow::cli::{load_settings, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.environment)?;
    pageflow::logging::init(&settings.logging.filter, cli.verbose);
    pageflow::utils::configure_colors();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            page,
            params,
            endpoint,
            no_cache,
        } => pageflow::cli::run::run(page, params, endpoint, no_cache, &settings, cli.verbose).await,
        Commands::Validate { page } => pageflow::cli::validate::run(page, cli.verbose).await,
        Commands::Query { sql, dataset, one } => {
            pageflow::cli::query::run(sql, dataset, one, &settings).await
        }
        Commands::Cache { action } => pageflow::cli::cache::run(action, &settings).await,
    }
}
