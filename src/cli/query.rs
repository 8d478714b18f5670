// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Query command - run one fetch step

use colored::Colorize;
use miette::Result;
use std::sync::Arc;

use crate::config::Settings;
use crate::context::Context;
use crate::source::{DataSource, DatasetteSource};
use crate::step::{
    DatasetSelector, FallbackPolicy, FetchMany, FetchOne, FetchSpec, Outcome, SharedStep, Step,
};

const RESULT_KEY: &str = "result";

/// Run `sql` and print what the fetch step stored
pub async fn run(sql: String, dataset: Option<String>, one: bool, settings: &Settings) -> Result<()> {
    let source: Arc<dyn DataSource> = Arc::new(DatasetteSource::from_settings(&settings.datasette)?);
    let dataset = dataset.unwrap_or_else(|| settings.datasette.default_dataset.clone());

    let spec = FetchSpec::new(RESULT_KEY, move |_| sql.clone())
        .dataset(DatasetSelector::Named(dataset.clone()));
    let step: SharedStep = if one {
        Arc::new(FetchOne::new(source, spec).with_fallback(FallbackPolicy::Continue))
    } else {
        Arc::new(FetchMany::new(source, spec))
    };

    let mut ctx = Context::for_endpoint("/query", [("dataset", dataset.as_str())]);
    match step.run(&mut ctx).await {
        Outcome::Abort(failure) => Err(failure.error.into()),
        _ => {
            match ctx.get(RESULT_KEY) {
                Some(value) => println!(
                    "{}",
                    serde_json::to_string_pretty(value).map_err(crate::errors::PipelineError::from)?
                ),
                None => println!("{}", "No rows.".dimmed()),
            }
            Ok(())
        }
    }
}
