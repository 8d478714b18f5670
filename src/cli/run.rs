// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Run command - compile and execute a page

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache;
use crate::config::Settings;
use crate::context::Context;
use crate::pipeline::{PageDefinition, PageDeps, PipelineValidator};
use crate::render::JsonRenderer;
use crate::source::DatasetteSource;
use crate::utils::{print_error, print_warning};

/// Run a page definition against the configured Datasette
pub async fn run(
    page_path: PathBuf,
    params: Vec<(String, String)>,
    endpoint: String,
    no_cache: bool,
    settings: &Settings,
    verbose: bool,
) -> Result<()> {
    let page = PageDefinition::from_file(&page_path)?;

    let validation = PipelineValidator::validate(&page);
    if !validation.is_valid() {
        eprintln!("{}", "Page validation failed:".red().bold());
        for error in &validation.errors {
            print_error(error);
        }
        return Err(miette::miette!("Page definition is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Page warnings:".yellow().bold());
        for warning in &validation.warnings {
            print_warning(warning);
        }
        eprintln!();
    }

    let source = DatasetteSource::from_settings(&settings.datasette)?;
    let mut deps = PageDeps::new(Arc::new(source), Arc::new(JsonRenderer));
    deps.datasets = settings.datasette.datasets.clone();
    deps.default_dataset = settings.datasette.default_dataset.clone();
    deps.validate_templates = settings.environment.validates_templates();

    if settings.cache.enabled && !no_cache {
        deps.cache = Some(cache::from_settings(&settings.cache)?);
        deps.cache_ttl = settings.cache.ttl_secs.map(Duration::from_secs);
    }

    let pipeline = page.compile(&deps)?;

    println!(
        "  {} {} ({} steps, {})",
        "→".blue(),
        page.name.bold(),
        pipeline.len(),
        settings.environment
    );

    let mut ctx = Context::for_endpoint(&endpoint, params);
    let response = pipeline.respond(&mut ctx).await;

    let status = if response.is_success() {
        response.status.to_string().green()
    } else {
        response.status.to_string().red()
    };
    println!(
        "  {} {} {}",
        status,
        response.template.dimmed(),
        format!("({:.2}s)", ctx.elapsed().as_secs_f64()).dimmed()
    );
    println!();
    println!("{}", response.body);

    if verbose {
        println!();
        println!("{}:", "Context keys".bold());
        for key in ctx.keys() {
            println!("  - {}", key);
        }
    }

    if response.is_success() {
        Ok(())
    } else {
        Err(miette::miette!(
            "Page '{}' answered with status {}",
            page.name,
            response.status
        ))
    }
}
