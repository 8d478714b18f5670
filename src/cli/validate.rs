// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Validate command - check a page definition

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::pipeline::{PageDefinition, PipelineValidator, StepDefinition};
use crate::utils::{print_error, print_section, print_success, print_warning};

/// Run the validate command
pub async fn run(page_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating page...".bold());
    println!();

    if !page_path.exists() {
        return Err(miette::miette!(
            "Page definition not found: {}",
            page_path.display()
        ));
    }

    let page = match PageDefinition::from_file(&page_path) {
        Ok(p) => p,
        Err(e) => {
            print_error("Failed to parse page definition");
            eprintln!();
            return Err(miette::miette!("Parse error: {}", e));
        }
    };

    print_success("Page file is valid YAML");

    let validation = PipelineValidator::validate(&page);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            print_error(error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if verbose {
        print_section("Page summary");
        println!("  Name: {}", page.name);
        println!("  Template: {}", page.template);
        println!("  Steps: {}", page.steps.len());
        for step in &page.steps {
            match step {
                StepDefinition::Fetch(fetch) => {
                    println!("    - {} ({:?})", fetch.result, fetch.fetch);
                }
                StepDefinition::Parallel { parallel } => {
                    let results: Vec<&str> = parallel.iter().map(|f| f.result.as_str()).collect();
                    println!("    - parallel {}", format!("[{}]", results.join(", ")).dimmed());
                }
            }
        }
    }

    println!();

    if !validation.is_valid() {
        Err(miette::miette!("Page validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Page is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Page is valid!".green().bold());
        Ok(())
    }
}
