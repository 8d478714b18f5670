// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Page definition validation
//!
//! Validates page definitions before they are compiled.

use std::collections::HashSet;

use crate::pipeline::{placeholders, FetchDefinition, PageDefinition, StepDefinition};

/// Page definition validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a page definition
    pub fn validate(page: &PageDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if page.steps.is_empty() {
            result.add_error("Page has no steps defined");
        }

        if page.template.trim().is_empty() {
            result.add_error("Page template is empty");
        }

        // results available to later steps
        let mut produced: HashSet<&str> = HashSet::new();

        for step in &page.steps {
            match step {
                StepDefinition::Fetch(fetch) => {
                    Self::validate_fetch(fetch, &produced, &mut result);
                    Self::record_result(fetch, &mut produced, &mut result);
                }
                StepDefinition::Parallel { parallel } => {
                    if parallel.is_empty() {
                        result.add_error("Parallel group is empty");
                    }

                    let mut in_group = HashSet::new();
                    for fetch in parallel {
                        if !fetch.result.is_empty() && !in_group.insert(fetch.result.as_str()) {
                            result.add_error(&format!(
                                "Duplicate result key '{}' in one parallel group",
                                fetch.result
                            ));
                        }
                        // siblings are not visible to each other
                        Self::validate_fetch(fetch, &produced, &mut result);
                    }
                    for fetch in parallel {
                        if in_group.contains(fetch.result.as_str()) {
                            Self::record_result(fetch, &mut produced, &mut result);
                        }
                    }
                }
            }
        }

        for (name, path) in &page.view {
            let root = path.split('.').next().unwrap_or_default();
            if root != "params" && !produced.contains(root) {
                result.add_warning(&format!(
                    "View entry '{}' references '{}', which no step produces",
                    name, root
                ));
            }
        }

        result
    }

    fn validate_fetch(
        fetch: &FetchDefinition,
        produced: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let name = if fetch.result.is_empty() {
            "<unnamed>"
        } else {
            fetch.result.as_str()
        };

        if fetch.result.trim().is_empty() {
            result.add_error("Fetch has an empty result key");
        }

        if fetch.query.trim().is_empty() {
            result.add_error(&format!("Fetch '{}': query is empty", name));
        }

        if fetch.fallback.is_some() && !fetch.fetch.is_single() {
            result.add_warning(&format!(
                "Fetch '{}': fallback only applies to single-record fetches and is ignored",
                name
            ));
        }

        if !fetch.datasets.is_empty() && !fetch.fetch.is_all_datasets() {
            result.add_warning(&format!(
                "Fetch '{}': datasets only apply to all-datasets fetches and are ignored",
                name
            ));
        }

        if fetch.otherwise.is_some() && fetch.when.is_none() {
            result.add_warning(&format!(
                "Fetch '{}': otherwise without when is never used",
                name
            ));
        }

        // dotted placeholders read earlier results; plain ones may be route params
        for placeholder in placeholders(&fetch.query) {
            if let Some((root, _)) = placeholder.split_once('.') {
                if !produced.contains(root) {
                    result.add_warning(&format!(
                        "Fetch '{}': placeholder '{{{}}}' references '{}', which no earlier step produces",
                        name, placeholder, root
                    ));
                }
            }
        }
    }

    fn record_result<'a>(
        fetch: &'a FetchDefinition,
        produced: &mut HashSet<&'a str>,
        result: &mut ValidationResult,
    ) {
        if fetch.result.is_empty() {
            return;
        }
        if !produced.insert(fetch.result.as_str()) {
            result.add_warning(&format!(
                "Result key '{}' is written by more than one step",
                fetch.result
            ));
        }
    }
}

/// Result of page validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
