// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Error types for pipeline steps
//!
//! Every failure a step can report is a [`PipelineError`]. Steps never return
//! these directly; they wrap them in [`crate::step::Failure`] together with the
//! label of the operation that failed.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Underlying cause kept on errors that wrap another library's failure
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pageflow operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main error type for pageflow
#[derive(Error, Debug, Diagnostic)]
pub enum PipelineError {
    // ─────────────────────────────────────────────────────────────────────────
    // Data fetching
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Query against dataset '{dataset}' failed: {message}")]
    #[diagnostic(code(pageflow::data_source))]
    DataSource {
        dataset: String,
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("HTTP client error")]
    #[diagnostic(code(pageflow::http))]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("Missing request parameter '{name}'")]
    #[diagnostic(
        code(pageflow::missing_param),
        help("Check the route provides '{name}' or that an earlier step stores it")
    )]
    MissingParam { name: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{}", validation_message(.template, .issues))]
    #[diagnostic(code(pageflow::validation))]
    Validation {
        template: String,
        issues: Vec<String>,
    },

    #[error("Rendering '{template}' failed: {message}")]
    #[diagnostic(code(pageflow::render))]
    Render { template: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Composition
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Parallel branch {branch} failed unexpectedly: {message}")]
    #[diagnostic(code(pageflow::branch_panicked))]
    BranchPanicked { branch: usize, message: String },

    #[error("{message}")]
    #[diagnostic(code(pageflow::step_failed))]
    StepFailed { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Definitions and configuration
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Page definition not found: {path}")]
    #[diagnostic(
        code(pageflow::definition_not_found),
        help("Pass the path of a page definition YAML file")
    )]
    DefinitionNotFound { path: PathBuf },

    #[error("Invalid page definition: {reason}")]
    #[diagnostic(code(pageflow::invalid_definition))]
    InvalidDefinition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(pageflow::config))]
    Config { message: String },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(pageflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cache
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cache error: {message}")]
    #[diagnostic(code(pageflow::cache_error))]
    Cache { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(pageflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(pageflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(pageflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(pageflow::toml_error))]
    Toml { message: String },
}

fn validation_message(template: &str, issues: &[String]) -> String {
    format!(
        "Found {} validation issue{} in template params for '{}'",
        issues.len(),
        if issues.len() == 1 { "" } else { "s" },
        template
    )
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl PipelineError {
    /// Create a free-form step failure
    pub fn step(message: impl Into<String>) -> Self {
        Self::StepFailed {
            message: message.into(),
        }
    }

    /// Create a data source failure for a dataset
    pub fn data_source(dataset: &str, message: impl Into<String>) -> Self {
        Self::DataSource {
            dataset: dataset.to_string(),
            message: message.into(),
            cause: None,
        }
    }

    /// Create a data source failure that keeps the error behind it
    pub fn data_source_caused(
        dataset: &str,
        message: impl Into<String>,
        cause: impl Into<Cause>,
    ) -> Self {
        Self::DataSource {
            dataset: dataset.to_string(),
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Create an invalid definition error without a hint
    pub fn invalid_definition(reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            reason: reason.into(),
            help: None,
        }
    }

    /// HTTP status the host should answer with when this error reaches it
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingParam { .. } => 400,
            _ => 500,
        }
    }

    /// Render the error together with its `source()` chain, outermost first
    pub fn chain(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            parts.push(cause.to_string());
            source = cause.source();
        }
        parts.join(": ")
    }
}
