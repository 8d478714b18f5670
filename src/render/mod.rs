// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Template rendering seam
//!
//! The template engine itself lives outside this crate. Steps talk to it
//! through [`TemplateRenderer`] and validate view-models against the
//! [`SchemaRegistry`] first.

mod schema;

pub use schema::{AcceptAll, Issue, JsonSchema, SchemaRegistry, ValidationFailure, Validator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;

/// Template used for "not found" responses
pub const NOT_FOUND_TEMPLATE: &str = "errorPages/404";

/// Template used for every other failure page
pub const ERROR_TEMPLATE: &str = "errorPages/500";

/// A response produced by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Template that produced (or should produce) the body
    pub template: String,
    /// Rendered body
    pub body: String,
}

impl Response {
    /// A successfully rendered page
    pub fn ok(template: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            template: template.into(),
            body: body.into(),
        }
    }

    /// The "not found" page
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: 404,
            template: NOT_FOUND_TEMPLATE.to_string(),
            body: message.into(),
        }
    }

    /// The generic failure page; details stay in the logs
    pub fn error(status: u16) -> Self {
        let template = if status == 404 {
            NOT_FOUND_TEMPLATE
        } else {
            ERROR_TEMPLATE
        };
        Self {
            status,
            template: template.to_string(),
            body: "Sorry, there is a problem with the service".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for template renderers
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Render `template` with the given view-model
    async fn render(&self, template: &str, view_model: &Value) -> Result<Response, PipelineError>;
}

/// Renders the view-model itself as pretty-printed JSON
///
/// Stands in for a real template engine in the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderer;

#[async_trait]
impl TemplateRenderer for JsonRenderer {
    async fn render(&self, template: &str, view_model: &Value) -> Result<Response, PipelineError> {
        let body = serde_json::to_string_pretty(view_model).map_err(|e| PipelineError::Render {
            template: template.to_string(),
            message: e.to_string(),
        })?;
        Ok(Response::ok(template, body))
    }
}
