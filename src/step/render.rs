// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Terminal render step

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Outcome, Step};
use crate::context::Context;
use crate::errors::PipelineError;
use crate::logging::LogType;
use crate::render::{SchemaRegistry, TemplateRenderer};

type ViewFn = Arc<dyn Fn(&Context) -> Value + Send + Sync>;

/// Builds a view-model, validates it and renders the template
///
/// The rendered response is stored in the context's response slot.
pub struct RenderTemplate {
    template: String,
    label: String,
    view: ViewFn,
    renderer: Arc<dyn TemplateRenderer>,
    schemas: Arc<SchemaRegistry>,
    validate: bool,
}

impl RenderTemplate {
    pub fn new(
        template: impl Into<String>,
        label: impl Into<String>,
        view: impl Fn(&Context) -> Value + Send + Sync + 'static,
        renderer: Arc<dyn TemplateRenderer>,
        schemas: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            template: template.into(),
            label: label.into(),
            view: Arc::new(view),
            renderer,
            schemas,
            validate: true,
        }
    }

    /// Turn view-model validation on or off (off in production and staging)
    pub fn validate_templates(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn check(&self, view_model: &Value) -> Result<(), PipelineError> {
        if !self.validate {
            return Ok(());
        }

        self.schemas
            .validate(&self.template, view_model)
            .map_err(|failure| {
                let error = PipelineError::Validation {
                    template: self.template.clone(),
                    issues: failure
                        .issues
                        .iter()
                        .map(|issue| format!("{}: {}", issue.path, issue.message))
                        .collect(),
                };
                warn!(
                    log_type = %LogType::DataValidation,
                    label = %self.label,
                    paths = ?failure.paths(),
                    "{}",
                    error
                );
                error
            })
    }
}

#[async_trait]
impl Step for RenderTemplate {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let view_model = (self.view)(ctx);

        if let Err(e) = self.check(&view_model) {
            return Outcome::abort(self.label.clone(), e);
        }

        match self.renderer.render(&self.template, &view_model).await {
            Ok(response) => {
                info!(
                    log_type = %LogType::PageView,
                    request_id = %ctx.request_id(),
                    endpoint = ctx.endpoint(),
                    template = %self.template,
                    status = response.status,
                    "rendered"
                );
                debug!(
                    log_type = %LogType::Metric,
                    endpoint = ctx.endpoint(),
                    duration_ms = ctx.elapsed().as_millis() as u64,
                    "request duration"
                );
                ctx.respond(response);
                Outcome::Proceed
            }
            Err(e) => Outcome::abort(self.label.clone(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{JsonRenderer, JsonSchema, Response};
    use crate::step::testing::empty_ctx;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        rendered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TemplateRenderer for RecordingRenderer {
        async fn render(&self, template: &str, _view: &Value) -> Result<Response, PipelineError> {
            self.rendered.lock().unwrap().push(template.to_string());
            Ok(Response::ok(template, "<html>"))
        }
    }

    struct BrokenRenderer;

    #[async_trait]
    impl TemplateRenderer for BrokenRenderer {
        async fn render(&self, template: &str, _view: &Value) -> Result<Response, PipelineError> {
            Err(PipelineError::Render {
                template: template.to_string(),
                message: "syntax error".into(),
            })
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "required": ["pageName"],
            "properties": { "pageName": { "type": "string", "minLength": 1 } }
        }))
        .unwrap();
        Arc::new(SchemaRegistry::new().with("start.html", schema))
    }

    #[tokio::test]
    async fn test_renders_into_response_slot() {
        let renderer = Arc::new(RecordingRenderer::default());
        let step = RenderTemplate::new(
            "start.html",
            "getStarted",
            |ctx| json!({ "pageName": ctx.get("name").cloned().unwrap_or(json!("Start")) }),
            renderer.clone(),
            registry(),
        );

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.response().map(|r| r.status), Some(200));
        assert_eq!(*renderer.rendered.lock().unwrap(), vec!["start.html"]);
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_before_rendering() {
        let renderer = Arc::new(RecordingRenderer::default());
        let step = RenderTemplate::new(
            "start.html",
            "getStarted",
            |_| json!({ "pageName": "" }),
            renderer.clone(),
            registry(),
        );

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("getStarted"));
                assert_eq!(
                    failure.error.to_string(),
                    "Found 1 validation issue in template params for 'start.html'"
                );
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
        assert!(renderer.rendered.lock().unwrap().is_empty());
        assert!(ctx.response().is_none());
    }

    #[tokio::test]
    async fn test_validation_can_be_disabled() {
        let step = RenderTemplate::new(
            "start.html",
            "getStarted",
            |_| json!({}),
            Arc::new(JsonRenderer),
            registry(),
        )
        .validate_templates(false);

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
    }

    #[tokio::test]
    async fn test_unregistered_template_accepts_anything() {
        let step = RenderTemplate::new(
            "other.html",
            "other",
            |_| json!(42),
            Arc::new(JsonRenderer),
            registry(),
        );

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
    }

    #[tokio::test]
    async fn test_renderer_failure_aborts_with_label() {
        let step = RenderTemplate::new(
            "start.html",
            "getStarted",
            |_| json!({ "pageName": "Start" }),
            Arc::new(BrokenRenderer),
            registry(),
        );

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("getStarted"));
                assert!(matches!(failure.error, PipelineError::Render { .. }));
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
    }
}
