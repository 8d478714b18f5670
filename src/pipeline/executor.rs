// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Sequential pipeline execution
//!
//! Runs a page's steps in declaration order, stops at the first step that
//! does not proceed and routes aborts through the diagnostic step.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::logging::LogType;
use crate::render::Response;
use crate::step::{LogPageError, Outcome, SharedStep, Step};

/// Ordered steps plus the handler that reports their failures
pub struct Pipeline {
    name: String,
    steps: Vec<SharedStep>,
    diagnostics: Arc<LogPageError>,
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<SharedStep>,
    diagnostics: Option<Arc<LogPageError>>,
}

impl PipelineBuilder {
    /// Append a step
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append an already shared step
    pub fn shared(mut self, step: SharedStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the failure handler (defaults to one prefixed with the pipeline name)
    pub fn diagnostics(mut self, handler: LogPageError) -> Self {
        self.diagnostics = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Pipeline {
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(LogPageError::new(self.name.clone())));
        Pipeline {
            name: self.name,
            steps: self.steps,
            diagnostics,
        }
    }
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn diagnostics(&self) -> &LogPageError {
        &self.diagnostics
    }

    /// Run the steps in order without reporting failures
    async fn run_steps(&self, ctx: &mut Context) -> Outcome {
        for step in &self.steps {
            let start = Instant::now();
            let outcome = step.run(ctx).await;
            debug!(
                pipeline = %self.name,
                step = step.name(),
                outcome = outcome.kind(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "step finished"
            );
            if outcome.stops() {
                return outcome;
            }
        }
        Outcome::Proceed
    }

    /// Run the pipeline
    ///
    /// An abort is reported through the diagnostic step exactly once and then
    /// returned.
    pub async fn run(&self, ctx: &mut Context) -> Outcome {
        match self.run_steps(ctx).await {
            Outcome::Abort(failure) => Outcome::Abort(self.diagnostics.report(ctx, failure)),
            outcome => outcome,
        }
    }

    /// Run the pipeline and decide the response for the host
    pub async fn respond(&self, ctx: &mut Context) -> Response {
        info!(
            log_type = %LogType::Request,
            request_id = %ctx.request_id(),
            endpoint = ctx.endpoint(),
            pipeline = %self.name,
            "handling request"
        );

        let response = match self.run(ctx).await {
            Outcome::Proceed => ctx.take_response().unwrap_or_else(|| {
                warn!(
                    log_type = %LogType::App,
                    pipeline = %self.name,
                    "pipeline finished without rendering a response"
                );
                Response::error(500)
            }),
            Outcome::Emit(response) => response,
            Outcome::Abort(failure) => Response::error(failure.error.status_code()),
        };

        info!(
            log_type = %LogType::Response,
            request_id = %ctx.request_id(),
            endpoint = ctx.endpoint(),
            status = response.status,
            duration_ms = ctx.elapsed().as_millis() as u64,
            "response"
        );
        response
    }
}

/// A nested pipeline leaves reporting to the outermost one
#[async_trait]
impl Step for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        self.run_steps(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use crate::render::JsonRenderer;
    use crate::render::SchemaRegistry;
    use crate::step::testing::{empty_ctx, FixedStep};
    use crate::step::RenderTemplate;
    use serde_json::json;
    use std::sync::Mutex;

    fn fixed(name: &str, ran: &Arc<Mutex<Vec<String>>>, outcome: fn() -> Outcome) -> FixedStep {
        FixedStep {
            name: name.into(),
            writes: Some((name.into(), json!(name))),
            ran: Arc::clone(ran),
            outcome,
        }
    }

    fn abort() -> Outcome {
        Outcome::abort("second", PipelineError::step("boom"))
    }

    #[tokio::test]
    async fn test_runs_in_order_and_short_circuits() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder("page")
            .step(fixed("first", &ran, || Outcome::Proceed))
            .step(fixed("second", &ran, abort))
            .step(fixed("third", &ran, || Outcome::Proceed))
            .build();

        let mut ctx = empty_ctx();
        assert!(matches!(pipeline.run(&mut ctx).await, Outcome::Abort(_)));
        assert_eq!(*ran.lock().unwrap(), vec!["first", "second"]);
        assert!(!ctx.contains("third"));
        assert_eq!(pipeline.diagnostics().reported(), 1);
    }

    #[tokio::test]
    async fn test_emit_stops_without_reporting() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::builder("page")
            .step(fixed("first", &ran, || {
                Outcome::Emit(Response::not_found("nope"))
            }))
            .step(fixed("second", &ran, || Outcome::Proceed))
            .build();

        let mut ctx = empty_ctx();
        let response = pipeline.respond(&mut ctx).await;
        assert_eq!(response.status, 404);
        assert_eq!(*ran.lock().unwrap(), vec!["first"]);
        assert_eq!(pipeline.diagnostics().reported(), 0);
    }

    #[tokio::test]
    async fn test_nested_pipeline_reports_once() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let inner = Pipeline::builder("inner")
            .step(fixed("second", &ran, abort))
            .build();
        let inner = Arc::new(inner);
        let outer = Pipeline::builder("outer").shared(inner.clone()).build();

        let mut ctx = empty_ctx();
        let response = outer.respond(&mut ctx).await;
        assert_eq!(response.status, 500);
        assert_eq!(outer.diagnostics().reported(), 1);
        assert_eq!(inner.diagnostics().reported(), 0);
    }

    #[tokio::test]
    async fn test_respond_returns_rendered_page() {
        let pipeline = Pipeline::builder("page")
            .step(RenderTemplate::new(
                "start.html",
                "getStarted",
                |_| json!({ "pageName": "Start" }),
                Arc::new(JsonRenderer),
                Arc::new(SchemaRegistry::new()),
            ))
            .build();

        let mut ctx = empty_ctx();
        let response = pipeline.respond(&mut ctx).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.template, "start.html");
    }

    #[tokio::test]
    async fn test_respond_without_render_is_an_error_page() {
        let pipeline = Pipeline::builder("page").build();
        let mut ctx = empty_ctx();
        assert_eq!(pipeline.respond(&mut ctx).await.status, 500);
    }

    #[tokio::test]
    async fn test_missing_param_maps_to_bad_request() {
        let pipeline = Pipeline::builder("page")
            .step(crate::step::from_fn("needsLpa", |ctx: &mut Context| {
                let missing = ctx.param("lpa").is_none();
                async move {
                    if missing {
                        Err(PipelineError::MissingParam { name: "lpa".into() })
                    } else {
                        Ok(())
                    }
                }
            }))
            .build();

        let mut ctx = empty_ctx();
        assert_eq!(pipeline.respond(&mut ctx).await.status, 400);
    }
}
