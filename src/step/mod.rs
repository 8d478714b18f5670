// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Pipeline steps
//!
//! A [`Step`] is one unit of a page's request handling. It reads and writes the
//! request [`Context`] and reports an [`Outcome`]:
//!
//! - [`Outcome::Proceed`]: the next step may run;
//! - [`Outcome::Abort`]: something failed, the pipeline stops and the failure
//!   goes to the diagnostic step;
//! - [`Outcome::Emit`]: a response has already been decided (e.g. "not found"),
//!   the pipeline stops without an error.

mod cached;
mod conditional;
mod diagnostic;
mod fetch;
mod parallel;
mod render;

pub use cached::{params_key, query_key, Cached};
pub use conditional::{
    all_of, any_of, fetch_if, has_key, has_param, lacks_param, only_if, Predicate, When,
};
pub use diagnostic::LogPageError;
pub use fetch::{
    DatasetSelector, FallbackPolicy, FetchManyFromAll, FetchMany, FetchOne, FetchOneFromAll,
    FetchSpec, DEFAULT_DATASET, PERFORMANCE_DATASET,
};
pub use parallel::Parallel;
pub use render::RenderTemplate;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::PipelineError;
use crate::render::Response;

/// A failed step: the error plus the name of the operation that failed
#[derive(Debug)]
pub struct Failure {
    pub error: PipelineError,
    /// Attributable label used by the diagnostic step
    pub label: Option<String>,
}

impl Failure {
    pub fn new(label: impl Into<String>, error: PipelineError) -> Self {
        Self {
            error,
            label: Some(label.into()),
        }
    }

    /// A failure nobody attributed; reaching the diagnostic step with one is a wiring bug
    pub fn unlabelled(error: PipelineError) -> Self {
        Self { error, label: None }
    }
}

/// Result of running a step
#[derive(Debug)]
pub enum Outcome {
    Proceed,
    Abort(Failure),
    Emit(Response),
}

impl Outcome {
    /// Abort with a labelled error
    pub fn abort(label: impl Into<String>, error: PipelineError) -> Self {
        Self::Abort(Failure::new(label, error))
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }

    /// Whether this outcome stops a pipeline
    pub fn stops(&self) -> bool {
        !self.is_proceed()
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Abort(_) => "abort",
            Self::Emit(_) => "emit",
        }
    }
}

/// Trait for pipeline steps
#[async_trait]
pub trait Step: Send + Sync {
    /// Name used in logs and as the default diagnostic label
    fn name(&self) -> &str;

    /// Run the step against the request context
    async fn run(&self, ctx: &mut Context) -> Outcome;
}

/// Steps are shared between pipelines and parallel branches
pub type SharedStep = Arc<dyn Step>;

/// Step built from an async closure
///
/// `Err` returned by the closure becomes an [`Outcome::Abort`] labelled with
/// the step's name, so fallible helpers never escape the pipeline.
pub struct FnStep<F> {
    label: String,
    func: F,
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(&mut Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PipelineError>> + Send,
{
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        match (self.func)(ctx).await {
            Ok(()) => Outcome::Proceed,
            Err(error) => Outcome::abort(self.label.clone(), error),
        }
    }
}

/// Wrap a fallible async function as a step
///
/// The closure receives the context and returns a future; since the future
/// cannot borrow the context across an await here, compute what is needed
/// from `ctx` up front and move it into the future.
pub fn from_fn<F, Fut>(label: impl Into<String>, func: F) -> FnStep<F>
where
    F: Fn(&mut Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PipelineError>> + Send,
{
    FnStep {
        label: label.into(),
        func,
    }
}

/// Step that sets context values synchronously and always proceeds
pub struct SetValues<F> {
    label: String,
    func: F,
}

#[async_trait]
impl<F> Step for SetValues<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        (self.func)(ctx);
        Outcome::Proceed
    }
}

/// Wrap a synchronous context update as a step
pub fn set_values<F>(label: impl Into<String>, func: F) -> SetValues<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    SetValues {
        label: label.into(),
        func,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::empty_ctx;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_from_fn_labels_errors() {
        let step = from_fn("loadThing", |_ctx: &mut Context| async {
            Err::<(), _>(PipelineError::step("nope"))
        });

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("loadThing"));
                assert_eq!(failure.error.to_string(), "nope");
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_set_values_proceeds() {
        let step = set_values("defaults", |ctx: &mut Context| {
            ctx.insert("resource", json!({ "resource": "" }));
        });

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.get("resource"), Some(&json!({ "resource": "" })));
    }
}
