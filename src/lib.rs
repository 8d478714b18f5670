// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! # pageflow - page request pipelines
//!
//! `pageflow` builds the server-side data fetching of a page out of small,
//! composable steps and runs them per request.
//!
//! ## Features
//!
//! - **Fetch steps** - single record, many records, or across every dataset
//! - **Composition** - sequential pipelines, conditional steps, parallel fan-out
//! - **Uniform failures** - every abort carries the label of what failed
//! - **Validated rendering** - view-models are checked against template schemas
//! - **Page definitions** - describe pages in YAML and compile them
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pageflow::context::Context;
//! use pageflow::pipeline::Pipeline;
//! use pageflow::render::{JsonRenderer, SchemaRegistry};
//! use pageflow::source::DatasetteSource;
//! use pageflow::step::{FetchOne, FetchSpec, LogPageError, RenderTemplate};
//!
//! # async fn example() -> pageflow::PipelineResult<()> {
//! let source = Arc::new(DatasetteSource::new(
//!     "https://datasette.planning.data.gov.uk",
//!     Duration::from_secs(30),
//! )?);
//!
//! let pipeline = Pipeline::builder("overview")
//!     .step(FetchOne::new(
//!         source,
//!         FetchSpec::new("orgInfo", |ctx| {
//!             format!(
//!                 "select * from organisation where organisation = '{}'",
//!                 ctx.param("lpa").unwrap_or_default()
//!             )
//!         }),
//!     ))
//!     .step(RenderTemplate::new(
//!         "organisations/overview.html",
//!         "getOverview",
//!         |ctx| ctx.to_value(),
//!         Arc::new(JsonRenderer),
//!         Arc::new(SchemaRegistry::new()),
//!     ))
//!     .diagnostics(LogPageError::new("OrganisationsController"))
//!     .build();
//!
//! let mut ctx = Context::for_endpoint("/organisations/some-lpa", [("lpa", "some-lpa")]);
//! let response = pipeline.respond(&mut ctx).await;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod step;
pub mod utils;

// Re-export commonly used types
pub use context::Context;
pub use errors::{PipelineError, PipelineResult};
pub use pipeline::{PageDefinition, Pipeline};
pub use step::{Outcome, Step};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
