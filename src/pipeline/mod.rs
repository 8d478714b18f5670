// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Page pipelines
//!
//! A [`Pipeline`] is an ordered list of steps with a diagnostic handler. Pages
//! can be built in code or described in YAML as a [`PageDefinition`] and
//! compiled.

mod definition;
mod executor;
mod validation;

pub use definition::*;
pub use executor::{Pipeline, PipelineBuilder};
pub use validation::{PipelineValidator, ValidationResult};
