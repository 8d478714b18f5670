// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! View-model schemas
//!
//! Each template may register a [`Validator`] describing the parameters it
//! expects. Templates without one accept anything.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::PipelineError;

/// A single problem found while validating a view-model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Dotted path to the offending value (empty for the root)
    pub path: String,
    pub message: String,
}

/// Validation outcome carrying every issue found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<Issue>,
}

impl ValidationFailure {
    fn push(&mut self, path: &str, message: impl Into<String>) {
        self.issues.push(Issue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Paths with at least one issue, in discovery order
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for issue in &self.issues {
            let path = if issue.path.is_empty() {
                "<root>".to_string()
            } else {
                issue.path.clone()
            };
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

/// Something that can check a view-model
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), ValidationFailure>;
}

/// Validator used for templates without a registered schema
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _value: &Value) -> Result<(), ValidationFailure> {
        Ok(())
    }
}

/// A compiled JSON Schema for a template's view-model
pub struct JsonSchema {
    schema: Value,
    compiled: jsonschema::Validator,
}

impl JsonSchema {
    /// Compile `schema`; an invalid schema is a definition error
    pub fn new(schema: Value) -> Result<Self, PipelineError> {
        let compiled = jsonschema::validator_for(&schema).map_err(|e| {
            PipelineError::invalid_definition(format!("invalid view-model schema: {}", e))
        })?;
        Ok(Self { schema, compiled })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

impl Validator for JsonSchema {
    fn validate(&self, value: &Value) -> Result<(), ValidationFailure> {
        let mut failure = ValidationFailure::default();
        for error in self.compiled.iter_errors(value) {
            failure.push(&pointer_to_path(&error.instance_path.to_string()), error.to_string());
        }
        if failure.issues.is_empty() {
            Ok(())
        } else {
            Err(failure)
        }
    }
}

impl std::fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

/// `/datasets/0/endpoint` to `datasets.0.endpoint`
fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Template name to validator mapping, built once at startup
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<dyn Validator>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator for a template
    pub fn register(&mut self, template: &str, validator: Arc<dyn Validator>) {
        self.schemas.insert(template.to_string(), validator);
    }

    /// Builder-style [`SchemaRegistry::register`]
    pub fn with(mut self, template: &str, validator: impl Validator + 'static) -> Self {
        self.register(template, Arc::new(validator));
        self
    }

    pub fn has_schema(&self, template: &str) -> bool {
        self.schemas.contains_key(template)
    }

    /// Validator for `template`, accept-all when none is registered
    pub fn lookup(&self, template: &str) -> Arc<dyn Validator> {
        self.schemas
            .get(template)
            .cloned()
            .unwrap_or_else(|| Arc::new(AcceptAll))
    }

    pub fn validate(&self, template: &str, view_model: &Value) -> Result<(), ValidationFailure> {
        self.lookup(template).validate(view_model)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut templates: Vec<&String> = self.schemas.keys().collect();
        templates.sort();
        f.debug_struct("SchemaRegistry")
            .field("templates", &templates)
            .finish()
    }
}
