// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Data sources
//!
//! Fetch steps run their queries through the [`DataSource`] trait. The
//! production implementation talks to a Datasette instance over HTTP.

mod datasette;

pub use datasette::DatasetteSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::PipelineError;

/// One result row, column name to value
pub type Record = Map<String, Value>;

/// Rows returned by a query, in source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Record>,
}

impl QueryResult {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First row, if any
    pub fn into_first(self) -> Option<Record> {
        self.rows.into_iter().next()
    }

    /// All rows as a JSON array
    pub fn into_value(self) -> Value {
        Value::Array(self.rows.into_iter().map(Value::Object).collect())
    }
}

/// Trait for query execution backends
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run `query` against `dataset`
    ///
    /// Fails on transport, parse or server errors. An empty result is not a
    /// failure.
    async fn run_query(&self, query: &str, dataset: &str) -> Result<QueryResult, PipelineError>;
}
