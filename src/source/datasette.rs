// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Datasette-backed data source
//!
//! Queries go to `{base_url}/{dataset}.json?sql=...&_shape=objects`, which
//! answers with `{"ok": true, "rows": [{...}, ...]}`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{DataSource, QueryResult, Record};
use crate::config::DatasetteSettings;
use crate::errors::PipelineError;
use crate::logging::LogType;

/// User-Agent string for outgoing queries.
const USER_AGENT: &str = concat!("pageflow/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct DatasetteResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    rows: Vec<Record>,
}

/// HTTP client for a Datasette instance
#[derive(Debug, Clone)]
pub struct DatasetteSource {
    client: Client,
    base_url: String,
}

impl DatasetteSource {
    /// Create a client for `base_url` with a request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &DatasetteSettings) -> Result<Self, PipelineError> {
        Self::new(
            settings.base_url.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// URL queried for a dataset
    pub fn dataset_url(&self, dataset: &str) -> String {
        format!("{}/{}.json", self.base_url, dataset)
    }
}

#[async_trait]
impl DataSource for DatasetteSource {
    async fn run_query(&self, query: &str, dataset: &str) -> Result<QueryResult, PipelineError> {
        let start = Instant::now();
        let url = self.dataset_url(dataset);

        let response = self
            .client
            .get(&url)
            .query(&[("sql", query), ("_shape", "objects")])
            .send()
            .await
            .map_err(|e| {
                warn!(log_type = %LogType::External, dataset, error_message = %e, "datasette request failed");
                PipelineError::data_source_caused(dataset, "request failed", e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::data_source_caused(dataset, "reading response failed", e))?;
        let parsed = serde_json::from_str::<DatasetteResponse>(&text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("datasette answered with status {}", status));
            warn!(log_type = %LogType::External, dataset, %status, error_message = %message, "datasette query rejected");
            return Err(PipelineError::data_source(dataset, message));
        }

        let body = parsed
            .map_err(|e| PipelineError::data_source_caused(dataset, "invalid response", e))?;
        if body.ok == Some(false) {
            let message = body
                .error
                .unwrap_or_else(|| "datasette reported a failed query".to_string());
            warn!(log_type = %LogType::External, dataset, error_message = %message, "datasette query rejected");
            return Err(PipelineError::data_source(dataset, message));
        }

        debug!(
            log_type = %LogType::External,
            dataset,
            rows = body.rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "datasette query complete"
        );

        Ok(QueryResult::new(body.rows))
    }
}
