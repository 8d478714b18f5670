// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Cache wrapper for fetch steps

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchSpec, Outcome, SharedStep, Step};
use crate::cache::{hash_key, Cache};
use crate::context::Context;
use crate::logging::LogType;

type KeyFn = Arc<dyn Fn(&Context, &str) -> Option<String> + Send + Sync>;

/// Cache key built from the result key and the sorted route params
pub fn params_key(ctx: &Context, result_key: &str) -> String {
    let mut params: Vec<(&String, &String)> = ctx.request().params.iter().collect();
    params.sort();
    let params: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}:{}", result_key, params.join("&"))
}

/// Cache key built from the result key and a hash of the prepared query
///
/// `scope` holds anything else the result depends on, such as the dataset
/// list of an all-datasets fetch. `None` when the query cannot be prepared.
pub fn query_key(spec: &FetchSpec, scope: &str, ctx: &Context) -> Option<String> {
    let (query, dataset) = spec.prepare(ctx).ok()?;
    let material = format!("{}\n{}\n{}", scope, dataset, query);
    Some(format!("{}:{}", spec.result_key(), hash_key(&material)))
}

/// Serves `result_key` from a cache, running the inner step on a miss
///
/// Cache errors never fail the page: a failed read is a miss and a failed
/// write is only logged.
pub struct Cached {
    inner: SharedStep,
    result_key: String,
    key: KeyFn,
    cache: Arc<dyn Cache>,
    ttl: Option<Duration>,
}

impl Cached {
    pub fn new(
        inner: SharedStep,
        result_key: impl Into<String>,
        key: impl Fn(&Context, &str) -> Option<String> + Send + Sync + 'static,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            inner,
            result_key: result_key.into(),
            key: Arc::new(key),
            cache,
            ttl: None,
        }
    }

    /// Wrap `inner` using [`params_key`] for the cache key
    ///
    /// Only safe when the route params alone determine the result.
    pub fn by_params(inner: SharedStep, result_key: impl Into<String>, cache: Arc<dyn Cache>) -> Self {
        Self::new(inner, result_key, |ctx, key| Some(params_key(ctx, key)), cache)
    }

    /// Wrap the fetch built from `spec`, keyed by [`query_key`]
    pub fn by_query(
        inner: SharedStep,
        spec: FetchSpec,
        scope: impl Into<String>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let scope = scope.into();
        let result_key = spec.result_key().to_string();
        Self::new(
            inner,
            result_key,
            move |ctx, _| query_key(&spec, &scope, ctx),
            cache,
        )
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[async_trait]
impl Step for Cached {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let Some(key) = (self.key)(ctx, &self.result_key) else {
            return self.inner.run(ctx).await;
        };

        match self.cache.get(&key).await {
            Ok(Some(value)) => {
                debug!(log_type = %LogType::DataFetch, cache_key = %key, "cache hit");
                ctx.insert(self.result_key.clone(), value);
                return Outcome::Proceed;
            }
            Ok(None) => debug!(log_type = %LogType::DataFetch, cache_key = %key, "cache miss"),
            Err(e) => warn!(
                log_type = %LogType::App,
                cache_key = %key,
                error_message = %e,
                "cache read failed"
            ),
        }

        let outcome = self.inner.run(ctx).await;
        if outcome.is_proceed() {
            if let Some(value) = ctx.get(&self.result_key) {
                if let Err(e) = self.cache.store(&key, value, self.ttl).await {
                    warn!(
                        log_type = %LogType::App,
                        cache_key = %key,
                        error_message = %e,
                        "cache write failed"
                    );
                }
            }
        }
        outcome
    }
}
