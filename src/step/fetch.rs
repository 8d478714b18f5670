// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Fetch steps
//!
//! Each fetch step runs one query through a [`DataSource`] and stores the
//! result in the context under the result key of its `FetchSpec`. Failures
//! abort with the result key as the diagnostic label.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::{Outcome, Step};
use crate::context::Context;
use crate::errors::PipelineError;
use crate::logging::LogType;
use crate::render::Response;
use crate::source::{DataSource, QueryResult};

/// Dataset queried when a `FetchSpec` does not choose one
pub const DEFAULT_DATASET: &str = "digital-land";

/// Dataset holding the performance database
pub const PERFORMANCE_DATASET: &str = "performance";

type QueryFn = Arc<dyn Fn(&Context) -> Result<String, PipelineError> + Send + Sync>;
type DatasetFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// How a fetch step picks the dataset to query
#[derive(Clone, Default)]
pub enum DatasetSelector {
    /// [`DEFAULT_DATASET`]
    #[default]
    Default,
    /// A fixed dataset
    Named(String),
    /// The `dataset` route parameter
    FromParams,
    /// [`PERFORMANCE_DATASET`]
    PerformanceDb,
    /// Computed from the context
    Derived(DatasetFn),
}

impl DatasetSelector {
    pub fn derived(f: impl Fn(&Context) -> String + Send + Sync + 'static) -> Self {
        Self::Derived(Arc::new(f))
    }

    /// Dataset name for this request
    pub fn resolve(&self, ctx: &Context) -> Result<String, PipelineError> {
        match self {
            Self::Default => Ok(DEFAULT_DATASET.to_string()),
            Self::Named(name) => Ok(name.clone()),
            Self::PerformanceDb => Ok(PERFORMANCE_DATASET.to_string()),
            Self::Derived(f) => Ok(f(ctx)),
            Self::FromParams => match ctx.param("dataset") {
                Some(dataset) => Ok(dataset.to_string()),
                None => {
                    warn!(
                        log_type = %LogType::App,
                        endpoint = ctx.endpoint(),
                        "no \"dataset\" in request params"
                    );
                    Err(PipelineError::MissingParam {
                        name: "dataset".into(),
                    })
                }
            },
        }
    }
}

impl fmt::Debug for DatasetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::FromParams => write!(f, "FromParams"),
            Self::PerformanceDb => write!(f, "PerformanceDb"),
            Self::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

/// What a single-record fetch does when the query returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Answer with the "not found" page
    #[default]
    #[serde(rename = "not-found")]
    NotFoundPage,
    /// Carry on without setting the result key
    Continue,
}

/// Query, result key and dataset of a fetch step
#[derive(Clone)]
pub struct FetchSpec {
    query: QueryFn,
    result_key: String,
    dataset: DatasetSelector,
}

impl FetchSpec {
    /// Fetch whose query builder cannot fail
    pub fn new(
        result_key: impl Into<String>,
        query: impl Fn(&Context) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::try_new(result_key, move |ctx| Ok(query(ctx)))
    }

    /// Fetch whose query builder may fail (e.g. on a missing parameter)
    pub fn try_new(
        result_key: impl Into<String>,
        query: impl Fn(&Context) -> Result<String, PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            query: Arc::new(query),
            result_key: result_key.into(),
            dataset: DatasetSelector::Default,
        }
    }

    pub fn dataset(mut self, dataset: DatasetSelector) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    pub fn dataset_selector(&self) -> &DatasetSelector {
        &self.dataset
    }

    /// Build the query and resolve the dataset for this request
    pub fn prepare(&self, ctx: &Context) -> Result<(String, String), PipelineError> {
        let query = (self.query)(ctx)?;
        let dataset = self.dataset.resolve(ctx)?;
        Ok((query, dataset))
    }

    fn abort(&self, ctx: &Context, step: &str, error: PipelineError) -> Outcome {
        debug!(
            log_type = %LogType::DataFetch,
            error_message = %error,
            endpoint = ctx.endpoint(),
            result_key = %self.result_key,
            "{}: failed",
            step
        );
        Outcome::abort(self.result_key.clone(), error)
    }
}

impl fmt::Debug for FetchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchSpec")
            .field("result_key", &self.result_key)
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

/// Fetches a single record; zero rows trigger the fallback policy
pub struct FetchOne {
    source: Arc<dyn DataSource>,
    spec: FetchSpec,
    fallback: FallbackPolicy,
}

impl FetchOne {
    pub fn new(source: Arc<dyn DataSource>, spec: FetchSpec) -> Self {
        Self {
            source,
            spec,
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl Step for FetchOne {
    fn name(&self) -> &str {
        self.spec.result_key()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let key = self.spec.result_key();
        debug!(log_type = %LogType::DataFetch, result_key = key, "fetchOne");

        let (query, dataset) = match self.spec.prepare(ctx) {
            Ok(prepared) => prepared,
            Err(e) => return self.spec.abort(ctx, "fetchOne", e),
        };

        let result = match self.source.run_query(&query, &dataset).await {
            Ok(result) => result,
            Err(e) => return self.spec.abort(ctx, "fetchOne", e),
        };

        match result.into_first() {
            Some(row) => {
                ctx.insert(key, Value::Object(row));
                Outcome::Proceed
            }
            None => match self.fallback {
                FallbackPolicy::NotFoundPage => {
                    debug!(log_type = %LogType::DataFetch, result_key = key, dataset = %dataset, "fetchOne: no records");
                    Outcome::Emit(Response::not_found(format!("'{}' not found", key)))
                }
                FallbackPolicy::Continue => Outcome::Proceed,
            },
        }
    }
}

/// Fetches every matching record as an ordered array
pub struct FetchMany {
    source: Arc<dyn DataSource>,
    spec: FetchSpec,
}

impl FetchMany {
    pub fn new(source: Arc<dyn DataSource>, spec: FetchSpec) -> Self {
        Self { source, spec }
    }
}

#[async_trait]
impl Step for FetchMany {
    fn name(&self) -> &str {
        self.spec.result_key()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let key = self.spec.result_key();

        let (query, dataset) = match self.spec.prepare(ctx) {
            Ok(prepared) => prepared,
            Err(e) => return self.spec.abort(ctx, "fetchMany", e),
        };

        match self.source.run_query(&query, &dataset).await {
            Ok(result) => {
                debug!(
                    log_type = %LogType::DataFetch,
                    result_key = key,
                    result_count = result.len(),
                    "fetchMany"
                );
                ctx.insert(key, result.into_value());
                Outcome::Proceed
            }
            Err(e) => self.spec.abort(ctx, "fetchMany", e),
        }
    }
}

/// Run one query against every dataset concurrently, all-or-nothing
///
/// The first failing dataset aborts the remaining queries.
async fn query_all(
    source: &Arc<dyn DataSource>,
    query: &str,
    datasets: &[String],
) -> Result<Vec<(String, QueryResult)>, PipelineError> {
    let mut join_set = JoinSet::new();
    for (index, dataset) in datasets.iter().enumerate() {
        let source = Arc::clone(source);
        let query = query.to_string();
        let dataset = dataset.clone();
        join_set.spawn(async move {
            let result = source.run_query(&query, &dataset).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<QueryResult>> = vec![None; datasets.len()];
    let mut first_error: Option<PipelineError> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(result))) => results[index] = Some(result),
            Ok((index, Err(e))) => {
                error!(
                    log_type = %LogType::DataFetch,
                    dataset = %datasets[index],
                    error_message = %e,
                    "Query failed for dataset"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                    join_set.abort_all();
                }
            }
            Err(join_err) if join_err.is_cancelled() && first_error.is_some() => {}
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(PipelineError::step(format!(
                        "dataset query task failed: {}",
                        join_err
                    )));
                    join_set.abort_all();
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    Ok(datasets
        .iter()
        .cloned()
        .zip(results)
        .filter_map(|(dataset, result)| result.map(|r| (dataset, r)))
        .collect())
}

/// Fetches the first matching record from every dataset
///
/// Stores an object keyed by dataset name; datasets without a match are left out.
pub struct FetchOneFromAll {
    source: Arc<dyn DataSource>,
    spec: FetchSpec,
    datasets: Vec<String>,
}

impl FetchOneFromAll {
    pub fn new(source: Arc<dyn DataSource>, spec: FetchSpec, datasets: Vec<String>) -> Self {
        Self {
            source,
            spec,
            datasets,
        }
    }
}

#[async_trait]
impl Step for FetchOneFromAll {
    fn name(&self) -> &str {
        self.spec.result_key()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let query = match (self.spec.query)(ctx) {
            Ok(query) => query,
            Err(e) => return self.spec.abort(ctx, "fetchOneFromAllDatasets", e),
        };

        match query_all(&self.source, &query, &self.datasets).await {
            Ok(results) => {
                let found: Map<String, Value> = results
                    .into_iter()
                    .filter_map(|(dataset, result)| {
                        result.into_first().map(|row| (dataset, Value::Object(row)))
                    })
                    .collect();
                debug!(
                    log_type = %LogType::DataFetch,
                    result_key = self.spec.result_key(),
                    datasets = found.len(),
                    "fetchOneFromAllDatasets"
                );
                ctx.insert(self.spec.result_key(), Value::Object(found));
                Outcome::Proceed
            }
            Err(e) => self.spec.abort(ctx, "fetchOneFromAllDatasets", e),
        }
    }
}

/// Fetches every matching record from every dataset
///
/// Stores an object mapping dataset name to its rows; datasets without rows are left out.
pub struct FetchManyFromAll {
    source: Arc<dyn DataSource>,
    spec: FetchSpec,
    datasets: Vec<String>,
}

impl FetchManyFromAll {
    pub fn new(source: Arc<dyn DataSource>, spec: FetchSpec, datasets: Vec<String>) -> Self {
        Self {
            source,
            spec,
            datasets,
        }
    }
}

#[async_trait]
impl Step for FetchManyFromAll {
    fn name(&self) -> &str {
        self.spec.result_key()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let query = match (self.spec.query)(ctx) {
            Ok(query) => query,
            Err(e) => return self.spec.abort(ctx, "fetchManyFromAllDatasets", e),
        };

        match query_all(&self.source, &query, &self.datasets).await {
            Ok(results) => {
                let found: Map<String, Value> = results
                    .into_iter()
                    .filter(|(_, result)| !result.is_empty())
                    .map(|(dataset, result)| (dataset, result.into_value()))
                    .collect();
                debug!(
                    log_type = %LogType::DataFetch,
                    result_key = self.spec.result_key(),
                    datasets = found.len(),
                    "fetchManyFromAllDatasets"
                );
                ctx.insert(self.spec.result_key(), Value::Object(found));
                Outcome::Proceed
            }
            Err(e) => self.spec.abort(ctx, "fetchManyFromAllDatasets", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::testing::{empty_ctx, Reply, ScriptedSource};
    use serde_json::json;

    const QUERY: &str = "select * from organisation";

    fn spec(key: &str) -> FetchSpec {
        FetchSpec::new(key, |_ctx| QUERY.to_string())
    }

    #[tokio::test]
    async fn test_fetch_one_stores_first_row() {
        let source = Arc::new(ScriptedSource::new().reply(
            QUERY,
            Reply::Rows(vec![json!({ "id": 1 }), json!({ "id": 2 })]),
        ));
        let step = FetchOne::new(source.clone(), spec("orgInfo"));

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.get("orgInfo"), Some(&json!({ "id": 1 })));
        assert_eq!(source.calls(), vec![(QUERY.to_string(), DEFAULT_DATASET.to_string())]);
    }

    #[tokio::test]
    async fn test_fetch_one_not_found_emits_404() {
        let source = Arc::new(ScriptedSource::new().reply(QUERY, Reply::Rows(vec![])));
        let step = FetchOne::new(source, spec("orgInfo"));

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Emit(response) => assert_eq!(response.status, 404),
            other => panic!("expected emit, got {}", other.kind()),
        }
        assert!(!ctx.contains("orgInfo"));
    }

    #[tokio::test]
    async fn test_fetch_one_continue_leaves_key_absent() {
        let source = Arc::new(ScriptedSource::new().reply(QUERY, Reply::Rows(vec![])));
        let step = FetchOne::new(source, spec("resource")).with_fallback(FallbackPolicy::Continue);

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert!(!ctx.contains("resource"));
        assert!(ctx.keys().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_failure_is_labelled_with_result_key() {
        let source = Arc::new(ScriptedSource::new().reply(QUERY, Reply::Fail("timeout".into())));
        let step = FetchOne::new(source, spec("orgInfo"));

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("orgInfo"));
                assert!(failure.error.to_string().contains("timeout"));
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
        assert!(!ctx.contains("orgInfo"));
    }

    #[tokio::test]
    async fn test_fetch_many_zero_rows_stores_empty_list() {
        let source = Arc::new(ScriptedSource::new().reply(QUERY, Reply::Rows(vec![])));
        let step = FetchMany::new(source, spec("issues"));

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.get("issues"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_dataset_selectors() {
        let source = Arc::new(ScriptedSource::new());
        let mut ctx = Context::for_endpoint("/x", [("dataset", "brownfield-land")]);

        FetchMany::new(source.clone(), spec("a").dataset(DatasetSelector::FromParams))
            .run(&mut ctx)
            .await;
        FetchMany::new(source.clone(), spec("b").dataset(DatasetSelector::PerformanceDb))
            .run(&mut ctx)
            .await;
        FetchMany::new(
            source.clone(),
            spec("c").dataset(DatasetSelector::derived(|_| "fun-dataset".into())),
        )
        .run(&mut ctx)
        .await;

        let datasets: Vec<String> = source.calls().into_iter().map(|(_, d)| d).collect();
        assert_eq!(datasets, vec!["brownfield-land", "performance", "fun-dataset"]);
    }

    #[tokio::test]
    async fn test_missing_dataset_param_aborts_without_querying() {
        let source = Arc::new(ScriptedSource::new());
        let step = FetchMany::new(source.clone(), spec("rows").dataset(DatasetSelector::FromParams));

        let mut ctx = empty_ctx();
        assert!(matches!(step.run(&mut ctx).await, Outcome::Abort(_)));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_from_all_skips_empty_datasets() {
        let source = Arc::new(
            ScriptedSource::new()
                .reply(&format!("tree/{}", QUERY), Reply::Rows(vec![json!({ "entity": 1 })]))
                .reply(&format!("park/{}", QUERY), Reply::Rows(vec![])),
        );
        let step = FetchOneFromAll::new(source, spec("entity"), vec!["tree".into(), "park".into()]);

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.get("entity"), Some(&json!({ "tree": { "entity": 1 } })));
    }

    #[tokio::test]
    async fn test_fetch_many_from_all_keys_rows_by_dataset() {
        let source = Arc::new(
            ScriptedSource::new()
                .reply(&format!("tree/{}", QUERY), Reply::Rows(vec![]))
                .reply(
                    &format!("park/{}", QUERY),
                    Reply::Rows(vec![json!({ "n": 1 }), json!({ "n": 2 })]),
                ),
        );
        let step = FetchManyFromAll::new(source, spec("issues"), vec!["tree".into(), "park".into()]);

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(
            ctx.get("issues"),
            Some(&json!({ "park": [{ "n": 1 }, { "n": 2 }] }))
        );
    }

    #[tokio::test]
    async fn test_fetch_from_all_is_all_or_nothing() {
        let source = Arc::new(
            ScriptedSource::new()
                .reply(&format!("tree/{}", QUERY), Reply::Rows(vec![json!({ "n": 1 })]))
                .reply(&format!("park/{}", QUERY), Reply::Fail("boom".into())),
        );
        let step = FetchManyFromAll::new(source, spec("issues"), vec!["tree".into(), "park".into()]);

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => assert_eq!(failure.label.as_deref(), Some("issues")),
            other => panic!("expected abort, got {}", other.kind()),
        }
        assert!(!ctx.contains("issues"));
    }

    #[test]
    fn test_fallback_policy_names() {
        let policy: FallbackPolicy = serde_yaml::from_str("not-found").unwrap();
        assert_eq!(policy, FallbackPolicy::NotFoundPage);
        let policy: FallbackPolicy = serde_yaml::from_str("continue").unwrap();
        assert_eq!(policy, FallbackPolicy::Continue);
    }
}
