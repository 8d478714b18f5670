// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Page definition structures
//!
//! Defines the YAML schema for page files and compiles a parsed page into a
//! runnable [`Pipeline`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::Pipeline;
use crate::cache::Cache;
use crate::context::Context;
use crate::errors::{PipelineError, PipelineResult};
use crate::render::{JsonSchema, SchemaRegistry, TemplateRenderer};
use crate::source::DataSource;
use crate::step::{
    all_of, any_of, has_key, has_param, lacks_param, Cached, DatasetSelector, FallbackPolicy,
    FetchMany, FetchManyFromAll, FetchOne, FetchOneFromAll, FetchSpec, LogPageError, Parallel,
    Predicate, RenderTemplate, SharedStep, When, DEFAULT_DATASET,
};

/// Prefix of view paths that read route parameters
const PARAMS_PREFIX: &str = "params.";

/// Page definition from a page YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDefinition {
    /// Page name
    pub name: String,

    /// Page description
    #[serde(default)]
    pub description: Option<String>,

    /// Template rendered at the end of the pipeline
    pub template: String,

    /// Label reported when rendering fails (defaults to the page name)
    #[serde(default)]
    pub handler: Option<String>,

    /// Prefix used when logging page errors
    #[serde(default = "default_controller")]
    pub controller: String,

    /// Steps in execution order
    pub steps: Vec<StepDefinition>,

    /// View-model entries: name to context path (`params.<name>` for route params)
    #[serde(default)]
    pub view: BTreeMap<String, String>,

    /// JSON Schema the view-model must satisfy
    #[serde(default)]
    pub schema: Option<Value>,
}

fn default_controller() -> String {
    "PageController".to_string()
}

/// One sequential step of a page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepDefinition {
    /// Fetches run concurrently
    Parallel { parallel: Vec<FetchDefinition> },
    /// A single fetch
    Fetch(FetchDefinition),
}

/// Kind of fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchKind {
    One,
    Many,
    OneFromAll,
    ManyFromAll,
}

impl FetchKind {
    pub fn is_single(&self) -> bool {
        matches!(self, Self::One)
    }

    pub fn is_all_datasets(&self) -> bool {
        matches!(self, Self::OneFromAll | Self::ManyFromAll)
    }
}

/// A fetch step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchDefinition {
    /// What to fetch
    pub fetch: FetchKind,

    /// Context key the result is stored under
    pub result: String,

    /// Query text with `{placeholder}` substitutions
    pub query: String,

    /// `default`, `params`, `performance` or a dataset name
    #[serde(default)]
    pub dataset: Option<String>,

    /// What a single-record fetch does without rows
    #[serde(default)]
    pub fallback: Option<FallbackPolicy>,

    /// Only fetch when this condition holds
    #[serde(default)]
    pub when: Option<Condition>,

    /// Value stored under `result` when `when` does not hold
    #[serde(default)]
    pub otherwise: Option<Value>,

    /// Serve the result from the cache when one is configured
    #[serde(default)]
    pub cache: bool,

    /// Datasets for the all-datasets fetches (defaults to the configured list)
    #[serde(default)]
    pub datasets: Vec<String>,
}

impl FetchDefinition {
    fn selector(&self, default_dataset: &str) -> DatasetSelector {
        match self.dataset.as_deref() {
            None | Some("default") if default_dataset == DEFAULT_DATASET => DatasetSelector::Default,
            None | Some("default") => DatasetSelector::Named(default_dataset.to_string()),
            Some("params") => DatasetSelector::FromParams,
            Some("performance") => DatasetSelector::PerformanceDb,
            Some(name) => DatasetSelector::Named(name.to_string()),
        }
    }
}

/// Condition guarding a fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    HasParam(String),
    LacksParam(String),
    HasKey(String),
    AllOf(Vec<Condition>),
    AnyOf(Vec<Condition>),
}

impl Condition {
    pub fn to_predicate(&self) -> Predicate {
        match self {
            Self::HasParam(name) => has_param(name.clone()),
            Self::LacksParam(name) => lacks_param(name.clone()),
            Self::HasKey(key) => has_key(key.clone()),
            Self::AllOf(conditions) => all_of(conditions.iter().map(Self::to_predicate).collect()),
            Self::AnyOf(conditions) => any_of(conditions.iter().map(Self::to_predicate).collect()),
        }
    }
}

/// Collaborators a page needs to run
#[derive(Clone)]
pub struct PageDeps {
    pub source: Arc<dyn DataSource>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub schemas: Arc<SchemaRegistry>,
    /// Set when caching is enabled
    pub cache: Option<Arc<dyn Cache>>,
    pub cache_ttl: Option<Duration>,
    /// Datasets for the all-datasets fetches
    pub datasets: Vec<String>,
    pub default_dataset: String,
    pub validate_templates: bool,
}

impl PageDeps {
    pub fn new(source: Arc<dyn DataSource>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            source,
            renderer,
            schemas: Arc::new(SchemaRegistry::new()),
            cache: None,
            cache_ttl: None,
            datasets: Vec::new(),
            default_dataset: DEFAULT_DATASET.to_string(),
            validate_templates: true,
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\}")
            .unwrap_or_else(|e| panic!("invalid placeholder pattern: {}", e))
    })
}

/// Names of the `{placeholder}`s in `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<&str> {
    placeholder_pattern()
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replace placeholders from route params, then from context values
///
/// String values have single quotes doubled so they can sit inside SQL
/// string literals.
pub fn substitute(text: &str, ctx: &Context) -> PipelineResult<String> {
    let mut missing: Option<String> = None;
    let result = placeholder_pattern().replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        if let Some(param) = ctx.param(name) {
            return param.replace('\'', "''");
        }
        match ctx.lookup_path(name) {
            Some(Value::String(s)) => s.replace('\'', "''"),
            Some(Value::Null) | None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
            Some(other) => other.to_string(),
        }
    });

    match missing {
        Some(name) => Err(PipelineError::MissingParam { name }),
        None => Ok(result.into_owned()),
    }
}

fn view_value(ctx: &Context, path: &str) -> Value {
    if let Some(param) = path.strip_prefix(PARAMS_PREFIX) {
        return ctx
            .param(param)
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null);
    }
    ctx.lookup_path(path).cloned().unwrap_or(Value::Null)
}

impl PageDefinition {
    /// Load a page definition from a YAML file
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::DefinitionNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a page definition from a YAML string
    pub fn from_yaml(yaml: &str) -> PipelineResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the page definition to YAML
    pub fn to_yaml(&self) -> PipelineResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Label used for render failures
    pub fn handler(&self) -> &str {
        self.handler.as_deref().unwrap_or(&self.name)
    }

    /// Every fetch in declaration order, parallel groups flattened
    pub fn fetches(&self) -> impl Iterator<Item = &FetchDefinition> {
        self.steps.iter().flat_map(|step| match step {
            StepDefinition::Fetch(fetch) => std::slice::from_ref(fetch).iter(),
            StepDefinition::Parallel { parallel } => parallel.iter(),
        })
    }

    /// Build the view-model for a finished context
    ///
    /// Without `view` entries every context value is exposed.
    pub fn view_model(&self, ctx: &Context) -> Value {
        if self.view.is_empty() {
            return ctx.to_value();
        }
        let map: Map<String, Value> = self
            .view
            .iter()
            .map(|(name, path)| (name.clone(), view_value(ctx, path)))
            .collect();
        Value::Object(map)
    }

    /// Compile into a runnable pipeline
    pub fn compile(&self, deps: &PageDeps) -> PipelineResult<Pipeline> {
        if self.steps.is_empty() {
            return Err(PipelineError::InvalidDefinition {
                reason: format!("page '{}' has no steps", self.name),
                help: Some("Add at least one fetch under `steps`".into()),
            });
        }

        let mut builder = Pipeline::builder(self.name.clone())
            .diagnostics(LogPageError::new(self.controller.clone()));

        for (index, step) in self.steps.iter().enumerate() {
            let compiled: SharedStep = match step {
                StepDefinition::Fetch(fetch) => compile_fetch(fetch, deps)?,
                StepDefinition::Parallel { parallel } => {
                    let branches = parallel
                        .iter()
                        .map(|fetch| compile_fetch(fetch, deps))
                        .collect::<PipelineResult<Vec<_>>>()?;
                    Arc::new(Parallel::new(format!("parallel[{}]", index), branches))
                }
            };
            builder = builder.shared(compiled);
        }

        let schemas = match &self.schema {
            Some(schema) => {
                let mut registry = (*deps.schemas).clone();
                registry.register(&self.template, Arc::new(JsonSchema::new(schema.clone())?));
                Arc::new(registry)
            }
            None => Arc::clone(&deps.schemas),
        };

        let page = self.clone();
        let render = RenderTemplate::new(
            self.template.clone(),
            self.handler().to_string(),
            move |ctx| page.view_model(ctx),
            Arc::clone(&deps.renderer),
            schemas,
        )
        .validate_templates(deps.validate_templates);

        Ok(builder.step(render).build())
    }
}

fn compile_fetch(def: &FetchDefinition, deps: &PageDeps) -> PipelineResult<SharedStep> {
    if def.result.trim().is_empty() {
        return Err(PipelineError::invalid_definition("fetch without a result key"));
    }

    let query = def.query.clone();
    let spec = FetchSpec::try_new(def.result.clone(), move |ctx| substitute(&query, ctx))
        .dataset(def.selector(&deps.default_dataset));

    let datasets = if def.datasets.is_empty() {
        deps.datasets.clone()
    } else {
        def.datasets.clone()
    };
    if def.fetch.is_all_datasets() && datasets.is_empty() {
        return Err(PipelineError::InvalidDefinition {
            reason: format!("'{}' fetches from all datasets but none are listed", def.result),
            help: Some("Set `datasets` on the fetch or `datasette.datasets` in the config".into()),
        });
    }

    let source = Arc::clone(&deps.source);
    let cache_spec = spec.clone();
    let cache_scope = if def.fetch.is_all_datasets() {
        format!("{:?}:{}", def.fetch, datasets.join(","))
    } else {
        format!("{:?}", def.fetch)
    };
    let mut step: SharedStep = match def.fetch {
        FetchKind::One => Arc::new(
            FetchOne::new(source, spec).with_fallback(def.fallback.unwrap_or_default()),
        ),
        FetchKind::Many => Arc::new(FetchMany::new(source, spec)),
        FetchKind::OneFromAll => Arc::new(FetchOneFromAll::new(source, spec, datasets)),
        FetchKind::ManyFromAll => Arc::new(FetchManyFromAll::new(source, spec, datasets)),
    };

    if def.cache {
        if let Some(cache) = &deps.cache {
            let mut cached = Cached::by_query(step, cache_spec, cache_scope, Arc::clone(cache));
            if let Some(ttl) = deps.cache_ttl {
                cached = cached.ttl(ttl);
            }
            step = Arc::new(cached);
        }
    }

    if let Some(condition) = &def.when {
        let mut when = When::new(condition.to_predicate(), step);
        if let Some(value) = def.otherwise.clone() {
            let key = def.result.clone();
            when = when.otherwise(move |ctx| ctx.insert(key.clone(), value.clone()));
        }
        step = Arc::new(when);
    }

    Ok(step)
}
