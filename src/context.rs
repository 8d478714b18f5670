// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Per-request context
//!
//! A [`Context`] is created for every incoming request and threaded through a
//! pipeline. Steps read route parameters and previously fetched values from it
//! and store their own results under caller-chosen keys.
//!
//! Parallel branches never share a context. Each branch works on a
//! [`Context::fork`] and the composer folds the branch's writes back with
//! [`Context::absorb`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::render::Response;

/// Identity of the request a context belongs to
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Unique id attached to every log line for this request
    pub id: Uuid,
    /// Original request path
    pub endpoint: String,
    /// Route parameters (e.g. `lpa`, `dataset`)
    pub params: HashMap<String, String>,
    /// When the request was received
    pub started: Instant,
}

impl RequestInfo {
    pub fn new(endpoint: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: endpoint.into(),
            params,
            started: Instant::now(),
        }
    }
}

/// Mutable key/value store for one pipeline run
#[derive(Debug, Clone)]
pub struct Context {
    request: Arc<RequestInfo>,
    values: HashMap<String, Value>,
    /// Keys written or removed since this context was created or forked, in order
    written: Vec<String>,
    response: Option<Response>,
}

impl Context {
    /// Create a fresh context for a request
    pub fn new(request: RequestInfo) -> Self {
        Self {
            request: Arc::new(request),
            values: HashMap::new(),
            written: Vec::new(),
            response: None,
        }
    }

    /// Shorthand for a context with an endpoint and route params
    pub fn for_endpoint<I, K, V>(endpoint: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(RequestInfo::new(endpoint, params))
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn request_id(&self) -> Uuid {
        self.request.id
    }

    pub fn endpoint(&self) -> &str {
        &self.request.endpoint
    }

    /// Look up a route parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.params.get(name).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store a value, replacing any previous value under `key`
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if !self.written.contains(&key) {
            self.written.push(key.clone());
        }
        self.values.insert(key, value);
    }

    /// Remove a value; a forked branch's removal carries over on absorb
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() && !self.written.iter().any(|k| k == key) {
            self.written.push(key.to_string());
        }
        removed
    }

    /// All keys currently present, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Every stored value as one JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Resolve a dotted path such as `orgInfo.entity` against stored values
    pub fn lookup_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Copy of this context for a parallel branch
    ///
    /// The fork sees every value present now, has no response and starts
    /// with an empty write log.
    pub fn fork(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            values: self.values.clone(),
            written: Vec::new(),
            response: None,
        }
    }

    /// Replay a forked branch's writes and removals onto this context
    pub fn absorb(&mut self, mut branch: Context) {
        for key in std::mem::take(&mut branch.written) {
            match branch.values.remove(&key) {
                Some(value) => self.insert(key, value),
                None => {
                    self.remove(&key);
                }
            }
        }
        if self.response.is_none() {
            self.response = branch.response.take();
        }
    }

    /// Record the response produced by a terminal step
    pub fn respond(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Time since the request was received
    pub fn elapsed(&self) -> Duration {
        self.request.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_and_values() {
        let mut ctx = Context::for_endpoint("/organisations/lpa", [("lpa", "some-lpa")]);
        assert_eq!(ctx.param("lpa"), Some("some-lpa"));
        assert_eq!(ctx.param("dataset"), None);

        ctx.insert("orgInfo", json!({ "name": "Some Council", "entity": 42 }));
        assert!(ctx.contains("orgInfo"));
        assert_eq!(ctx.lookup_path("orgInfo.entity"), Some(&json!(42)));
        assert_eq!(ctx.lookup_path("orgInfo.missing"), None);
    }

    #[test]
    fn test_fork_and_absorb_only_moves_branch_writes() {
        let mut parent = Context::for_endpoint("/", Vec::<(String, String)>::new());
        parent.insert("existing", json!(1));

        let mut branch = parent.fork();
        assert_eq!(branch.get("existing"), Some(&json!(1)));
        branch.insert("fetched", json!("row"));

        parent.insert("existing", json!(2));
        parent.absorb(branch);

        // the branch never wrote "existing", so the parent's newer value stays
        assert_eq!(parent.get("existing"), Some(&json!(2)));
        assert_eq!(parent.get("fetched"), Some(&json!("row")));
        assert_eq!(parent.keys(), vec!["existing", "fetched"]);
    }

    #[test]
    fn test_absorb_carries_branch_removals() {
        let mut parent = Context::for_endpoint("/", Vec::<(String, String)>::new());
        parent.insert("stale", json!("old"));
        parent.insert("kept", json!(1));

        let mut branch = parent.fork();
        assert_eq!(branch.remove("stale"), Some(json!("old")));
        branch.insert("scratch", json!(true));
        branch.remove("scratch");
        assert_eq!(branch.remove("never-there"), None);

        parent.absorb(branch);
        assert_eq!(parent.keys(), vec!["kept"]);
    }

    #[test]
    fn test_fork_shares_request_identity() {
        let parent = Context::for_endpoint("/x", [("a", "b")]);
        let branch = parent.fork();
        assert_eq!(parent.request_id(), branch.request_id());
        assert_eq!(branch.endpoint(), "/x");
    }
}
