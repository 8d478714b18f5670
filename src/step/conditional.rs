// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Conditional steps
//!
//! [`When`] runs its inner step only if a predicate over the context holds.
//! When it does, the inner outcome is adopted as is. When it does not, the
//! optional `otherwise` hook runs and the step proceeds.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{Outcome, SharedStep, Step};
use crate::context::Context;

/// Decision over the request context
pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

type Otherwise = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Run a step only when a predicate holds
pub struct When {
    predicate: Predicate,
    then: SharedStep,
    otherwise: Option<Otherwise>,
}

impl When {
    pub fn new(predicate: Predicate, then: SharedStep) -> Self {
        Self {
            predicate,
            then,
            otherwise: None,
        }
    }

    /// Hook run instead of the step when the predicate is false
    pub fn otherwise(mut self, f: impl Fn(&mut Context) + Send + Sync + 'static) -> Self {
        self.otherwise = Some(Arc::new(f));
        self
    }
}

#[async_trait]
impl Step for When {
    fn name(&self) -> &str {
        self.then.name()
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        if (self.predicate)(ctx) {
            return self.then.run(ctx).await;
        }

        debug!(step = self.then.name(), "condition not met, skipping");
        if let Some(otherwise) = &self.otherwise {
            otherwise(ctx);
        }
        Outcome::Proceed
    }
}

/// Fetch only when `predicate` holds, running `otherwise` when it does not
pub fn fetch_if(
    predicate: Predicate,
    step: SharedStep,
    otherwise: impl Fn(&mut Context) + Send + Sync + 'static,
) -> When {
    When::new(predicate, step).otherwise(otherwise)
}

/// Run `step` only when `predicate` holds
pub fn only_if(predicate: Predicate, step: SharedStep) -> When {
    When::new(predicate, step)
}

/// True when every predicate holds (true for an empty list)
pub fn all_of(predicates: Vec<Predicate>) -> Predicate {
    Arc::new(move |ctx: &Context| predicates.iter().all(|p| p(ctx)))
}

/// True when any predicate holds (false for an empty list)
pub fn any_of(predicates: Vec<Predicate>) -> Predicate {
    Arc::new(move |ctx: &Context| predicates.iter().any(|p| p(ctx)))
}

/// True when the context holds a value under `key`
pub fn has_key(key: impl Into<String>) -> Predicate {
    let key = key.into();
    Arc::new(move |ctx: &Context| ctx.contains(&key))
}

/// True when the request carries route parameter `name`
pub fn has_param(name: impl Into<String>) -> Predicate {
    let name = name.into();
    Arc::new(move |ctx: &Context| ctx.param(&name).is_some())
}

/// True when the request lacks route parameter `name`
pub fn lacks_param(name: impl Into<String>) -> Predicate {
    let name = name.into();
    Arc::new(move |ctx: &Context| ctx.param(&name).is_none())
}
