// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Parallel composition
//!
//! [`Parallel`] spawns every branch on the runtime against its own fork of
//! the context and folds the branch results into a single outcome:
//!
//! - no branch stopped: `Proceed`;
//! - otherwise the stopping outcome (abort, emit or panic) of the branch
//!   declared first wins, whatever order the branches finished in.
//!
//! Once branch `i` has stopped, branches declared after it can no longer
//! change the result and are aborted. Writes from every branch that
//! proceeded are merged back in declaration order, also when the aggregate
//! fails.
//!
//! Branch tasks live in a [`JoinSet`], so dropping the composer (an outer
//! branch aborted, a host timeout) aborts every branch still running.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{AbortHandle, Id, JoinError, JoinSet};
use tracing::debug;

use super::{Outcome, SharedStep, Step};
use crate::context::Context;
use crate::errors::PipelineError;

/// Runs branches concurrently and joins them into one outcome
pub struct Parallel {
    label: String,
    branches: Vec<SharedStep>,
}

impl Parallel {
    pub fn new(label: impl Into<String>, branches: Vec<SharedStep>) -> Self {
        Self {
            label: label.into(),
            branches,
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    fn panicked(&self, index: usize, err: JoinError) -> Outcome {
        let message = panic_message(err.into_panic());
        Outcome::abort(
            self.branches[index].name().to_string(),
            PipelineError::BranchPanicked {
                branch: index,
                message,
            },
        )
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Step for Parallel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        let count = self.branches.len();
        if count == 0 {
            return Outcome::Proceed;
        }

        let mut tasks: JoinSet<(Outcome, Context)> = JoinSet::new();
        let mut aborts: Vec<AbortHandle> = Vec::with_capacity(count);
        let mut indices: HashMap<Id, usize> = HashMap::with_capacity(count);

        for (index, branch) in self.branches.iter().enumerate() {
            let branch = Arc::clone(branch);
            let mut fork = ctx.fork();
            let handle = tasks.spawn(async move {
                let outcome = branch.run(&mut fork).await;
                (outcome, fork)
            });
            indices.insert(handle.id(), index);
            aborts.push(handle);
        }

        let mut stopped: Vec<Option<Outcome>> = (0..count).map(|_| None).collect();
        let mut proceeded: Vec<Option<Context>> = (0..count).map(|_| None).collect();
        let mut earliest: Option<usize> = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let id = match &joined {
                Ok((id, _)) => *id,
                Err(err) => err.id(),
            };
            let Some(&index) = indices.get(&id) else {
                continue;
            };

            let outcome = match joined {
                Ok((_, (outcome, fork))) if outcome.is_proceed() => {
                    proceeded[index] = Some(fork);
                    continue;
                }
                Ok((_, (outcome, _))) => outcome,
                Err(err) if err.is_panic() => self.panicked(index, err),
                Err(_) => {
                    debug!(parallel = %self.label, branch = index, "branch cancelled");
                    continue;
                }
            };

            stopped[index] = Some(outcome);
            if earliest.map_or(true, |current| index < current) {
                earliest = Some(index);
                for handle in &aborts[index + 1..] {
                    handle.abort();
                }
            }
        }

        for fork in proceeded.into_iter().flatten() {
            ctx.absorb(fork);
        }

        let Some(winner) = earliest else {
            return Outcome::Proceed;
        };

        for (index, outcome) in stopped.iter().enumerate() {
            if let Some(outcome) = outcome {
                if index != winner {
                    debug!(
                        parallel = %self.label,
                        branch = index,
                        outcome = outcome.kind(),
                        "discarding outcome of later branch"
                    );
                }
            }
        }

        stopped[winner].take().unwrap_or(Outcome::Proceed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::testing::{empty_ctx, FixedStep, Reply, ScriptedSource};
    use crate::step::{FetchMany, FetchSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn fixed(name: &str, key: &str, outcome: fn() -> Outcome) -> SharedStep {
        Arc::new(FixedStep {
            name: name.into(),
            writes: Some((key.into(), json!(name))),
            ran: Arc::new(Mutex::new(Vec::new())),
            outcome,
        })
    }

    fn ok(name: &str) -> SharedStep {
        fixed(name, name, || Outcome::Proceed)
    }

    fn failing(name: &'static str) -> SharedStep {
        Arc::new(FixedStep {
            name: name.into(),
            writes: None,
            ran: Arc::new(Mutex::new(Vec::new())),
            outcome: || Outcome::abort("failing", PipelineError::step("boom")),
        })
    }

    fn fetch(source: &Arc<ScriptedSource>, key: &str) -> SharedStep {
        let query = key.to_string();
        Arc::new(FetchMany::new(
            source.clone(),
            FetchSpec::new(key, move |_| query.clone()),
        ))
    }

    struct Panics;

    #[async_trait]
    impl Step for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn run(&self, _ctx: &mut Context) -> Outcome {
            panic!("branch blew up");
        }
    }

    struct SlowWrite {
        done: Arc<AtomicBool>,
    }

    fn slow_write(done: &Arc<AtomicBool>) -> SharedStep {
        Arc::new(SlowWrite {
            done: Arc::clone(done),
        })
    }

    #[async_trait]
    impl Step for SlowWrite {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, ctx: &mut Context) -> Outcome {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.done.store(true, Ordering::SeqCst);
            ctx.insert("slow", json!(true));
            Outcome::Proceed
        }
    }

    #[tokio::test]
    async fn test_all_proceed_unions_writes() {
        let step = Parallel::new("group", vec![ok("a"), ok("b"), ok("c")]);

        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
        assert_eq!(ctx.keys(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_group_proceeds() {
        let step = Parallel::new("group", vec![]);
        let mut ctx = empty_ctx();
        assert!(step.run(&mut ctx).await.is_proceed());
    }

    #[tokio::test]
    async fn test_single_failure_wins_in_any_position() {
        for position in 0..3 {
            let mut branches = vec![ok("a"), ok("b")];
            branches.insert(position, failing("x"));
            let step = Parallel::new("group", branches);

            let mut ctx = empty_ctx();
            match step.run(&mut ctx).await {
                Outcome::Abort(failure) => {
                    assert_eq!(failure.label.as_deref(), Some("failing"));
                    assert_eq!(failure.error.to_string(), "boom");
                }
                other => panic!("position {position}: expected abort, got {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn test_proceeded_writes_survive_failure() {
        let source = Arc::new(
            ScriptedSource::new()
                .reply("orgInfo", Reply::Rows(vec![json!({ "name": "Council" })]))
                .reply("issues", Reply::Fail("timeout".into())),
        );
        let step = Parallel::new(
            "group",
            vec![fetch(&source, "orgInfo"), fetch(&source, "issues")],
        );

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => assert_eq!(failure.label.as_deref(), Some("issues")),
            other => panic!("expected abort, got {}", other.kind()),
        }
        assert!(ctx.contains("orgInfo"));
        assert!(!ctx.contains("issues"));
    }

    #[tokio::test]
    async fn test_earliest_declared_failure_wins_regardless_of_timing() {
        let source = Arc::new(
            ScriptedSource::new()
                .reply(
                    "first",
                    Reply::SlowFail(Duration::from_millis(50), "slow failure".into()),
                )
                .reply("second", Reply::Fail("fast failure".into())),
        );
        let step = Parallel::new("group", vec![fetch(&source, "first"), fetch(&source, "second")]);

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("first"));
                assert!(failure.error.to_string().contains("slow failure"));
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_later_branches_are_cancelled() {
        let done = Arc::new(AtomicBool::new(false));
        let step = Parallel::new(
            "group",
            vec![failing("x"), slow_write(&done)],
        );

        let mut ctx = empty_ctx();
        assert!(matches!(step.run(&mut ctx).await, Outcome::Abort(_)));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!done.load(Ordering::SeqCst));
        assert!(!ctx.contains("slow"));
    }

    #[tokio::test]
    async fn test_panicking_branch_becomes_abort() {
        let step = Parallel::new("group", vec![ok("a"), Arc::new(Panics)]);

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Abort(failure) => {
                assert_eq!(failure.label.as_deref(), Some("panics"));
                assert!(matches!(
                    failure.error,
                    PipelineError::BranchPanicked { branch: 1, .. }
                ));
                assert!(failure.error.to_string().contains("branch blew up"));
            }
            other => panic!("expected abort, got {}", other.kind()),
        }
        assert!(ctx.contains("a"));
    }

    #[tokio::test]
    async fn test_emit_is_a_stopping_outcome() {
        let step = Parallel::new(
            "group",
            vec![
                ok("a"),
                fixed("missing", "ignored", || {
                    Outcome::Emit(crate::render::Response::not_found("nope"))
                }),
            ],
        );

        let mut ctx = empty_ctx();
        match step.run(&mut ctx).await {
            Outcome::Emit(response) => assert_eq!(response.status, 404),
            other => panic!("expected emit, got {}", other.kind()),
        }
        assert!(ctx.contains("a"));
        assert!(!ctx.contains("ignored"));
    }

    #[tokio::test]
    async fn test_nested_group_is_torn_down_with_its_branch() {
        let done = Arc::new(AtomicBool::new(false));
        let inner: SharedStep = Arc::new(Parallel::new("inner", vec![slow_write(&done)]));
        let step = Parallel::new("outer", vec![failing("x"), inner]);

        let mut ctx = empty_ctx();
        assert!(matches!(step.run(&mut ctx).await, Outcome::Abort(_)));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!done.load(Ordering::SeqCst));
        assert!(!ctx.contains("slow"));
    }

    #[tokio::test]
    async fn test_dropping_the_group_aborts_branches() {
        let done = Arc::new(AtomicBool::new(false));
        let step = Parallel::new("group", vec![slow_write(&done)]);

        let mut ctx = empty_ctx();
        let timed_out = tokio::time::timeout(Duration::from_millis(20), step.run(&mut ctx)).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!done.load(Ordering::SeqCst));
    }
}
