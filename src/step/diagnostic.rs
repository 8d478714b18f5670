// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Page error reporting

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

use super::Failure;
use crate::context::Context;
use crate::logging::LogType;

/// Terminal failure handler of a pipeline
///
/// Logs an aborted page with the label of the operation that failed and hands
/// the failure back to the caller unchanged.
#[derive(Debug)]
pub struct LogPageError {
    prefix: String,
    reported: AtomicU64,
}

impl LogPageError {
    /// `prefix` names the controller in log messages, e.g. `OrganisationsController`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            reported: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of failures reported so far
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    /// Log `failure` and return it
    ///
    /// # Panics
    ///
    /// Panics when the failure carries no label: every step that aborts must
    /// say which operation failed.
    pub fn report(&self, ctx: &Context, failure: Failure) -> Failure {
        let Some(label) = failure.label.as_deref() else {
            panic!(
                "{}: aborted without a label ({}); every failing step must name itself",
                self.prefix, failure.error
            );
        };

        self.reported.fetch_add(1, Ordering::Relaxed);
        warn!(
            log_type = %LogType::Request,
            label,
            error_message = %failure.error,
            error_chain = %failure.error.chain(),
            request_id = %ctx.request_id(),
            endpoint = ctx.endpoint(),
            "{}.{}(): {}",
            self.prefix,
            label,
            failure.error
        );
        failure
    }
}

impl Default for LogPageError {
    fn default() -> Self {
        Self::new("Pipeline")
    }
}
