// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Logging setup and event categories

use std::fmt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Category attached to log events as the `log_type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    PageView,
    Request,
    Response,
    AppLifecycle,
    App,
    DataValidation,
    DataFetch,
    External,
    Metric,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "PageView",
            Self::Request => "Request",
            Self::Response => "Response",
            Self::AppLifecycle => "AppLifecycle",
            Self::App => "App",
            Self::DataValidation => "DataValidation",
            Self::DataFetch => "DataFetch",
            Self::External => "External",
            Self::Metric => "Metric",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `default_filter`; `verbose` bumps the crate to debug.
pub fn init(default_filter: &str, verbose: bool) {
    let fallback = if verbose {
        "pageflow=debug".to_string()
    } else {
        default_filter.to_string()
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_type_display() {
        assert_eq!(LogType::DataFetch.to_string(), "DataFetch");
        assert_eq!(LogType::App.as_str(), "App");
    }
}
