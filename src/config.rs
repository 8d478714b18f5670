// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Application configuration
//!
//! Settings live in a config directory holding `default.yaml` and an optional
//! `<environment>.yaml` overlay that is deep-merged on top. Either file may be
//! TOML instead (`default.toml`). Every field has a default, so a missing
//! directory yields a working configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::logging::LogType;
use crate::step::DEFAULT_DATASET;

/// File extensions tried for each config file, in order
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "toml"];

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Whether view-models are validated before rendering
    pub fn validates_templates(&self) -> bool {
        !matches!(self, Self::Production | Self::Staging)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(PipelineError::Config {
                message: format!("unknown environment '{}'", other),
            }),
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub datasette: DatasetteSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// `datasette` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetteSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Dataset used by fetches that do not choose one
    #[serde(default = "default_dataset")]
    pub default_dataset: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Datasets queried by the all-datasets fetches
    #[serde(default)]
    pub datasets: Vec<String>,
}

impl Default for DatasetteSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_dataset: default_dataset(),
            timeout_secs: default_timeout_secs(),
            datasets: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://datasette.planning.data.gov.uk".into()
}
fn default_dataset() -> String {
    DEFAULT_DATASET.into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Where cached values are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Filesystem,
}

/// `cache` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory for the filesystem backend
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Entry lifetime; entries never expire when unset
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl CacheSettings {
    /// Configured cache directory, or the per-user cache directory
    pub fn directory(&self) -> PathBuf {
        if let Some(dir) = &self.directory {
            return dir.clone();
        }
        directories::ProjectDirs::from("uk", "pageflow", "pageflow")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".pageflow").join("cache"))
    }
}

/// `logging` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "pageflow=info".into()
}

impl Settings {
    /// Load settings from `dir`
    ///
    /// `environment` selects the overlay; when `None` the `environment` field
    /// of the default file is used.
    pub fn load(dir: Option<&Path>, environment: Option<Environment>) -> PipelineResult<Self> {
        let Some(dir) = dir.filter(|d| d.is_dir()) else {
            debug!(log_type = %LogType::AppLifecycle, "no config directory, using defaults");
            return Ok(Self {
                environment: environment.unwrap_or_default(),
                ..Self::default()
            });
        };

        let mut merged = match find_file(dir, "default") {
            Some(path) => read_value(&path)?,
            None => {
                warn!(log_type = %LogType::AppLifecycle, dir = %dir.display(), "no default config file");
                Value::Object(Default::default())
            }
        };

        let environment = match environment {
            Some(env) => env,
            None => match merged.get("environment") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => Environment::default(),
            },
        };

        match find_file(dir, environment.as_str()) {
            Some(path) => {
                debug!(log_type = %LogType::AppLifecycle, path = %path.display(), "applying config overlay");
                let overlay = read_value(&path)?;
                deep_merge(&mut merged, overlay);
            }
            None => warn!(
                log_type = %LogType::AppLifecycle,
                environment = %environment,
                "no config overlay for environment"
            ),
        }

        if let Value::Object(map) = &mut merged {
            map.insert("environment".into(), Value::String(environment.to_string()));
        }

        serde_json::from_value(merged).map_err(|e| PipelineError::Config {
            message: format!("invalid settings in {}: {}", dir.display(), e),
        })
    }
}

fn find_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}

fn read_value(path: &Path) -> PipelineResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let value = if path.extension().and_then(|e| e.to_str()) == Some("toml") {
        toml::from_str(&content)?
    } else if content.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(value)
}

/// Merge `overlay` into `base`; objects merge key by key, anything else replaces
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
