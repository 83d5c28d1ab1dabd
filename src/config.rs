use anyhow::{Context, Result};
use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// On-disk settings, read from `config.toml` in the platform config dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Base URL of the extraction/comparison service.
    pub backend_url: String,
    /// Where records and cached comparisons are kept. `~` is expanded.
    pub data_dir: Option<String>,
    /// Per-request timeout in seconds. Unset means wait indefinitely.
    pub request_timeout_secs: Option<u64>,
    /// JSON file replacing the built-in comparison field list.
    pub field_config_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            data_dir: None,
            request_timeout_secs: None,
            field_config_file: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "mitc-compare")
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`. A missing file
    /// yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Storage directory, falling back to the platform data dir.
    pub fn resolved_data_dir(&self) -> Result<String> {
        if let Some(dir) = &self.data_dir {
            return Ok(shellexpand::tilde(dir).to_string());
        }
        let dirs = project_dirs().context("Could not determine a data directory; set data_dir")?;
        dirs.data_dir()
            .to_str()
            .map(str::to_string)
            .context("Data directory path is not valid UTF-8")
    }

    pub fn field_config_path(&self) -> Option<PathBuf> {
        self.field_config_file
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render config")
    }

    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to render config schema")
    }
}
