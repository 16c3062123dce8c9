//! Layered engine configuration (SPEC_FULL.md §1): defaults, then a
//! `config.toml` on disk, then explicit overrides, in that priority order.
//! Grounded on the teacher's `config::Config` + `forge_config::ForgeToml`
//! split — a thin runtime-facing struct over a `serde`/`toml` file format,
//! with `dirs` locating the user config directory the way `forge_config.rs`
//! locates `.forge/forge.toml`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::DEFAULT_TIMEOUT_SECONDS;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// On-disk representation (`config.toml`). Every field is optional so a
/// partial file only overrides what it names; anything absent falls through
/// to [`EngineConfig::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigFile {
    #[serde(default)]
    pub artifact_base_dir: Option<PathBuf>,
    #[serde(default)]
    pub approval_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub execution_budget_limit: Option<f64>,
    #[serde(default)]
    pub project_budget_limit: Option<f64>,
    #[serde(default)]
    pub global_budget_limit: Option<f64>,
    /// `model -> (input_per_1k, output_per_1k)`, merged over the built-in
    /// price table (see [`crate::budget::BudgetTracker::with_cost_overrides`]).
    #[serde(default)]
    pub cost_overrides: HashMap<String, (f64, f64)>,
}

impl EngineConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&content).map_err(|source| ConfigLoadError::Parse { path: path.to_path_buf(), source })
    }

    /// Reads `path` if it exists, otherwise returns an empty (all-`None`)
    /// file so the layered defaults still apply.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigLoadError> {
        if path.exists() { Self::load(path) } else { Ok(Self::default()) }
    }
}

/// Runtime configuration the engine is constructed from. Built by layering,
/// lowest priority first: [`EngineConfig::defaults`], then an
/// [`EngineConfigFile`] loaded from disk, then explicit CLI/caller
/// overrides via the `with_*` builders.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub artifact_base_dir: PathBuf,
    pub approval_timeout_seconds: u64,
    pub execution_budget_limit: Option<f64>,
    pub project_budget_limit: Option<f64>,
    pub global_budget_limit: Option<f64>,
    pub cost_overrides: HashMap<String, (f64, f64)>,
}

impl EngineConfig {
    /// Hard-coded defaults (lowest layer). The artifact directory lives
    /// under the user's config directory (`dirs::config_dir()`, falling
    /// back to `./`) the way the teacher locates `.forge/`.
    pub fn defaults() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            artifact_base_dir: base.join("conductor").join("artifacts"),
            approval_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            execution_budget_limit: None,
            project_budget_limit: None,
            global_budget_limit: None,
            cost_overrides: HashMap::new(),
        }
    }

    /// Applies a parsed config file over the current values. Only fields
    /// present in `file` are overridden; absent fields keep the receiver's
    /// value, and `cost_overrides` entries are merged rather than replaced.
    pub fn merge_file(mut self, file: EngineConfigFile) -> Self {
        if let Some(dir) = file.artifact_base_dir {
            self.artifact_base_dir = dir;
        }
        if let Some(timeout) = file.approval_timeout_seconds {
            self.approval_timeout_seconds = timeout;
        }
        if file.execution_budget_limit.is_some() {
            self.execution_budget_limit = file.execution_budget_limit;
        }
        if file.project_budget_limit.is_some() {
            self.project_budget_limit = file.project_budget_limit;
        }
        if file.global_budget_limit.is_some() {
            self.global_budget_limit = file.global_budget_limit;
        }
        self.cost_overrides.extend(file.cost_overrides);
        self
    }

    /// Loads `config.toml` at `path` (if present) over the defaults. The
    /// standard entry point for a caller that just wants "defaults, then
    /// whatever's on disk".
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let file = EngineConfigFile::load_or_default(path)?;
        Ok(Self::defaults().merge_file(file))
    }

    pub fn with_artifact_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_base_dir = dir.into();
        self
    }

    pub fn with_approval_timeout_seconds(mut self, seconds: u64) -> Self {
        self.approval_timeout_seconds = seconds;
        self
    }

    pub fn with_execution_budget_limit(mut self, limit: Option<f64>) -> Self {
        self.execution_budget_limit = limit;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
