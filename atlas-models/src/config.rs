//! User configuration: overrides layered onto the catalog.
//!
//! Stored as TOML at `<config_dir>/atlas/config.toml`. A missing file
//! yields the default (empty) configuration; a malformed file fails fast
//! with the offending path in the error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Interleaved, Modalities, ModelStatus, OptionMap};
use crate::{Error, Result};

/// User-authored registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model as `provider/model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Default small/cheap model as `provider/model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_model: Option<String>,
    /// Allow-set of provider ids. When present, providers not listed are
    /// dropped by the policy filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_providers: Option<Vec<String>>,
    /// Providers to drop unconditionally.
    pub disabled_providers: Vec<String>,
    /// Expose alpha-status models.
    pub experimental: bool,
    /// Per-provider overrides.
    pub provider: BTreeMap<String, ProviderOverride>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{e}\n\nFile: {}", path.display())))
    }

    /// Load from the default path, or defaults when no config dir exists.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("atlas").join("config.toml"))
    }
}

/// Overrides for one provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replacement credential env var list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    /// Base API URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Client module reference override.
    #[serde(skip_serializing_if = "Option::is_none", alias = "npm")]
    pub module_ref: Option<String>,
    /// Adapter options merged key-by-key into the provider's.
    pub options: OptionMap,
    /// Model ids to hide. Wins over the whitelist for the same id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<String>>,
    /// When present, only these model ids survive filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
    /// Per-model overrides, keyed by model id.
    pub models: BTreeMap<String, ModelOverride>,
}

/// Overrides for one model. Unset fields fall back to the catalog model,
/// then to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ModelStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interleaved: Option<Interleaved>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Modalities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitOverride>,
    /// Wire identifier override (passed to the adapter instead of the id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,
    pub options: OptionMap,
    /// Headers merged key-by-key into the model's.
    pub headers: BTreeMap<String, String>,
}

/// Cost fields merged individually; unset fields keep the catalog value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_200k: Option<Box<CostOverride>>,
}

/// Limit fields merged individually.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<u32>,
}
