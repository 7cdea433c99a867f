//! Core types for the provider/model registry.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::auth::ApiKey;

// ────────────────────────────────────────────────────────────────────────────
// Option maps
// ────────────────────────────────────────────────────────────────────────────

/// A single adapter-construction option value.
///
/// Options are a small closed union rather than arbitrary JSON: a string,
/// a number, a boolean, or a nested map of more options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    String(String),
    Map(OptionMap),
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<u64> for OptionValue {
    fn from(v: u64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<OptionMap> for OptionValue {
    fn from(v: OptionMap) -> Self {
        Self::Map(v)
    }
}

impl OptionValue {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The nested map, if this is a map.
    pub fn as_map(&self) -> Option<&OptionMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl Hash for OptionValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            Self::Number(n) => {
                1u8.hash(state);
                n.to_bits().hash(state);
            }
            Self::String(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            Self::Map(m) => {
                3u8.hash(state);
                m.hash(state);
            }
        }
    }
}

/// An ordered mapping of adapter-construction options.
///
/// Backed by a `BTreeMap` so iteration (and hashing) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionMap(BTreeMap<String, OptionValue>);

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    /// Deep-merge `other` into `self`.
    ///
    /// `other` wins per key; nested maps merge recursively, every other
    /// value kind replaces wholesale.
    pub fn merge(&mut self, other: &OptionMap) {
        for (key, value) in &other.0 {
            match (self.0.get_mut(key), value) {
                (Some(OptionValue::Map(existing)), OptionValue::Map(incoming)) => {
                    existing.merge(incoming);
                }
                (_, incoming) => {
                    self.0.insert(key.clone(), incoming.clone());
                }
            }
        }
    }
}

impl Hash for OptionMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for (key, value) in &self.0 {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl FromIterator<(String, OptionValue)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Model metadata
// ────────────────────────────────────────────────────────────────────────────

/// Release status of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Alpha,
    Beta,
    Deprecated,
    #[default]
    Active,
}

/// Boolean capability flags for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Supports a temperature parameter.
    pub temperature: bool,
    /// Supports a reasoning/thinking mode.
    pub reasoning: bool,
    /// Supports file attachments.
    pub attachment: bool,
    /// Supports tool/function calling. Enabled unless stated otherwise.
    pub tool_call: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            temperature: false,
            reasoning: false,
            attachment: false,
            tool_call: true,
        }
    }
}

/// Interleaved-reasoning support: plain boolean, or gated by a named
/// request field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Interleaved {
    Supported(bool),
    Field { field: String },
}

/// Modality flags for one direction (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModalityFlags {
    pub text: bool,
    pub audio: bool,
    pub image: bool,
    pub video: bool,
    pub pdf: bool,
}

impl Default for ModalityFlags {
    fn default() -> Self {
        Self {
            text: true,
            audio: false,
            image: false,
            video: false,
            pdf: false,
        }
    }
}

/// Input/output modality support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modalities {
    pub input: ModalityFlags,
    pub output: ModalityFlags,
}

/// Model pricing per million tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCost {
    /// Cost per million input tokens in USD.
    pub input: f64,
    /// Cost per million output tokens in USD.
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    /// Override table applied once input usage passes 200K tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_200k: Option<Box<ModelCost>>,
}

/// Input-token count beyond which the `over_200k` cost table applies.
const COST_TIER_THRESHOLD: u64 = 200_000;

impl ModelCost {
    /// Calculate cost in USD for a usage sample.
    pub fn calculate(&self, input: u64, output: u64, cache_read: u64, cache_write: u64) -> f64 {
        if input > COST_TIER_THRESHOLD
            && let Some(tier) = &self.over_200k
        {
            return tier.calculate_flat(input, output, cache_read, cache_write);
        }
        self.calculate_flat(input, output, cache_read, cache_write)
    }

    fn calculate_flat(&self, input: u64, output: u64, cache_read: u64, cache_write: u64) -> f64 {
        (input as f64 / 1_000_000.0) * self.input
            + (output as f64 / 1_000_000.0) * self.output
            + (cache_read as f64 / 1_000_000.0) * self.cache_read
            + (cache_write as f64 / 1_000_000.0) * self.cache_write
    }
}

/// Context and output token limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLimit {
    /// Maximum context window size in tokens.
    pub context: u32,
    /// Maximum output tokens.
    pub output: u32,
}

impl Default for ModelLimit {
    fn default() -> Self {
        Self {
            context: 128_000,
            output: 8_192,
        }
    }
}

/// Client binding for a model: how an adapter addresses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelApi {
    /// Identifier passed to the client adapter. Defaults to the model id.
    pub id: String,
    /// Base endpoint URL. Defaults to the provider's API URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Client module reference. Defaults to the provider's.
    #[serde(skip_serializing_if = "Option::is_none", alias = "npm")]
    pub module_ref: Option<String>,
}

/// One invokable model offered by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    /// Model id, unique within its provider.
    pub id: String,
    /// Owning provider id.
    pub provider: String,
    /// Human-readable name. Defaults to the id.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    pub status: ModelStatus,
    pub api: ModelApi,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interleaved: Option<Interleaved>,
    pub modalities: Modalities,
    pub cost: ModelCost,
    pub limit: ModelLimit,
    /// Adapter construction options specific to this model.
    pub options: OptionMap,
    /// Extra request headers for this model.
    pub headers: BTreeMap<String, String>,
}

impl Model {
    /// Fill derived defaults: name from id, `api.id` from id.
    ///
    /// `api.url` stays as authored; adapter composition falls back to the
    /// provider's API URL at resolve time, so later provider-level
    /// overrides still take effect.
    pub(crate) fn normalize(&mut self, provider_id: &str) {
        self.provider = provider_id.to_string();
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if self.api.id.is_empty() {
            self.api.id = self.id.clone();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Providers
// ────────────────────────────────────────────────────────────────────────────

/// Which mechanism last supplied or confirmed a provider's credentials.
/// Diagnostic only; merge order is not derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    Env,
    Config,
    #[default]
    Custom,
    Api,
}

/// One upstream vendor offering models through a single credential and
/// endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub source: ProviderSource,
    /// Environment variable names checked in order for an API key.
    pub env: Vec<String>,
    /// Resolved credential. Never serialized.
    #[serde(skip)]
    pub key: Option<ApiKey>,
    /// Base API URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Client module reference used to construct adapters.
    #[serde(skip_serializing_if = "Option::is_none", alias = "npm")]
    pub module_ref: Option<String>,
    /// Adapter construction options.
    pub options: OptionMap,
    /// Models offered by this provider, keyed by model id.
    pub models: BTreeMap<String, Model>,
}

impl Provider {
    /// An empty provider created from configuration alone.
    pub(crate) fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            source: ProviderSource::Config,
            ..Self::default()
        }
    }

    /// Fill derived defaults on the provider and every model.
    pub(crate) fn normalize(&mut self, id: &str) {
        self.id = id.to_string();
        if self.name.is_empty() {
            self.name = id.to_string();
        }
        for (model_id, model) in &mut self.models {
            model.id = model_id.clone();
            model.normalize(id);
        }
    }
}
