//! Static provider catalog: the baseline layer of the merge.
//!
//! A [`Catalog`] maps provider ids to full provider definitions. The
//! registry consumes one catalog value at construction - either the
//! built-in baseline below or an externally sourced document parsed with
//! [`Catalog::from_json_str`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    Capabilities, Modalities, ModalityFlags, Model, ModelCost, ModelLimit, Provider,
};
use crate::{Error, Result};

/// Module reference for the OpenAI-compatible built-in client.
pub const OPENAI_COMPATIBLE: &str = "openai-compatible";
/// Module reference for the Anthropic built-in client.
pub const ANTHROPIC: &str = "anthropic";
/// Module reference for the Ollama built-in client.
pub const OLLAMA: &str = "ollama";

/// A static mapping from provider id to provider definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog(BTreeMap<String, Provider>);

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a JSON document of the form
    /// `{ "provider-id": { ... }, ... }`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut catalog: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("malformed catalog: {e}")))?;
        catalog.normalize();
        Ok(catalog)
    }

    /// Add or replace a provider definition.
    pub fn insert(&mut self, id: &str, mut provider: Provider) {
        provider.normalize(id);
        self.0.insert(id.to_string(), provider);
    }

    pub fn get(&self, id: &str) -> Option<&Provider> {
        self.0.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.0.values()
    }

    pub(crate) fn into_providers(mut self) -> BTreeMap<String, Provider> {
        self.normalize();
        self.0
    }

    fn normalize(&mut self) {
        for (id, provider) in &mut self.0 {
            provider.normalize(id);
        }
    }

    /// The built-in baseline catalog of well-known providers.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();

        catalog.insert("anthropic", Provider {
            name: "Anthropic".to_string(),
            env: vec!["ANTHROPIC_API_KEY".to_string()],
            api: Some("https://api.anthropic.com/v1".to_string()),
            module_ref: Some(ANTHROPIC.to_string()),
            models: BTreeMap::from([
                (
                    "claude-opus-4-5".to_string(),
                    model("Claude Opus 4.5", reasoning_caps(), vision(), 5.0, 25.0, 200_000, 32_000),
                ),
                (
                    "claude-sonnet-4-5".to_string(),
                    model("Claude Sonnet 4.5", reasoning_caps(), vision(), 3.0, 15.0, 200_000, 64_000),
                ),
                (
                    "claude-haiku-4-5".to_string(),
                    model("Claude Haiku 4.5", plain_caps(), vision(), 1.0, 5.0, 200_000, 64_000),
                ),
            ]),
            ..Provider::default()
        });

        catalog.insert("openai", Provider {
            name: "OpenAI".to_string(),
            env: vec!["OPENAI_API_KEY".to_string()],
            api: Some("https://api.openai.com/v1".to_string()),
            module_ref: Some(OPENAI_COMPATIBLE.to_string()),
            models: BTreeMap::from([
                (
                    "gpt-5.1-codex".to_string(),
                    model("GPT-5.1 Codex", reasoning_caps(), vision(), 1.25, 10.0, 400_000, 128_000),
                ),
                (
                    "gpt-4o".to_string(),
                    model("GPT-4o", plain_caps(), vision(), 2.5, 10.0, 128_000, 16_384),
                ),
                (
                    "gpt-4o-mini".to_string(),
                    model("GPT-4o Mini", plain_caps(), vision(), 0.15, 0.6, 128_000, 16_384),
                ),
            ]),
            ..Provider::default()
        });

        // Google exposes both variable names; with two candidates declared,
        // key selection is left to adapter construction.
        catalog.insert("google", Provider {
            name: "Google".to_string(),
            env: vec!["GOOGLE_API_KEY".to_string(), "GEMINI_API_KEY".to_string()],
            api: Some("https://generativelanguage.googleapis.com/v1beta/openai".to_string()),
            module_ref: Some(OPENAI_COMPATIBLE.to_string()),
            models: BTreeMap::from([
                (
                    "gemini-2.5-pro".to_string(),
                    model("Gemini 2.5 Pro", reasoning_caps(), vision(), 1.25, 10.0, 1_048_576, 65_536),
                ),
                (
                    "gemini-2.5-flash".to_string(),
                    model("Gemini 2.5 Flash", plain_caps(), vision(), 0.3, 2.5, 1_048_576, 65_536),
                ),
            ]),
            ..Provider::default()
        });

        catalog.insert("openrouter", Provider {
            name: "OpenRouter".to_string(),
            env: vec!["OPENROUTER_API_KEY".to_string()],
            api: Some("https://openrouter.ai/api/v1".to_string()),
            module_ref: Some(OPENAI_COMPATIBLE.to_string()),
            models: BTreeMap::from([
                (
                    "anthropic/claude-sonnet-4.5".to_string(),
                    model("Claude Sonnet 4.5", reasoning_caps(), vision(), 3.0, 15.0, 200_000, 64_000),
                ),
                (
                    "x-ai/grok-code-fast-1".to_string(),
                    model("Grok Code Fast 1", reasoning_caps(), text_only(), 0.2, 1.5, 256_000, 10_000),
                ),
            ]),
            ..Provider::default()
        });

        catalog.insert("github-copilot", Provider {
            name: "GitHub Copilot".to_string(),
            env: vec!["GITHUB_COPILOT_TOKEN".to_string()],
            api: Some("https://api.githubcopilot.com".to_string()),
            module_ref: Some(OPENAI_COMPATIBLE.to_string()),
            models: BTreeMap::from([
                (
                    "gpt-5-mini".to_string(),
                    model("GPT-5 Mini", plain_caps(), vision(), 0.0, 0.0, 264_000, 64_000),
                ),
                (
                    "claude-sonnet-4.5".to_string(),
                    model("Claude Sonnet 4.5", reasoning_caps(), vision(), 0.0, 0.0, 200_000, 64_000),
                ),
            ]),
            ..Provider::default()
        });

        // Local daemon: no credential env, auto-loaded by a built-in custom
        // loader when reachable configuration exists.
        catalog.insert("ollama", Provider {
            name: "Ollama".to_string(),
            module_ref: Some(OLLAMA.to_string()),
            models: BTreeMap::from([
                (
                    "qwen2.5-coder".to_string(),
                    model("Qwen 2.5 Coder", plain_caps(), text_only(), 0.0, 0.0, 32_768, 8_192),
                ),
                (
                    "llama3.2".to_string(),
                    model("Llama 3.2", plain_caps(), text_only(), 0.0, 0.0, 131_072, 8_192),
                ),
            ]),
            ..Provider::default()
        });

        catalog
    }
}

fn model(
    name: &str,
    capabilities: Capabilities,
    modalities: Modalities,
    input_cost: f64,
    output_cost: f64,
    context: u32,
    output: u32,
) -> Model {
    Model {
        name: name.to_string(),
        capabilities,
        modalities,
        cost: ModelCost {
            input: input_cost,
            output: output_cost,
            cache_read: input_cost * 0.1,
            cache_write: input_cost * 1.25,
            over_200k: None,
        },
        limit: ModelLimit { context, output },
        ..Model::default()
    }
}

fn reasoning_caps() -> Capabilities {
    Capabilities {
        temperature: true,
        reasoning: true,
        attachment: true,
        tool_call: true,
    }
}

fn plain_caps() -> Capabilities {
    Capabilities {
        temperature: true,
        ..Capabilities::default()
    }
}

fn vision() -> Modalities {
    Modalities {
        input: ModalityFlags {
            image: true,
            pdf: true,
            ..ModalityFlags::default()
        },
        output: ModalityFlags::default(),
    }
}

fn text_only() -> Modalities {
    Modalities::default()
}
