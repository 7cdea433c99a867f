//! OpenAI-compatible chat-completions client.
//!
//! Covers every provider speaking the `/chat/completions` wire shape
//! (OpenAI, OpenRouter, Groq, xAI, Mistral, gateway proxies, ...).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Adapter, AdapterError, ComposedOptions, LanguageModel, RequestFn};
use crate::catalog;
use crate::types::OptionMap;

pub struct OpenAiCompatibleAdapter {
    base_url: String,
    headers: BTreeMap<String, String>,
    include_usage: bool,
    client: reqwest::Client,
    request: Arc<dyn RequestFn>,
}

impl OpenAiCompatibleAdapter {
    pub(crate) fn new(composed: &ComposedOptions) -> Result<Self, AdapterError> {
        let base_url = composed
            .base_url()
            .ok_or_else(|| {
                AdapterError::Construction(
                    "openai-compatible client requires a baseURL option".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        let mut headers = composed.header_map();
        if let Some(key) = composed.api_key() {
            headers
                .entry("Authorization".to_string())
                .or_insert_with(|| format!("Bearer {key}"));
        }

        let include_usage = composed
            .options
            .get("includeUsage")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Ok(Self {
            base_url,
            headers,
            include_usage,
            client: reqwest::Client::new(),
            request: composed.request.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for OpenAiCompatibleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleAdapter")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys())
            .field("include_usage", &self.include_usage)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Adapter for OpenAiCompatibleAdapter {
    fn module_ref(&self) -> &str {
        catalog::OPENAI_COMPATIBLE
    }

    async fn language_model(&self, api_id: &str) -> Result<LanguageModel, AdapterError> {
        let mut options = OptionMap::new();
        options.insert("includeUsage", self.include_usage);

        Ok(LanguageModel {
            id: api_id.to_string(),
            url: format!("{}/chat/completions", self.base_url),
            headers: self.headers.clone(),
            options,
            client: self.client.clone(),
            request: self.request.clone(),
        })
    }
}
