//! Anthropic Messages API client.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Adapter, AdapterError, ComposedOptions, LanguageModel, RequestFn};
use crate::catalog;
use crate::types::OptionMap;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    base_url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
    request: Arc<dyn RequestFn>,
}

impl AnthropicAdapter {
    pub(crate) fn new(composed: &ComposedOptions) -> Result<Self, AdapterError> {
        let base_url = composed
            .base_url()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let mut headers = composed.header_map();
        headers
            .entry("anthropic-version".to_string())
            .or_insert_with(|| API_VERSION.to_string());
        if let Some(key) = composed.api_key() {
            headers
                .entry("x-api-key".to_string())
                .or_insert_with(|| key.to_string());
        }

        Ok(Self {
            base_url,
            headers,
            client: reqwest::Client::new(),
            request: composed.request.clone(),
        })
    }
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Adapter for AnthropicAdapter {
    fn module_ref(&self) -> &str {
        catalog::ANTHROPIC
    }

    async fn language_model(&self, api_id: &str) -> Result<LanguageModel, AdapterError> {
        Ok(LanguageModel {
            id: api_id.to_string(),
            url: format!("{}/messages", self.base_url),
            headers: self.headers.clone(),
            options: OptionMap::new(),
            client: self.client.clone(),
            request: self.request.clone(),
        })
    }
}
