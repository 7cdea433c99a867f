//! Ollama local daemon client.
//!
//! No credentials: the daemon either answers on the configured address or
//! the provider was never auto-loaded in the first place.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Adapter, AdapterError, ComposedOptions, LanguageModel, RequestFn};
use crate::catalog;
use crate::types::OptionMap;

/// Default Ollama API base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaAdapter {
    base_url: String,
    client: reqwest::Client,
    request: Arc<dyn RequestFn>,
}

impl OllamaAdapter {
    pub(crate) fn new(composed: &ComposedOptions) -> Result<Self, AdapterError> {
        let base_url = composed
            .base_url()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            request: composed.request.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for OllamaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaAdapter")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Adapter for OllamaAdapter {
    fn module_ref(&self) -> &str {
        catalog::OLLAMA
    }

    async fn language_model(&self, api_id: &str) -> Result<LanguageModel, AdapterError> {
        Ok(LanguageModel {
            id: api_id.to_string(),
            url: format!("{}/api/chat", self.base_url),
            headers: std::collections::BTreeMap::new(),
            options: OptionMap::new(),
            client: self.client.clone(),
            request: self.request.clone(),
        })
    }
}
