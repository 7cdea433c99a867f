//! Built-in provider-specific loaders.
//!
//! A fixed table applied as the last merge layer. An entry can mark a
//! provider auto-loadable with no explicit credential, contribute derived
//! construction options, and/or install a custom model-resolution callback
//! the adapter factory consults instead of the default path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::{Adapter, AdapterError, LanguageModel};
use crate::types::{OptionMap, OptionValue, Provider};

/// Custom model resolution: invoked with the resolved adapter, the model's
/// wire identifier, and the provider's options.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(
        &self,
        adapter: &dyn Adapter,
        api_id: &str,
        options: &OptionMap,
    ) -> Result<LanguageModel, AdapterError>;
}

/// One entry in the built-in loader table.
pub(crate) struct BuiltinLoader {
    pub provider: &'static str,
    /// Retain the provider even when no credential resolved.
    pub auto_load: bool,
    /// Derived construction options, merged after the credential layers.
    pub options: Option<fn(&Provider) -> OptionMap>,
    /// Custom model-resolution callback.
    pub model_loader: Option<Arc<dyn ModelLoader>>,
}

pub(crate) fn builtin_loaders() -> Vec<BuiltinLoader> {
    vec![
        BuiltinLoader {
            provider: "ollama",
            auto_load: true,
            options: Some(ollama_options),
            model_loader: None,
        },
        BuiltinLoader {
            provider: "github-copilot",
            auto_load: false,
            options: Some(copilot_options),
            model_loader: Some(Arc::new(CopilotModelLoader)),
        },
    ]
}

/// The local daemon needs no key; point the client at the default address
/// unless the user configured one.
fn ollama_options(provider: &Provider) -> OptionMap {
    let mut options = OptionMap::new();
    if provider.options.get("baseURL").is_none() {
        options.insert("baseURL", crate::adapters::OLLAMA_DEFAULT_BASE_URL);
    }
    options
}

/// Copilot's endpoint rejects plain OpenAI-shaped requests without the
/// integration headers.
fn copilot_options(provider: &Provider) -> OptionMap {
    let mut headers = OptionMap::new();
    headers.insert("Copilot-Integration-Id", "atlas-chat");
    headers.insert("Editor-Version", "atlas/0.1.0");
    if let Some(key) = &provider.key {
        headers.insert("Authorization", format!("Bearer {}", key.expose_secret()));
    }
    let mut options = OptionMap::new();
    options.insert("headers", headers);
    options
}

/// Copilot model handles carry the session intent header in addition to
/// whatever the adapter composed.
struct CopilotModelLoader;

#[async_trait]
impl ModelLoader for CopilotModelLoader {
    async fn load(
        &self,
        adapter: &dyn Adapter,
        api_id: &str,
        options: &OptionMap,
    ) -> Result<LanguageModel, AdapterError> {
        let mut handle = adapter.language_model(api_id).await?;
        handle
            .headers
            .entry("Openai-Intent".to_string())
            .or_insert_with(|| "conversation-edits".to_string());
        if let Some(OptionValue::String(initiator)) = options.get("initiator") {
            handle
                .headers
                .insert("X-Initiator".to_string(), initiator.clone());
        }
        Ok(handle)
    }
}
