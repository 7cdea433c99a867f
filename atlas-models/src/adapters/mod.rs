//! Client adapters: construction, caching, and the request seam.
//!
//! The factory turns a (provider, model) pair into an [`Adapter`] by
//! resolving the model's module reference against a compile-time registry
//! of built-in clients, plus any constructors registered explicitly at
//! registry construction. Adapters for the same module reference and
//! composed options are cached for the process lifetime.

mod anthropic;
mod ollama;
mod openai;

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error as ThisError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::catalog;
use crate::types::{Model, OptionMap, OptionValue, Provider};
use crate::Error;

pub use anthropic::AnthropicAdapter;
pub use ollama::{OllamaAdapter, DEFAULT_BASE_URL as OLLAMA_DEFAULT_BASE_URL};
pub use openai::OpenAiCompatibleAdapter;

/// Errors surfaced by adapters themselves.
#[derive(Debug, ThisError)]
pub enum AdapterError {
    /// The adapter does not know the requested model.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Construction options were incomplete or inconsistent.
    #[error("adapter construction failed: {0}")]
    Construction(String),

    /// No client implementation is registered for a module reference.
    #[error("unknown client module '{0}': register an adapter constructor for it")]
    UnknownModule(String),

    /// A request failed or was cancelled.
    #[error("request failed: {0}")]
    Request(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Request seam
// ────────────────────────────────────────────────────────────────────────────

/// The network-request function threaded through every adapter.
///
/// Callers may supply their own implementation (proxying, recording,
/// fault injection); the factory wraps it with timeout logic when the
/// composed options carry a `timeout`.
#[async_trait]
pub trait RequestFn: Send + Sync {
    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: CancellationToken,
    ) -> Result<reqwest::Response, AdapterError>;
}

/// Default request function: execute on a shared client, aborting when the
/// cancellation token fires.
pub struct DefaultRequest {
    client: reqwest::Client,
}

impl DefaultRequest {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestFn for DefaultRequest {
    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: CancellationToken,
    ) -> Result<reqwest::Response, AdapterError> {
        tokio::select! {
            response = self.client.execute(request) => {
                response.map_err(|e| AdapterError::Request(e.to_string()))
            }
            () = cancel.cancelled() => Err(AdapterError::Request("request cancelled".to_string())),
        }
    }
}

/// Wraps an inner request function with a deadline.
///
/// The deadline and the caller's token are combined through a child token:
/// whichever fires first cancels the request, and cancelling the child
/// never touches the caller's token. The timer is dropped with the call,
/// so nothing outlives request completion.
struct TimeoutRequest {
    inner: Arc<dyn RequestFn>,
    timeout: Duration,
}

#[async_trait]
impl RequestFn for TimeoutRequest {
    async fn execute(
        &self,
        request: reqwest::Request,
        cancel: CancellationToken,
    ) -> Result<reqwest::Response, AdapterError> {
        let combined = cancel.child_token();
        tokio::select! {
            result = self.inner.execute(request, combined.clone()) => result,
            () = tokio::time::sleep(self.timeout) => {
                combined.cancel();
                Err(AdapterError::Request(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

/// Apply the composed `timeout` option, if any, to a request function.
pub(crate) fn with_timeout(
    inner: Arc<dyn RequestFn>,
    timeout: Option<Duration>,
) -> Arc<dyn RequestFn> {
    match timeout {
        Some(timeout) => Arc::new(TimeoutRequest { inner, timeout }),
        None => inner,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handles
// ────────────────────────────────────────────────────────────────────────────

/// A ready-to-invoke reference to one model, obtained from an adapter.
pub struct LanguageModel {
    /// Wire identifier the endpoint expects (the model's `api.id`).
    pub id: String,
    /// Fully resolved endpoint URL.
    pub url: String,
    /// Request headers, auth included.
    pub headers: BTreeMap<String, String>,
    /// Residual adapter options relevant to invocation (e.g. usage
    /// reporting flags).
    pub options: OptionMap,
    /// HTTP client for building requests.
    pub client: reqwest::Client,
    /// Request function invocations must go through.
    pub request: Arc<dyn RequestFn>,
}

impl std::fmt::Debug for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModel")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("headers", &self.headers.keys())
            .finish_non_exhaustive()
    }
}

/// A constructed client capable of producing model handles for one
/// provider endpoint.
#[async_trait]
pub trait Adapter: Send + Sync + std::fmt::Debug {
    /// The module reference this adapter was constructed from.
    fn module_ref(&self) -> &str;

    /// Obtain a ready model handle for a wire identifier.
    async fn language_model(&self, api_id: &str) -> Result<LanguageModel, AdapterError>;
}

/// Constructor for an out-of-tree adapter, registered by module reference.
pub type AdapterConstructor =
    Arc<dyn Fn(&ComposedOptions) -> Result<Arc<dyn Adapter>, AdapterError> + Send + Sync>;

// ────────────────────────────────────────────────────────────────────────────
// Option composition
// ────────────────────────────────────────────────────────────────────────────

/// Fully composed construction inputs for one adapter.
pub struct ComposedOptions {
    pub module_ref: String,
    pub options: OptionMap,
    pub request: Arc<dyn RequestFn>,
}

impl ComposedOptions {
    /// The `headers` option as a plain string map.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(OptionValue::Map(map)) = self.options.get("headers") {
            for (key, value) in map.iter() {
                if let Some(s) = value.as_str() {
                    headers.insert(key.clone(), s.to_string());
                }
            }
        }
        headers
    }

    pub fn base_url(&self) -> Option<&str> {
        self.options.get("baseURL").and_then(OptionValue::as_str)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.options.get("apiKey").and_then(OptionValue::as_str)
    }
}

/// Compose adapter construction options for a model: provider options
/// first, then the OpenAI-compatible `includeUsage` default, the `baseURL`
/// default from the model binding, the `apiKey` default from the provider
/// key, and finally the model's headers merged key-by-key.
pub(crate) fn compose(
    provider: &Provider,
    model: &Model,
    request: &Arc<dyn RequestFn>,
) -> ComposedOptions {
    let module_ref = model
        .api
        .module_ref
        .clone()
        .or_else(|| provider.module_ref.clone())
        .unwrap_or_else(|| catalog::OPENAI_COMPATIBLE.to_string());

    let mut options = provider.options.clone();
    options.merge(&model.options);

    if module_ref == catalog::OPENAI_COMPATIBLE && !options.contains_key("includeUsage") {
        options.insert("includeUsage", true);
    }
    if !options.contains_key("baseURL")
        && let Some(url) = model.api.url.as_deref().or(provider.api.as_deref())
    {
        options.insert("baseURL", url);
    }
    if !options.contains_key("apiKey")
        && let Some(key) = &provider.key
    {
        options.insert("apiKey", key.expose_secret());
    }
    if !model.headers.is_empty() {
        let headers: OptionMap = model
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), OptionValue::from(v.as_str())))
            .collect();
        let mut overlay = OptionMap::new();
        overlay.insert("headers", headers);
        options.merge(&overlay);
    }

    let timeout = options
        .get("timeout")
        .and_then(OptionValue::as_number)
        .map(|ms| Duration::from_millis(ms as u64));

    ComposedOptions {
        module_ref,
        options,
        request: with_timeout(request.clone(), timeout),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Factory
// ────────────────────────────────────────────────────────────────────────────

fn cache_key(module_ref: &str, options: &OptionMap) -> u64 {
    let mut hasher = DefaultHasher::new();
    module_ref.hash(&mut hasher);
    options.hash(&mut hasher);
    hasher.finish()
}

/// Builds adapters and caches them by (module reference, options).
pub(crate) struct AdapterFactory {
    constructors: HashMap<String, AdapterConstructor>,
    cache: Mutex<HashMap<u64, Arc<dyn Adapter>>>,
}

impl AdapterFactory {
    pub(crate) fn new(constructors: HashMap<String, AdapterConstructor>) -> Self {
        Self {
            constructors,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the adapter for a model, constructing and caching on miss.
    ///
    /// Concurrent resolves of the same key may both construct, but all
    /// callers converge on the first instance inserted.
    pub(crate) fn resolve(
        &self,
        provider: &Provider,
        model: &Model,
        request: &Arc<dyn RequestFn>,
    ) -> Result<Arc<dyn Adapter>, Error> {
        let composed = compose(provider, model, request);
        let key = cache_key(&composed.module_ref, &composed.options);

        if let Some(adapter) = self.cache.lock().unwrap().get(&key) {
            debug!(provider = %provider.id, module = %composed.module_ref, "adapter cache hit");
            return Ok(adapter.clone());
        }

        let adapter = self
            .construct(&composed)
            .map_err(|e| Error::provider_init(&provider.id, e))?;

        let mut cache = self.cache.lock().unwrap();
        Ok(cache.entry(key).or_insert(adapter).clone())
    }

    fn construct(&self, composed: &ComposedOptions) -> Result<Arc<dyn Adapter>, AdapterError> {
        match composed.module_ref.as_str() {
            catalog::OPENAI_COMPATIBLE => {
                Ok(Arc::new(OpenAiCompatibleAdapter::new(composed)?))
            }
            catalog::ANTHROPIC => Ok(Arc::new(AnthropicAdapter::new(composed)?)),
            catalog::OLLAMA => Ok(Arc::new(OllamaAdapter::new(composed)?)),
            other => match self.constructors.get(other) {
                Some(constructor) => constructor(composed),
                None => Err(AdapterError::UnknownModule(other.to_string())),
            },
        }
    }
}
