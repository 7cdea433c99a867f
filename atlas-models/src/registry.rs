//! The provider registry: the merged, filtered provider table plus the
//! adapter and handle caches built on top of it.
//!
//! Construction runs the merge engine and policy filter once; the table is
//! immutable afterwards and every read is lock-free. [`Registry::shared`]
//! memoizes one instance per process behind a `tokio::sync::OnceCell`, so
//! concurrent first callers await the same in-flight construction. The
//! shared instance lives until process exit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use atlas_plugin_api::Plugin;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::adapters::{
    AdapterConstructor, AdapterError, AdapterFactory, DefaultRequest, LanguageModel, RequestFn,
};
use crate::auth::{CredentialSource, CredentialStore};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::custom::ModelLoader;
use crate::types::{Model, Provider};
use crate::{merge, policy, select};
use crate::{Error, Result};

/// Keyring service name for the default credential store.
const KEYRING_SERVICE: &str = "atlas";

static SHARED: OnceCell<Registry> = OnceCell::const_new();

/// The process-wide provider/model registry.
pub struct Registry {
    providers: BTreeMap<String, Provider>,
    config: Config,
    model_loaders: HashMap<String, Arc<dyn ModelLoader>>,
    factory: AdapterFactory,
    request: Arc<dyn RequestFn>,
    handles: Mutex<HashMap<String, Arc<LanguageModel>>>,
}

impl Registry {
    /// Start building a registry with explicit inputs.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The process-wide registry, built on first use from defaults: the
    /// built-in catalog, configuration from the default path, and the
    /// keyring credential store.
    ///
    /// Concurrent callers during construction all await the same build.
    pub async fn shared() -> Result<&'static Registry> {
        SHARED
            .get_or_try_init(|| async { Registry::builder().build().await })
            .await
    }

    /// All available providers, in table order.
    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    /// One provider by id.
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.get(id)
    }

    /// Every available model, flattened, in table order.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.providers.values().flat_map(|p| p.models.values())
    }

    /// Look up a model by provider and model id.
    ///
    /// A miss carries up to three fuzzy-matched candidates: provider ids
    /// when the provider is unknown, that provider's model ids otherwise.
    pub fn get_model(&self, provider_id: &str, model_id: &str) -> Result<&Model> {
        let Some(provider) = self.providers.get(provider_id) else {
            let suggestions =
                select::suggestions(provider_id, self.providers.keys().map(String::as_str));
            return Err(Error::model_not_found(provider_id, model_id, suggestions));
        };
        provider.models.get(model_id).ok_or_else(|| {
            let suggestions =
                select::suggestions(model_id, provider.models.keys().map(String::as_str));
            Error::model_not_found(provider_id, model_id, suggestions)
        })
    }

    /// Obtain the ready-to-invoke handle for a model, building and caching
    /// the adapter on the way.
    ///
    /// Concurrent calls for the same model may both construct, but all
    /// callers converge on one cached handle.
    pub async fn language_model(&self, model: &Model) -> Result<Arc<LanguageModel>> {
        let key = format!("{}/{}", model.provider, model.id);
        if let Some(handle) = self.handles.lock().unwrap().get(&key) {
            debug!(model = %key, "language model cache hit");
            return Ok(handle.clone());
        }

        let Some(provider) = self.providers.get(&model.provider) else {
            let suggestions =
                select::suggestions(&model.provider, self.providers.keys().map(String::as_str));
            return Err(Error::model_not_found(&model.provider, &model.id, suggestions));
        };

        let adapter = self.factory.resolve(provider, model, &self.request)?;
        let resolved = match self.model_loaders.get(&model.provider) {
            Some(loader) => {
                loader
                    .load(adapter.as_ref(), &model.api.id, &provider.options)
                    .await
            }
            None => adapter.language_model(&model.api.id).await,
        };

        let handle = match resolved {
            Ok(handle) => handle,
            // The adapter has no candidate list of its own, so no
            // suggestions here.
            Err(AdapterError::ModelNotFound { .. }) => {
                return Err(Error::model_not_found(&model.provider, &model.id, Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut handles = self.handles.lock().unwrap();
        Ok(handles.entry(key).or_insert_with(|| Arc::new(handle)).clone())
    }

    /// The default model.
    ///
    /// A configured `model = "provider/model"` string wins (split on the
    /// first `/`; the model id may itself contain slashes). Otherwise the
    /// first table-order provider mentioned in configuration - or the
    /// first table-order provider outright - supplies its highest-priority
    /// model.
    pub fn default_model(&self) -> Result<&Model> {
        if let Some(reference) = &self.config.model {
            let (provider_id, model_id) = parse_model_ref(reference)?;
            return self.get_model(provider_id, model_id);
        }

        let provider = self
            .providers
            .values()
            .find(|p| self.config.provider.contains_key(&p.id))
            .or_else(|| self.providers.values().next())
            .ok_or(Error::NoDefaultModel)?;

        let mut models: Vec<&Model> = provider.models.values().collect();
        select::sort_by_priority(&mut models);
        models.first().copied().ok_or(Error::NoDefaultModel)
    }

    /// The small/cheap companion model for a provider.
    ///
    /// `Ok(None)` means none is available - callers must handle absence. An
    /// error only arises from a malformed or unresolvable configured
    /// `small_model` override.
    pub fn small_model(&self, provider_id: &str) -> Result<Option<&Model>> {
        if let Some(reference) = &self.config.small_model {
            let (provider_id, model_id) = parse_model_ref(reference)?;
            return self.get_model(provider_id, model_id).map(Some);
        }

        if let Some(provider) = self.providers.get(provider_id) {
            for fragment in select::SMALL_FRAGMENTS {
                if let Some(model) = provider.models.values().find(|m| m.id.contains(fragment)) {
                    return Ok(Some(model));
                }
            }
        }

        let (fallback_provider, fallback_model) = select::SMALL_FALLBACK;
        if let Some(provider) = self.providers.get(fallback_provider)
            && let Some(model) = provider.models.get(fallback_model)
        {
            return Ok(Some(model));
        }

        Ok(None)
    }
}

/// Split a `provider/model` reference on the first slash.
fn parse_model_ref(reference: &str) -> Result<(&str, &str)> {
    reference.split_once('/').ok_or_else(|| {
        Error::Config(format!(
            "invalid model reference '{reference}': expected provider/model"
        ))
    })
}

/// Configures and constructs a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    catalog: Option<Catalog>,
    config: Option<Config>,
    credentials: Option<Arc<dyn CredentialSource>>,
    plugins: Vec<Arc<dyn Plugin>>,
    adapters: Vec<(String, AdapterConstructor)>,
    model_loaders: Vec<(String, Arc<dyn ModelLoader>)>,
    request: Option<Arc<dyn RequestFn>>,
}

impl RegistryBuilder {
    /// Use an explicit catalog instead of the built-in baseline.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Use an explicit configuration instead of the on-disk default.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an explicit credential source instead of the keyring store.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Register a plugin.
    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register an out-of-tree adapter constructor for a module reference.
    pub fn adapter(mut self, module_ref: &str, constructor: AdapterConstructor) -> Self {
        self.adapters.push((module_ref.to_string(), constructor));
        self
    }

    /// Register a custom model loader for a provider, overriding any
    /// built-in one.
    pub fn model_loader(mut self, provider: &str, loader: Arc<dyn ModelLoader>) -> Self {
        self.model_loaders.push((provider.to_string(), loader));
        self
    }

    /// Supply the network-request function adapters must call through.
    pub fn request(mut self, request: Arc<dyn RequestFn>) -> Self {
        self.request = Some(request);
        self
    }

    /// Run the merge and policy filter and assemble the registry.
    pub async fn build(self) -> Result<Registry> {
        let catalog = self.catalog.unwrap_or_else(Catalog::builtin);
        let config = match self.config {
            Some(config) => config,
            None => Config::load_default()?,
        };
        let credentials: Arc<dyn CredentialSource> = self
            .credentials
            .unwrap_or_else(|| Arc::new(CredentialStore::new(KEYRING_SERVICE)));

        let plugins: Vec<Arc<dyn Plugin>> = self
            .plugins
            .into_iter()
            .filter(|plugin| {
                let manifest = plugin.manifest();
                if manifest.api_version == atlas_plugin_api::API_VERSION {
                    true
                } else {
                    warn!(
                        plugin = %manifest.name,
                        version = manifest.api_version,
                        expected = atlas_plugin_api::API_VERSION,
                        "plugin built against incompatible API version; skipping"
                    );
                    false
                }
            })
            .collect();

        let mut output = merge::build(catalog, &config, credentials.as_ref(), &plugins).await;
        policy::apply(&mut output.providers, &config);

        for (provider, loader) in self.model_loaders {
            output.model_loaders.insert(provider, loader);
        }

        let factory = AdapterFactory::new(self.adapters.into_iter().collect());
        let request: Arc<dyn RequestFn> = self
            .request
            .unwrap_or_else(|| Arc::new(DefaultRequest::new()));

        Ok(Registry {
            providers: output.providers,
            config,
            model_loaders: output.model_loaders,
            factory,
            request,
            handles: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthCredential, StaticCredentials};
    use std::collections::BTreeMap as Map;

    fn test_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert("openrouter", Provider {
            name: "OpenRouter".to_string(),
            env: vec!["REGISTRY_TEST_OPENROUTER_KEY".to_string()],
            api: Some("https://openrouter.ai/api/v1".to_string()),
            module_ref: Some(crate::catalog::OPENAI_COMPATIBLE.to_string()),
            models: Map::from([
                ("anthropic/claude-sonnet-4.5".to_string(), Model::default()),
                ("x-ai/grok-code-fast-1".to_string(), Model::default()),
            ]),
            ..Provider::default()
        });
        catalog.insert("anthropic", Provider {
            name: "Anthropic".to_string(),
            env: vec!["REGISTRY_TEST_ANTHROPIC_KEY".to_string()],
            api: Some("https://api.anthropic.com/v1".to_string()),
            module_ref: Some(crate::catalog::ANTHROPIC.to_string()),
            models: Map::from([
                ("claude-sonnet-4-5".to_string(), Model::default()),
                ("claude-haiku-4-5".to_string(), Model::default()),
            ]),
            ..Provider::default()
        });
        catalog
    }

    fn test_credentials() -> Arc<StaticCredentials> {
        Arc::new(
            StaticCredentials::new()
                .with("openrouter", AuthCredential::api_key("sk-or"))
                .with("anthropic", AuthCredential::api_key("sk-ant")),
        )
    }

    async fn test_registry(config: Config) -> Registry {
        Registry::builder()
            .catalog(test_catalog())
            .config(config)
            .credentials(test_credentials())
            .build()
            .await
            .expect("registry builds")
    }

    #[tokio::test]
    async fn get_model_finds_existing_models() {
        let registry = test_registry(Config::default()).await;
        let model = registry
            .get_model("openrouter", "x-ai/grok-code-fast-1")
            .unwrap();
        assert_eq!(model.provider, "openrouter");
        assert_eq!(model.api.id, "x-ai/grok-code-fast-1");
    }

    #[tokio::test]
    async fn unknown_provider_suggests_provider_ids() {
        let registry = test_registry(Config::default()).await;
        let err = registry.get_model("openrouterr", "whatever").unwrap_err();
        match err {
            Error::ModelNotFound {
                provider,
                suggestions,
                ..
            } => {
                assert_eq!(provider, "openrouterr");
                assert!(suggestions.len() <= 3);
                assert_eq!(suggestions[0], "openrouter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_model_suggests_that_providers_models() {
        let registry = test_registry(Config::default()).await;
        let err = registry
            .get_model("anthropic", "claude-sonet-4-5")
            .unwrap_err();
        match err {
            Error::ModelNotFound { suggestions, .. } => {
                assert!(suggestions.len() <= 3);
                assert_eq!(suggestions[0], "claude-sonnet-4-5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn default_model_honors_configured_reference_with_slashes() {
        let config = Config {
            model: Some("openrouter/x-ai/grok-code-fast-1".to_string()),
            ..Config::default()
        };
        let registry = test_registry(config).await;
        let model = registry.default_model().unwrap();
        assert_eq!(model.provider, "openrouter");
        assert_eq!(model.id, "x-ai/grok-code-fast-1");
    }

    #[tokio::test]
    async fn default_model_rejects_reference_without_slash() {
        let config = Config {
            model: Some("just-a-model".to_string()),
            ..Config::default()
        };
        let registry = test_registry(config).await;
        assert!(matches!(registry.default_model(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn default_model_prefers_configured_providers() {
        let mut config = Config::default();
        config
            .provider
            .insert("openrouter".to_string(), Default::default());
        let registry = test_registry(config).await;
        let model = registry.default_model().unwrap();
        // openrouter is the only configured provider; its top priority
        // model is grok-code-fast-1.
        assert_eq!(model.provider, "openrouter");
        assert_eq!(model.id, "x-ai/grok-code-fast-1");
    }

    #[tokio::test]
    async fn default_model_falls_back_to_table_order() {
        let registry = test_registry(Config::default()).await;
        let model = registry.default_model().unwrap();
        // "anthropic" sorts first in table order.
        assert_eq!(model.provider, "anthropic");
        assert_eq!(model.id, "claude-sonnet-4-5");
    }

    #[tokio::test]
    async fn default_model_fails_on_empty_table() {
        let registry = Registry::builder()
            .catalog(Catalog::new())
            .config(Config::default())
            .credentials(Arc::new(StaticCredentials::new()))
            .build()
            .await
            .unwrap();
        assert!(matches!(registry.default_model(), Err(Error::NoDefaultModel)));
    }

    #[tokio::test]
    async fn small_model_scans_fragments_in_order() {
        let registry = test_registry(Config::default()).await;
        let model = registry.small_model("anthropic").unwrap().unwrap();
        assert_eq!(model.id, "claude-haiku-4-5");
    }

    #[tokio::test]
    async fn small_model_honors_configured_override() {
        let config = Config {
            small_model: Some("openrouter/x-ai/grok-code-fast-1".to_string()),
            ..Config::default()
        };
        let registry = test_registry(config).await;
        let model = registry.small_model("anthropic").unwrap().unwrap();
        assert_eq!(model.provider, "openrouter");
    }

    #[tokio::test]
    async fn small_model_falls_back_to_known_good_pair() {
        // openrouter has no small-fragment model; the fallback pair exists.
        let registry = test_registry(Config::default()).await;
        let model = registry.small_model("openrouter").unwrap().unwrap();
        assert_eq!(model.provider, "anthropic");
        assert_eq!(model.id, "claude-haiku-4-5");
    }

    #[tokio::test]
    async fn small_model_absence_is_not_an_error() {
        let mut catalog = Catalog::new();
        catalog.insert("openrouter", Provider {
            env: vec!["REGISTRY_TEST_OPENROUTER_KEY".to_string()],
            api: Some("https://openrouter.ai/api/v1".to_string()),
            models: Map::from([("big-model".to_string(), Model::default())]),
            ..Provider::default()
        });
        let registry = Registry::builder()
            .catalog(catalog)
            .config(Config::default())
            .credentials(test_credentials())
            .build()
            .await
            .unwrap();
        assert!(registry.small_model("openrouter").unwrap().is_none());
    }

    #[tokio::test]
    async fn language_model_handles_are_cached() {
        let registry = test_registry(Config::default()).await;
        let model = registry
            .get_model("openrouter", "x-ai/grok-code-fast-1")
            .unwrap();

        let first = registry.language_model(model).await.unwrap();
        let second = registry.language_model(model).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, "x-ai/grok-code-fast-1");
        assert_eq!(
            first.url,
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn concurrent_handle_resolution_converges() {
        let registry = test_registry(Config::default()).await;
        let model = registry
            .get_model("anthropic", "claude-sonnet-4-5")
            .unwrap();

        let (a, b) = tokio::join!(
            registry.language_model(model),
            registry.language_model(model)
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn adapter_not_found_translates_without_suggestions() {
        use crate::adapters::{Adapter, ComposedOptions};
        use async_trait::async_trait;

        #[derive(Debug)]
        struct MissingModels;

        #[async_trait]
        impl Adapter for MissingModels {
            fn module_ref(&self) -> &str {
                "missing"
            }

            async fn language_model(
                &self,
                api_id: &str,
            ) -> std::result::Result<LanguageModel, AdapterError> {
                Err(AdapterError::ModelNotFound {
                    model: api_id.to_string(),
                })
            }
        }

        let mut catalog = Catalog::new();
        catalog.insert("ghost", Provider {
            env: vec!["REGISTRY_TEST_GHOST_KEY".to_string()],
            api: Some("https://ghost.example/v1".to_string()),
            module_ref: Some("missing".to_string()),
            models: Map::from([("phantom".to_string(), Model::default())]),
            ..Provider::default()
        });

        let registry = Registry::builder()
            .catalog(catalog)
            .config(Config::default())
            .credentials(Arc::new(
                StaticCredentials::new().with("ghost", AuthCredential::api_key("sk")),
            ))
            .adapter(
                "missing",
                Arc::new(|_: &ComposedOptions| {
                    Ok(Arc::new(MissingModels) as Arc<dyn Adapter>)
                }),
            )
            .build()
            .await
            .unwrap();

        let model = registry.get_model("ghost", "phantom").unwrap();
        let err = registry.language_model(model).await.unwrap_err();
        match err {
            Error::ModelNotFound {
                provider,
                model,
                suggestions,
            } => {
                assert_eq!(provider, "ghost");
                assert_eq!(model, "phantom");
                assert!(suggestions.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn custom_model_loader_overrides_default_resolution() {
        use crate::adapters::Adapter;
        use crate::types::OptionMap;
        use async_trait::async_trait;

        struct PrefixLoader;

        #[async_trait]
        impl ModelLoader for PrefixLoader {
            async fn load(
                &self,
                adapter: &dyn Adapter,
                api_id: &str,
                _options: &OptionMap,
            ) -> std::result::Result<LanguageModel, AdapterError> {
                let mut handle = adapter.language_model(api_id).await?;
                handle
                    .headers
                    .insert("x-loader".to_string(), "custom".to_string());
                Ok(handle)
            }
        }

        let registry = Registry::builder()
            .catalog(test_catalog())
            .config(Config::default())
            .credentials(test_credentials())
            .model_loader("openrouter", Arc::new(PrefixLoader))
            .build()
            .await
            .unwrap();

        let model = registry
            .get_model("openrouter", "anthropic/claude-sonnet-4.5")
            .unwrap();
        let handle = registry.language_model(model).await.unwrap();
        assert_eq!(handle.headers.get("x-loader").map(String::as_str), Some("custom"));
    }

    #[tokio::test]
    async fn incompatible_plugins_are_skipped() {
        use atlas_plugin_api::{PluginManifest, AuthRegistration};

        struct Stale;
        impl Plugin for Stale {
            fn manifest(&self) -> PluginManifest {
                PluginManifest {
                    name: "stale".to_string(),
                    api_version: 0,
                    ..Default::default()
                }
            }

            fn auth(&self) -> Option<AuthRegistration> {
                // Never reached: the builder skips this plugin.
                None
            }
        }

        let registry = Registry::builder()
            .catalog(test_catalog())
            .config(Config::default())
            .credentials(test_credentials())
            .plugin(Arc::new(Stale))
            .build()
            .await
            .unwrap();
        assert!(registry.provider("openrouter").is_some());
    }

    #[test]
    fn parse_model_ref_splits_on_first_slash() {
        assert_eq!(
            parse_model_ref("openrouter/x-ai/grok-code-fast-1").unwrap(),
            ("openrouter", "x-ai/grok-code-fast-1")
        );
        assert!(parse_model_ref("no-slash").is_err());
    }
}
