//! The merge engine: builds the provider table from layered inputs.
//!
//! Layer order (later layers win per-field, never wholesale):
//! catalog, configuration overrides, credentials (env scan then persisted
//! store), plugin auth loaders, built-in custom loaders. The result is the
//! candidate table the policy filter prunes.
//!
//! The merge performs no network I/O of its own and is deterministic given
//! fixed inputs; a failure applying any layer to one provider skips that
//! provider without aborting the rest.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use atlas_plugin_api::{CredentialAccess, Plugin, PluginCredential, ProviderSnapshot};
use tracing::{debug, warn};

use crate::auth::{ApiKey, CredentialKind, CredentialSource};
use crate::catalog::Catalog;
use crate::config::{Config, CostOverride, ModelOverride, ProviderOverride};
use crate::custom::{self, ModelLoader};
use crate::types::{
    Model, ModelCost, OptionMap, OptionValue, Provider, ProviderSource,
};

/// Everything the merge contributes to the registry.
pub(crate) struct MergeOutput {
    pub providers: BTreeMap<String, Provider>,
    pub model_loaders: HashMap<String, Arc<dyn ModelLoader>>,
}

pub(crate) async fn build(
    catalog: Catalog,
    config: &Config,
    credentials: &dyn CredentialSource,
    plugins: &[Arc<dyn Plugin>],
) -> MergeOutput {
    let mut providers = catalog.into_providers();
    let mut model_loaders: HashMap<String, Arc<dyn ModelLoader>> = HashMap::new();

    // Layer 2: configuration overrides.
    let mut configured: BTreeSet<String> = BTreeSet::new();
    for (id, overrides) in &config.provider {
        configured.insert(id.clone());
        let provider = providers
            .entry(id.clone())
            .or_insert_with(|| Provider::named(id));
        apply_provider_override(provider, overrides);
        provider.normalize(id);
    }

    // Layer 3: credentials - env scan, then the persisted store.
    for (id, provider) in &mut providers {
        if provider.key.is_none() {
            let present: Vec<(String, String)> = provider
                .env
                .iter()
                .filter_map(|name| env_value(name).map(|value| (name.clone(), value)))
                .collect();
            if !present.is_empty() {
                provider.source = ProviderSource::Env;
                if provider.env.len() == 1 {
                    provider.key = Some(ApiKey::new(present[0].1.clone()));
                    debug!(provider = %id, var = %present[0].0, "resolved API key from environment");
                } else {
                    // Several declared names: no single var is authoritative.
                    // Expose every present value to adapter construction and
                    // leave key selection to the client.
                    let env_map: OptionMap = present
                        .iter()
                        .map(|(name, value)| (name.clone(), OptionValue::from(value.as_str())))
                        .collect();
                    let mut overlay = OptionMap::new();
                    overlay.insert("env", env_map);
                    provider.options.merge(&overlay);
                    debug!(
                        provider = %id,
                        candidates = provider.env.len(),
                        "multiple credential env vars declared; leaving key to the adapter"
                    );
                }
            }
        }

        if let Some(credential) = credentials.get(id)
            && credential.kind == CredentialKind::Api
            && let Some(key) = credential.key
        {
            provider.key = Some(key);
            provider.source = ProviderSource::Api;
            debug!(provider = %id, "using stored API credential");
        }
    }

    // Layer 4: plugin auth loaders. Runs after the raw credential layer so
    // plugin-computed options win over bare keys.
    let mut plugin_touched: BTreeSet<String> = BTreeSet::new();
    for plugin in plugins {
        let Some(registration) = plugin.auth() else {
            continue;
        };
        let Some(loader) = registration.loader else {
            continue;
        };
        if credentials.get(&registration.provider).is_none() {
            continue;
        }
        let Some(provider) = providers.get_mut(&registration.provider) else {
            continue;
        };

        let snapshot = snapshot_of(provider);
        let accessor = StoreAccess(credentials);
        match loader.load(&accessor, &snapshot).await {
            Ok(options) => match option_map_from_json(options) {
                Ok(options) => {
                    provider.options.merge(&options);
                    provider.source = ProviderSource::Custom;
                    plugin_touched.insert(registration.provider.clone());
                }
                Err(e) => {
                    warn!(
                        provider = %registration.provider,
                        plugin = %plugin.manifest().name,
                        error = %e,
                        "auth plugin returned unusable options; skipping"
                    );
                }
            },
            Err(e) => {
                warn!(
                    provider = %registration.provider,
                    plugin = %plugin.manifest().name,
                    error = %e,
                    "auth plugin failed; skipping"
                );
            }
        }
    }

    // Layer 5: built-in custom loaders.
    let mut auto_loaded: BTreeSet<String> = BTreeSet::new();
    for entry in custom::builtin_loaders() {
        let Some(provider) = providers.get_mut(entry.provider) else {
            continue;
        };
        if let Some(derive) = entry.options {
            let derived = derive(provider);
            provider.options.merge(&derived);
        }
        if entry.auto_load {
            auto_loaded.insert(entry.provider.to_string());
            if provider.key.is_none() {
                provider.source = ProviderSource::Custom;
            }
        }
        if let Some(loader) = entry.model_loader {
            model_loaders.insert(entry.provider.to_string(), loader);
        }
    }

    // A provider with no way to construct a working adapter is dropped:
    // no credential found (a key, or ambiguous env values), not
    // auto-loadable, never configured, nothing from plugins.
    providers.retain(|id, provider| {
        let keep = provider.key.is_some()
            || provider.source == ProviderSource::Env
            || auto_loaded.contains(id)
            || configured.contains(id)
            || plugin_touched.contains(id);
        if !keep {
            debug!(provider = %id, "no credentials; provider unavailable");
        }
        keep
    });

    MergeOutput {
        providers,
        model_loaders,
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn apply_provider_override(provider: &mut Provider, overrides: &ProviderOverride) {
    if let Some(name) = &overrides.name {
        provider.name = name.clone();
    }
    if let Some(env) = &overrides.env {
        provider.env = env.clone();
    }
    if let Some(api) = &overrides.api {
        provider.api = Some(api.clone());
    }
    if let Some(module_ref) = &overrides.module_ref {
        provider.module_ref = Some(module_ref.clone());
    }
    provider.options.merge(&overrides.options);

    for (model_id, model_override) in &overrides.models {
        let mut model = provider
            .models
            .get(model_id)
            .cloned()
            .unwrap_or_else(|| Model {
                id: model_id.clone(),
                ..Model::default()
            });
        apply_model_override(&mut model, model_override);
        provider.models.insert(model_id.clone(), model);
    }
}

fn apply_model_override(model: &mut Model, overrides: &ModelOverride) {
    if let Some(name) = &overrides.name {
        model.name = name.clone();
    }
    if let Some(family) = &overrides.family {
        model.family = Some(family.clone());
    }
    if let Some(release_date) = &overrides.release_date {
        model.release_date = Some(release_date.clone());
    }
    if let Some(status) = overrides.status {
        model.status = status;
    }
    if let Some(temperature) = overrides.temperature {
        model.capabilities.temperature = temperature;
    }
    if let Some(reasoning) = overrides.reasoning {
        model.capabilities.reasoning = reasoning;
    }
    if let Some(attachment) = overrides.attachment {
        model.capabilities.attachment = attachment;
    }
    if let Some(tool_call) = overrides.tool_call {
        model.capabilities.tool_call = tool_call;
    }
    if let Some(interleaved) = &overrides.interleaved {
        model.interleaved = Some(interleaved.clone());
    }
    if let Some(modalities) = overrides.modalities {
        model.modalities = modalities;
    }
    if let Some(cost) = &overrides.cost {
        apply_cost_override(&mut model.cost, cost);
    }
    if let Some(limit) = &overrides.limit {
        if let Some(context) = limit.context {
            model.limit.context = context;
        }
        if let Some(output) = limit.output {
            model.limit.output = output;
        }
    }
    if let Some(api_id) = &overrides.api_id {
        model.api.id = api_id.clone();
    }
    model.options.merge(&overrides.options);
    for (key, value) in &overrides.headers {
        model.headers.insert(key.clone(), value.clone());
    }
}

fn apply_cost_override(cost: &mut ModelCost, overrides: &CostOverride) {
    if let Some(input) = overrides.input {
        cost.input = input;
    }
    if let Some(output) = overrides.output {
        cost.output = output;
    }
    if let Some(cache_read) = overrides.cache_read {
        cost.cache_read = cache_read;
    }
    if let Some(cache_write) = overrides.cache_write {
        cost.cache_write = cache_write;
    }
    if let Some(over_200k) = &overrides.over_200k {
        let mut tier = cost
            .over_200k
            .take()
            .unwrap_or_else(|| Box::new(cost.clone()));
        apply_cost_override(&mut tier, over_200k);
        cost.over_200k = Some(tier);
    }
}

fn snapshot_of(provider: &Provider) -> ProviderSnapshot {
    ProviderSnapshot {
        id: provider.id.clone(),
        name: provider.name.clone(),
        env: provider.env.clone(),
        options: json_map_from_options(&provider.options),
    }
}

fn json_map_from_options(options: &OptionMap) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::to_value(options) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

fn option_map_from_json(
    map: serde_json::Map<String, serde_json::Value>,
) -> Result<OptionMap, serde_json::Error> {
    serde_json::from_value(serde_json::Value::Object(map))
}

/// Credential accessor handed to plugin auth loaders.
struct StoreAccess<'a>(&'a dyn CredentialSource);

impl CredentialAccess for StoreAccess<'_> {
    fn get(&self, provider: &str) -> Option<PluginCredential> {
        self.0.get(provider).map(|credential| PluginCredential {
            kind: credential.kind.as_str().to_string(),
            key: credential
                .key
                .as_ref()
                .map(|key| key.expose_secret().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthCredential, StaticCredentials};
    use crate::config::LimitOverride;

    fn catalog_with_acme(env_var: &str) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert("acme", Provider {
            name: "Acme".to_string(),
            env: vec![env_var.to_string()],
            api: Some("https://acme.example/v1".to_string()),
            module_ref: Some("openai-compatible".to_string()),
            models: BTreeMap::from([(
                "acme-chat".to_string(),
                Model {
                    name: "Acme Chat".to_string(),
                    cost: ModelCost {
                        input: 1.0,
                        output: 2.0,
                        cache_read: 0.1,
                        cache_write: 1.25,
                        over_200k: None,
                    },
                    ..Model::default()
                },
            )]),
            ..Provider::default()
        });
        catalog
    }

    fn store_with_acme_key() -> StaticCredentials {
        StaticCredentials::new().with("acme", AuthCredential::api_key("stored-key"))
    }

    #[tokio::test]
    async fn config_fields_win_over_catalog_per_field() {
        let config: Config = toml::from_str(
            r#"
[provider.acme]
name = "Acme Prime"

[provider.acme.models.acme-chat]
reasoning = true

[provider.acme.models.acme-chat.cost]
output = 9.0

[provider.acme.models.acme-chat.limit]
output = 4096
"#,
        )
        .unwrap();

        let output = build(
            catalog_with_acme("MERGE_TEST_CFG_KEY"),
            &config,
            &store_with_acme_key(),
            &[],
        )
        .await;

        let acme = output.providers.get("acme").expect("acme retained");
        // Overridden fields take the configuration value.
        assert_eq!(acme.name, "Acme Prime");
        // Fields absent from configuration keep the catalog value.
        assert_eq!(acme.api.as_deref(), Some("https://acme.example/v1"));

        let chat = acme.models.get("acme-chat").unwrap();
        assert!(chat.capabilities.reasoning);
        assert_eq!(chat.name, "Acme Chat");
        // Cost merges key-by-key.
        assert!((chat.cost.output - 9.0).abs() < f64::EPSILON);
        assert!((chat.cost.input - 1.0).abs() < f64::EPSILON);
        // Limit merges key-by-key.
        assert_eq!(chat.limit.output, 4096);
        assert_eq!(chat.limit.context, 128_000);
    }

    #[tokio::test]
    async fn config_creates_providers_absent_from_catalog() {
        let mut config = Config::default();
        let mut overrides = ProviderOverride {
            api: Some("https://local.example/v1".to_string()),
            module_ref: Some("openai-compatible".to_string()),
            ..ProviderOverride::default()
        };
        overrides.models.insert(
            "local-chat".to_string(),
            ModelOverride {
                limit: Some(LimitOverride {
                    context: Some(32_000),
                    output: None,
                }),
                ..ModelOverride::default()
            },
        );
        config.provider.insert("local".to_string(), overrides);

        let output = build(Catalog::new(), &config, &StaticCredentials::new(), &[]).await;

        let local = output.providers.get("local").expect("configured provider retained");
        assert_eq!(local.source, ProviderSource::Config);
        let chat = local.models.get("local-chat").unwrap();
        // Creation falls back to defaults for unset fields.
        assert!(chat.capabilities.tool_call);
        assert!(chat.modalities.input.text);
        assert_eq!(chat.limit.context, 32_000);
        assert_eq!(chat.api.id, "local-chat");
    }

    #[tokio::test]
    async fn single_env_var_resolves_key_directly() {
        // SAFETY: unique var name, no concurrent reader of this variable
        unsafe { std::env::set_var("MERGE_TEST_SINGLE_KEY", "env-key") };

        let output = build(
            catalog_with_acme("MERGE_TEST_SINGLE_KEY"),
            &Config::default(),
            &StaticCredentials::new(),
            &[],
        )
        .await;

        // SAFETY: see above
        unsafe { std::env::remove_var("MERGE_TEST_SINGLE_KEY") };

        let acme = output.providers.get("acme").expect("acme retained");
        assert_eq!(acme.source, ProviderSource::Env);
        assert_eq!(acme.key.as_ref().unwrap().expose_secret(), "env-key");
    }

    #[tokio::test]
    async fn ambiguous_env_leaves_key_unset_but_exposes_values() {
        let mut catalog = Catalog::new();
        catalog.insert("ambi", Provider {
            env: vec![
                "MERGE_TEST_AMBI_KEY_A".to_string(),
                "MERGE_TEST_AMBI_KEY_B".to_string(),
            ],
            api: Some("https://ambi.example/v1".to_string()),
            module_ref: Some("openai-compatible".to_string()),
            models: BTreeMap::from([("m".to_string(), Model::default())]),
            ..Provider::default()
        });

        // SAFETY: unique var names, no concurrent reader
        unsafe {
            std::env::set_var("MERGE_TEST_AMBI_KEY_A", "value-a");
            std::env::set_var("MERGE_TEST_AMBI_KEY_B", "value-b");
        }

        let output = build(catalog, &Config::default(), &StaticCredentials::new(), &[]).await;

        // SAFETY: see above
        unsafe {
            std::env::remove_var("MERGE_TEST_AMBI_KEY_A");
            std::env::remove_var("MERGE_TEST_AMBI_KEY_B");
        }

        let ambi = output.providers.get("ambi").expect("ambi retained");
        assert_eq!(ambi.source, ProviderSource::Env);
        assert!(ambi.key.is_none(), "no single env var is authoritative");

        let env = ambi.options.get("env").and_then(OptionValue::as_map).unwrap();
        assert_eq!(
            env.get("MERGE_TEST_AMBI_KEY_A").and_then(OptionValue::as_str),
            Some("value-a")
        );
        assert_eq!(
            env.get("MERGE_TEST_AMBI_KEY_B").and_then(OptionValue::as_str),
            Some("value-b")
        );
    }

    #[tokio::test]
    async fn ambiguous_env_provider_is_retained_without_key() {
        // Present values under options["env"] mark the provider usable even
        // though no key was chosen.
        let mut catalog = Catalog::new();
        catalog.insert("ambi", Provider {
            env: vec![
                "MERGE_TEST_AMBI2_KEY_A".to_string(),
                "MERGE_TEST_AMBI2_KEY_B".to_string(),
            ],
            models: BTreeMap::from([("m".to_string(), Model::default())]),
            ..Provider::default()
        });

        // SAFETY: unique var name, no concurrent reader
        unsafe { std::env::set_var("MERGE_TEST_AMBI2_KEY_A", "value-a") };
        let mut config = Config::default();
        config
            .provider
            .insert("ambi".to_string(), ProviderOverride::default());
        let output = build(catalog, &config, &StaticCredentials::new(), &[]).await;
        // SAFETY: see above
        unsafe { std::env::remove_var("MERGE_TEST_AMBI2_KEY_A") };

        assert!(output.providers.contains_key("ambi"));
    }

    #[tokio::test]
    async fn stored_api_credential_overrides_env_key() {
        // SAFETY: unique var name, no concurrent reader
        unsafe { std::env::set_var("MERGE_TEST_STORED_KEY", "env-key") };

        let output = build(
            catalog_with_acme("MERGE_TEST_STORED_KEY"),
            &Config::default(),
            &store_with_acme_key(),
            &[],
        )
        .await;

        // SAFETY: see above
        unsafe { std::env::remove_var("MERGE_TEST_STORED_KEY") };

        let acme = output.providers.get("acme").unwrap();
        assert_eq!(acme.source, ProviderSource::Api);
        assert_eq!(acme.key.as_ref().unwrap().expose_secret(), "stored-key");
    }

    #[tokio::test]
    async fn providers_without_any_credential_path_are_dropped() {
        let output = build(
            catalog_with_acme("MERGE_TEST_DROP_KEY"),
            &Config::default(),
            &StaticCredentials::new(),
            &[],
        )
        .await;
        assert!(!output.providers.contains_key("acme"));
    }

    #[tokio::test]
    async fn builtin_auto_loaders_retain_and_register() {
        let mut catalog = Catalog::new();
        catalog.insert("ollama", Provider {
            module_ref: Some("ollama".to_string()),
            models: BTreeMap::from([("llama3.2".to_string(), Model::default())]),
            ..Provider::default()
        });
        catalog.insert("github-copilot", Provider {
            api: Some("https://api.githubcopilot.com".to_string()),
            module_ref: Some("openai-compatible".to_string()),
            models: BTreeMap::from([("gpt-5-mini".to_string(), Model::default())]),
            ..Provider::default()
        });

        let store = StaticCredentials::new()
            .with("github-copilot", AuthCredential::api_key("ghu_token"));
        let output = build(catalog, &Config::default(), &store, &[]).await;

        let ollama = output.providers.get("ollama").expect("auto-loaded");
        assert_eq!(ollama.source, ProviderSource::Custom);
        assert!(ollama.options.get("baseURL").is_some());

        let copilot = output.providers.get("github-copilot").expect("keyed");
        let headers = copilot
            .options
            .get("headers")
            .and_then(OptionValue::as_map)
            .expect("derived headers");
        assert!(headers.get("Copilot-Integration-Id").is_some());

        assert!(output.model_loaders.contains_key("github-copilot"));
        assert!(!output.model_loaders.contains_key("ollama"));
    }
}
