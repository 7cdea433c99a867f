//! Policy filter: configuration-driven visibility.
//!
//! Everything upstream computes candidate availability; this pass decides
//! actual availability. It runs once, after the merge, and is idempotent.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::Config;
use crate::types::{ModelStatus, Provider};

pub(crate) fn apply(providers: &mut BTreeMap<String, Provider>, config: &Config) {
    providers.retain(|id, _| {
        if let Some(enabled) = &config.enabled_providers
            && !enabled.iter().any(|e| e == id)
        {
            debug!(provider = %id, "provider not in enabled_providers; dropping");
            return false;
        }
        if config.disabled_providers.iter().any(|d| d == id) {
            debug!(provider = %id, "provider disabled; dropping");
            return false;
        }
        true
    });

    for (id, provider) in providers.iter_mut() {
        let overrides = config.provider.get(id);
        provider.models.retain(|model_id, model| {
            if model.status == ModelStatus::Alpha && !config.experimental {
                debug!(provider = %id, model = %model_id, "alpha model gated; dropping");
                return false;
            }
            if let Some(overrides) = overrides {
                // Deny is authoritative: the blacklist is checked first and
                // wins even when the whitelist names the same model.
                if let Some(blacklist) = &overrides.blacklist
                    && blacklist.iter().any(|b| b == model_id)
                {
                    debug!(provider = %id, model = %model_id, "blacklisted model; dropping");
                    return false;
                }
                if let Some(whitelist) = &overrides.whitelist
                    && !whitelist.iter().any(|w| w == model_id)
                {
                    debug!(provider = %id, model = %model_id, "not whitelisted; dropping");
                    return false;
                }
            }
            true
        });
    }

    providers.retain(|id, provider| {
        if provider.models.is_empty() {
            debug!(provider = %id, "no models left after filtering; dropping provider");
            return false;
        }
        true
    });
}
