//! Provider auth hooks contributed by plugins.
//!
//! A plugin registers an [`AuthRegistration`] for one provider. When the
//! registry builds its provider table and finds stored credentials for that
//! provider, it invokes the registration's [`AuthLoader`] with a credential
//! accessor and a snapshot of the provider's current state. The loader
//! returns adapter construction options that the registry deep-merges into
//! the provider (derived headers, exchanged tokens, endpoint overrides).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PluginError;
use crate::types::{PluginCredential, ProviderSnapshot};

/// An auth hook for a single provider.
pub struct AuthRegistration {
    /// Provider id this hook applies to
    pub provider: String,
    /// Loader invoked when the provider has stored credentials.
    ///
    /// A registration without a loader only declares interest; it
    /// contributes nothing to the merge.
    pub loader: Option<Arc<dyn AuthLoader>>,
}

impl std::fmt::Debug for AuthRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRegistration")
            .field("provider", &self.provider)
            .field("loader", &self.loader.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Read-only access to stored credentials, scoped to the loader invocation.
pub trait CredentialAccess: Send + Sync {
    /// Fetch the stored credential for a provider, if any.
    fn get(&self, provider: &str) -> Option<PluginCredential>;
}

/// Turns stored credentials into adapter construction options.
///
/// Loaders may perform network or filesystem I/O (token exchange, profile
/// lookup); they must not assume the provider snapshot is complete beyond
/// what the registry has merged so far.
#[async_trait]
pub trait AuthLoader: Send + Sync {
    async fn load(
        &self,
        credentials: &dyn CredentialAccess,
        provider: &ProviderSnapshot,
    ) -> Result<serde_json::Map<String, serde_json::Value>, PluginError>;
}
