//! Credential management for provider API keys.
//!
//! Keys resolve from two places: environment variables declared on each
//! provider (scanned by the merge engine) and a persisted store. The
//! persisted store is backed by the system keyring, with an in-memory
//! implementation available for tests and static deployments.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// A secure API key that prevents accidental logging.
///
/// The key is wrapped in `SecretString` which:
/// - Implements `Debug` as `"[REDACTED]"`
/// - Zeroizes memory on drop
/// - Requires explicit `.expose_secret()` to access the value
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Create a new API key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Expose the secret key value.
    ///
    /// Use sparingly - only when actually building a request.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stored credential type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// A plain API key.
    Api,
    /// An OAuth credential; the key, when present, is an access token.
    Oauth,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Oauth => "oauth",
        }
    }
}

/// A credential held by a [`CredentialSource`].
#[derive(Debug, Clone)]
pub struct AuthCredential {
    pub kind: CredentialKind,
    pub key: Option<ApiKey>,
}

impl AuthCredential {
    /// A plain API-key credential.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::Api,
            key: Some(ApiKey::new(key)),
        }
    }
}

/// On-disk / keyring representation of a credential.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    kind: CredentialKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

/// Read access to persisted provider credentials.
pub trait CredentialSource: Send + Sync {
    /// Fetch the stored credential for a provider, if any.
    fn get(&self, provider: &str) -> Option<AuthCredential>;

    /// Fetch stored credentials for a set of providers.
    fn all(&self, providers: &[&str]) -> BTreeMap<String, AuthCredential> {
        providers
            .iter()
            .filter_map(|p| self.get(p).map(|c| ((*p).to_string(), c)))
            .collect()
    }
}

/// Keyring-backed credential store.
///
/// Credentials are stored one keyring entry per provider, encoded as JSON.
/// A bare (non-JSON) entry value is treated as a plain API key so that
/// keys written by other tools still resolve.
pub struct CredentialStore {
    service_name: String,
}

impl CredentialStore {
    /// Create a new credential store.
    ///
    /// `service_name` is the keyring service identifier (e.g. "atlas").
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Store a credential for a provider.
    pub fn set(&self, provider: &str, credential: &AuthCredential) -> Result<()> {
        let stored = StoredCredential {
            kind: credential.kind,
            key: credential.key.as_ref().map(|k| k.expose_secret().to_string()),
        };
        let encoded = serde_json::to_string(&stored)?;
        let entry = self.keyring_entry(provider)?;
        entry
            .set_password(&encoded)
            .map_err(|e| Error::Keyring(e.to_string()))?;
        debug!(provider, "stored credential in keyring");
        Ok(())
    }

    /// Delete a provider's credential.
    pub fn delete(&self, provider: &str) -> Result<()> {
        let entry = self.keyring_entry(provider)?;
        entry
            .delete_credential()
            .map_err(|e| Error::Keyring(e.to_string()))?;
        debug!(provider, "deleted credential from keyring");
        Ok(())
    }

    fn keyring_entry(&self, provider: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name, provider).map_err(|e| Error::Keyring(e.to_string()))
    }
}

impl CredentialSource for CredentialStore {
    fn get(&self, provider: &str) -> Option<AuthCredential> {
        let entry = self.keyring_entry(provider).ok()?;
        let raw = entry.get_password().ok()?;
        let credential = match serde_json::from_str::<StoredCredential>(&raw) {
            Ok(stored) => AuthCredential {
                kind: stored.kind,
                key: stored.key.map(ApiKey::new),
            },
            Err(_) => AuthCredential::api_key(raw),
        };
        debug!(provider, kind = credential.kind.as_str(), "retrieved credential from keyring");
        Some(credential)
    }
}

/// In-memory credential source for tests and static deployments.
#[derive(Default)]
pub struct StaticCredentials(BTreeMap<String, AuthCredential>);

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, provider: &str, credential: AuthCredential) -> Self {
        self.0.insert(provider.to_string(), credential);
        self
    }

    pub fn insert(&mut self, provider: &str, credential: AuthCredential) {
        self.0.insert(provider.to_string(), credential);
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, provider: &str) -> Option<AuthCredential> {
        self.0.get(provider).cloned()
    }
}
