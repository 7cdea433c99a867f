//! Plugin types and metadata structures

use serde::{Deserialize, Serialize};

/// Plugin manifest containing metadata about the plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name (used for identification and log context)
    pub name: String,
    /// Plugin version (semver)
    pub version: String,
    /// API version this plugin was built against
    pub api_version: u32,
    /// Human-readable description
    pub description: String,
    /// Plugin author
    pub author: String,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.0.1".to_string(),
            api_version: crate::API_VERSION,
            description: String::new(),
            author: String::new(),
        }
    }
}

/// A stored credential as seen across the plugin boundary.
///
/// The registry hands these to auth loaders through the credential
/// accessor. `kind` is the stored credential type ("api", "oauth", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCredential {
    /// Credential type discriminator
    pub kind: String,
    /// Raw key material, when the credential carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Best-known provider state at the time an auth loader runs.
///
/// This is a snapshot, not a live view: mutating it has no effect on the
/// registry. Loaders return options to merge instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    /// Provider id (e.g. "github-copilot")
    pub id: String,
    /// Display name
    pub name: String,
    /// Declared credential environment variable names
    pub env: Vec<String>,
    /// Adapter construction options accumulated so far
    pub options: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_serializes_round_trip() {
        let manifest = PluginManifest {
            name: "copilot".to_string(),
            description: "token exchange".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: PluginManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "copilot");
        assert_eq!(parsed.api_version, crate::API_VERSION);
    }

    #[test]
    fn credential_omits_missing_key() {
        let cred = PluginCredential {
            kind: "oauth".to_string(),
            key: None,
        };
        let json = serde_json::to_string(&cred).unwrap();
        assert!(!json.contains("key"));
    }

    #[test]
    fn snapshot_default_is_empty() {
        let snapshot = ProviderSnapshot::default();
        assert!(snapshot.id.is_empty());
        assert!(snapshot.env.is_empty());
        assert!(snapshot.options.is_empty());
    }
}
