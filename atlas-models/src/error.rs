//! Error types for the provider/model registry.

use thiserror::Error;

use crate::adapters::AdapterError;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used to preserve an original failure cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Adapter construction failed for a provider. The original failure is
    /// preserved as the source; callers only see this wrapper.
    #[error("failed to initialize provider '{provider}'")]
    ProviderInit {
        provider: String,
        #[source]
        source: BoxError,
    },

    /// Provider or model lookup failed. `suggestions` carries up to three
    /// fuzzy-matched candidates when any are derivable.
    #[error("model not found: {provider}/{model}")]
    ModelNotFound {
        provider: String,
        model: String,
        suggestions: Vec<String>,
    },

    /// No provider or model is available to act as the default.
    #[error("no default model available")]
    NoDefaultModel,

    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to access the system keyring.
    #[error("keyring error: {0}")]
    Keyring(String),

    /// Failure surfaced by a constructed adapter.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an adapter-construction failure with its provider id.
    pub(crate) fn provider_init(provider: &str, source: impl Into<BoxError>) -> Self {
        Self::ProviderInit {
            provider: provider.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn model_not_found(
        provider: &str,
        model: &str,
        suggestions: Vec<String>,
    ) -> Self {
        Self::ModelNotFound {
            provider: provider.to_string(),
            model: model.to_string(),
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = Error::model_not_found("openai", "gpt-6", vec!["gpt-5".to_string()]);
        assert_eq!(err.to_string(), "model not found: openai/gpt-6");
    }

    #[test]
    fn provider_init_preserves_source() {
        let err = Error::provider_init("acme", std::io::Error::other("socket closed"));
        assert_eq!(err.to_string(), "failed to initialize provider 'acme'");
        let source = std::error::Error::source(&err).expect("source preserved");
        assert!(source.to_string().contains("socket closed"));
    }

    #[test]
    fn suggestions_are_accessible_by_match() {
        let err = Error::model_not_found("openai", "gpt-6", vec!["gpt-5".to_string()]);
        match err {
            Error::ModelNotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["gpt-5".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
