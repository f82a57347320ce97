//! Error types for routing and provider clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// No routing scope matched the model id. The message carries the
    /// supported prefixes so callers know how to extend the table.
    #[error(
        "no provider route for model id '{model_id}'; auto-routing covers Anthropic Bedrock \
         prefixes (e.g. 'bedrock/anthropic.', 'bedrock/us.anthropic.') and Anthropic \
         foundation-model ARNs; add routing scopes for other models"
    )]
    NoRoute { model_id: String },

    /// The routed provider was excluded at build time.
    #[error("provider '{provider}' is not compiled in; enable the '{feature}' cargo feature")]
    ProviderNotCompiled { provider: String, feature: String },

    /// A routing scope named a provider this registry has no client for.
    #[error("unknown provider '{provider}' from routing table; no client implements it")]
    UnknownProvider { provider: String },

    #[error("missing API key: set the {env} environment variable")]
    MissingApiKey { env: String },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

impl From<LlmError> for progeval_core::HarnessError {
    fn from(error: LlmError) -> Self {
        progeval_core::HarnessError::Generation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_route_names_supported_prefixes() {
        let err = LlmError::NoRoute {
            model_id: "bedrock/mistral.large".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("bedrock/mistral.large"));
        assert!(message.contains("bedrock/anthropic."));
    }

    #[test]
    fn test_provider_not_compiled_names_feature() {
        let err = LlmError::ProviderNotCompiled {
            provider: "anthropic".to_string(),
            feature: "anthropic".to_string(),
        };
        assert!(err.to_string().contains("cargo feature"));
    }
}
