//! Provider dispatch over namespaced model ids.
//!
//! Top-level namespaces (`anthropic/`, `openai/`) dispatch directly;
//! `bedrock/` ids go through the routing table. Clients are built on first
//! use and cached per provider id for the registry's lifetime. When no
//! route matches and a fallback base URL is configured, the id is sent to
//! an OpenAI-compatible server as-is.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::client::ChatClient;
use crate::error::{LlmError, Result};
use crate::router::{bedrock_model_name, RoutingTable, PROVIDER_ANTHROPIC, PROVIDER_OPENAI};

/// Environment variable naming an OpenAI-compatible server for model ids
/// no scope covers.
pub const FALLBACK_BASE_URL_ENV: &str = "PROGEVAL_FALLBACK_BASE_URL";

const PROVIDER_FALLBACK: &str = "fallback";

/// A resolved dispatch: the client to call and the provider-native model
/// name to call it with.
pub struct Dispatch {
    pub client: Arc<dyn ChatClient>,
    pub model: String,
    pub provider_id: &'static str,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("model", &self.model)
            .field("provider_id", &self.provider_id)
            .finish_non_exhaustive()
    }
}

/// Routes model ids to lazily constructed provider clients.
pub struct ProviderRegistry {
    table: RoutingTable,
    clients: Mutex<HashMap<&'static str, Arc<dyn ChatClient>>>,
    fallback_base_url: Option<String>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_table(RoutingTable::new())
    }

    pub fn with_table(table: RoutingTable) -> Self {
        Self {
            table,
            clients: Mutex::new(HashMap::new()),
            fallback_base_url: std::env::var(FALLBACK_BASE_URL_ENV).ok(),
        }
    }

    /// Override the fallback server instead of reading the environment.
    pub fn with_fallback_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.fallback_base_url = Some(base_url.into());
        self
    }

    /// Resolve a model id to a client and provider-native model name.
    pub fn dispatch(&self, model_id: &str) -> Result<Dispatch> {
        if let Some(model) = model_id.strip_prefix("anthropic/") {
            return self.dispatch_to(PROVIDER_ANTHROPIC, model);
        }
        if let Some(model) = model_id.strip_prefix("openai/") {
            return self.dispatch_to(PROVIDER_OPENAI, model);
        }
        if model_id.starts_with("bedrock/") {
            if let Some(provider_id) = self.table.route(model_id) {
                let provider_id: &'static str = match provider_id {
                    PROVIDER_ANTHROPIC => PROVIDER_ANTHROPIC,
                    PROVIDER_OPENAI => PROVIDER_OPENAI,
                    other => {
                        return Err(LlmError::UnknownProvider {
                            provider: other.to_string(),
                        })
                    }
                };
                return self.dispatch_to(provider_id, bedrock_model_name(model_id));
            }
        }

        if self.fallback_base_url.is_some() {
            debug!(model_id = %model_id, "no route matched, using fallback server");
            return self.dispatch_to(PROVIDER_FALLBACK, model_id);
        }
        Err(LlmError::NoRoute {
            model_id: model_id.to_string(),
        })
    }

    fn dispatch_to(&self, provider_id: &'static str, model: &str) -> Result<Dispatch> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| LlmError::MalformedResponse("client cache poisoned".to_string()))?;
        if let Some(client) = clients.get(provider_id) {
            return Ok(Dispatch {
                client: Arc::clone(client),
                model: model.to_string(),
                provider_id,
            });
        }

        let client = self.build_client(provider_id)?;
        info!(provider = provider_id, "provider client initialised");
        clients.insert(provider_id, Arc::clone(&client));
        Ok(Dispatch {
            client,
            model: model.to_string(),
            provider_id,
        })
    }

    #[allow(unused_variables)]
    fn build_client(&self, provider_id: &'static str) -> Result<Arc<dyn ChatClient>> {
        match provider_id {
            PROVIDER_ANTHROPIC => {
                #[cfg(feature = "anthropic")]
                {
                    return Ok(Arc::new(crate::client::AnthropicClient::from_env()?));
                }
                #[cfg(not(feature = "anthropic"))]
                {
                    Err(LlmError::ProviderNotCompiled {
                        provider: PROVIDER_ANTHROPIC.to_string(),
                        feature: "anthropic".to_string(),
                    })
                }
            }
            PROVIDER_OPENAI => {
                #[cfg(feature = "openai")]
                {
                    return Ok(Arc::new(crate::client::OpenAiCompatClient::from_env()?));
                }
                #[cfg(not(feature = "openai"))]
                {
                    Err(LlmError::ProviderNotCompiled {
                        provider: PROVIDER_OPENAI.to_string(),
                        feature: "openai".to_string(),
                    })
                }
            }
            PROVIDER_FALLBACK => {
                #[cfg(feature = "openai")]
                {
                    let base_url = self.fallback_base_url.clone().ok_or_else(|| {
                        LlmError::MalformedResponse("fallback dispatched without base URL".to_string())
                    })?;
                    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
                    return Ok(Arc::new(crate::client::OpenAiCompatClient::compatible(
                        base_url, api_key,
                    )));
                }
                #[cfg(not(feature = "openai"))]
                {
                    Err(LlmError::ProviderNotCompiled {
                        provider: PROVIDER_FALLBACK.to_string(),
                        feature: "openai".to_string(),
                    })
                }
            }
            other => Err(LlmError::UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unroutable_id_without_fallback_is_no_route() {
        let registry = ProviderRegistry::with_table(RoutingTable::new());
        // Force no fallback regardless of the environment.
        let registry = ProviderRegistry {
            fallback_base_url: None,
            ..registry
        };
        let err = registry.dispatch("bedrock/amazon.nova-lite-v1:0").unwrap_err();
        assert!(matches!(err, LlmError::NoRoute { .. }));
    }

    #[test]
    fn test_table_provider_without_client_is_unknown_provider() {
        let table =
            RoutingTable::with_extra_scopes([("converse", &["bedrock/amazon."] as &[&str])]);
        let registry = ProviderRegistry {
            fallback_base_url: None,
            ..ProviderRegistry::with_table(table)
        };
        let err = registry.dispatch("bedrock/amazon.titan-text").unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider { .. }));
        let message = err.to_string();
        assert!(message.contains("unknown provider 'converse'"));
        assert!(!message.contains("cargo feature"));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_fallback_base_url_dispatches_unroutable_ids() {
        let registry =
            ProviderRegistry::new().with_fallback_base_url("http://localhost:8080/v1");
        let dispatch = registry
            .dispatch("bedrock/mistral.large")
            .expect("fallback dispatch");
        assert_eq!(dispatch.provider_id, "fallback");
        // Fallback forwards the id untouched.
        assert_eq!(dispatch.model, "bedrock/mistral.large");
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn test_bedrock_anthropic_model_name_is_stripped() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let registry = ProviderRegistry::new();
        let dispatch = registry
            .dispatch("bedrock/us.anthropic.claude-3-5-sonnet-20241022-v1:0")
            .expect("dispatch");
        assert_eq!(dispatch.provider_id, PROVIDER_ANTHROPIC);
        assert_eq!(dispatch.model, "us.anthropic.claude-3-5-sonnet-20241022-v1:0");
    }

    #[cfg(feature = "anthropic")]
    #[test]
    fn test_client_is_cached_after_first_dispatch() {
        std::env::set_var("ANTHROPIC_API_KEY", "test-key");
        let registry = ProviderRegistry::new();
        let first = registry
            .dispatch("anthropic/claude-sonnet-4-5")
            .expect("dispatch");
        let second = registry
            .dispatch("anthropic/claude-sonnet-4-5")
            .expect("dispatch");
        assert!(Arc::ptr_eq(&first.client, &second.client));
    }
}
