//! Provider chat clients.
//!
//! Each provider is a thin HTTP client over its chat endpoint. Clients are
//! feature-gated so a build can exclude providers it will never call; the
//! dispatcher reports a named error when a route lands on an excluded one.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LlmError, Result};

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Provider-native model name (namespaces already stripped).
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: 8192,
        }
    }
}

/// Text returned by a provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
}

impl ChatResponse {
    /// Parse the response as JSON, tolerating a fenced code block around
    /// the payload.
    pub fn json_payload(&self) -> Result<Value> {
        let candidate = extract_fenced(&self.text).unwrap_or_else(|| self.text.trim());
        serde_json::from_str(candidate)
            .map_err(|e| LlmError::MalformedResponse(format!("expected JSON payload: {e}")))
    }
}

/// Return the body of the first fenced code block, if any.
pub(crate) fn extract_fenced(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let after_open = trimmed.strip_prefix("```")?;
    // Skip an optional language tag on the fence line.
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    };
    let close = body.rfind("```")?;
    Some(body[..close].trim())
}

/// Minimal chat interface every provider client implements.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Generation calls can run long, but never unbounded.
#[cfg(any(feature = "anthropic", feature = "openai"))]
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

#[cfg(any(feature = "anthropic", feature = "openai"))]
fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

#[cfg(any(feature = "anthropic", feature = "openai"))]
fn api_key_from_env(env: &str) -> Result<String> {
    std::env::var(env)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| LlmError::MissingApiKey {
            env: env.to_string(),
        })
}

// ---- Anthropic ----

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicClient;

#[cfg(feature = "anthropic")]
mod anthropic {
    use super::*;
    use tracing::debug;

    const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
    const API_VERSION: &str = "2023-06-01";
    pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

    /// Client for the Anthropic Messages API.
    pub struct AnthropicClient {
        http: reqwest::Client,
        api_key: String,
        base_url: String,
    }

    impl AnthropicClient {
        pub fn new(api_key: impl Into<String>) -> Self {
            Self {
                http: http_client(),
                api_key: api_key.into(),
                base_url: DEFAULT_BASE_URL.to_string(),
            }
        }

        pub fn from_env() -> Result<Self> {
            Ok(Self::new(api_key_from_env(API_KEY_ENV)?))
        }

        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }
    }

    #[async_trait]
    impl ChatClient for AnthropicClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
            let mut body = serde_json::json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "messages": [{"role": "user", "content": request.prompt}],
            });
            if let Some(system) = &request.system {
                body["system"] = Value::String(system.clone());
            }

            debug!(model = %request.model, "anthropic messages request");
            let response = self
                .http
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let payload: Value = response.json().await?;
            let text = payload
                .get("content")
                .and_then(Value::as_array)
                .and_then(|blocks| {
                    blocks
                        .iter()
                        .find_map(|b| b.get("text").and_then(Value::as_str))
                })
                .ok_or_else(|| {
                    LlmError::MalformedResponse("no text block in messages response".to_string())
                })?;
            Ok(ChatResponse {
                text: text.to_string(),
            })
        }
    }
}

// ---- OpenAI-compatible ----

#[cfg(feature = "openai")]
pub use openai::OpenAiCompatClient;

#[cfg(feature = "openai")]
mod openai {
    use super::*;
    use tracing::debug;

    const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

    /// Client for OpenAI's chat completions API and servers compatible
    /// with it.
    pub struct OpenAiCompatClient {
        http: reqwest::Client,
        api_key: String,
        base_url: String,
    }

    impl OpenAiCompatClient {
        pub fn new(api_key: impl Into<String>) -> Self {
            Self {
                http: http_client(),
                api_key: api_key.into(),
                base_url: DEFAULT_BASE_URL.to_string(),
            }
        }

        pub fn from_env() -> Result<Self> {
            Ok(Self::new(api_key_from_env(API_KEY_ENV)?))
        }

        /// Point the client at a compatible server. The key may be empty
        /// for servers that skip authentication.
        pub fn compatible(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
            Self {
                http: http_client(),
                api_key: api_key.into(),
                base_url: base_url.into(),
            }
        }
    }

    #[async_trait]
    impl ChatClient for OpenAiCompatClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
            let mut messages = Vec::new();
            if let Some(system) = &request.system {
                messages.push(serde_json::json!({"role": "system", "content": system}));
            }
            messages.push(serde_json::json!({"role": "user", "content": request.prompt}));
            let body = serde_json::json!({
                "model": request.model,
                "max_tokens": request.max_tokens,
                "messages": messages,
            });

            debug!(model = %request.model, "chat completions request");
            let mut call = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .json(&body);
            if !self.api_key.is_empty() {
                call = call.bearer_auth(&self.api_key);
            }
            let response = call.send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            let payload: Value = response.json().await?;
            let text = payload
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    LlmError::MalformedResponse("no message content in completion".to_string())
                })?;
            Ok(ChatResponse {
                text: text.to_string(),
            })
        }
    }
}
