//! Progeval LLM Library
//!
//! Model-id routing, provider chat clients, and the LLM-backed
//! [`ProgramGenerator`](progeval_core::ProgramGenerator) implementation.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod generate;
pub mod router;

pub use client::{ChatClient, ChatRequest, ChatResponse};
pub use dispatch::{Dispatch, ProviderRegistry, FALLBACK_BASE_URL_ENV};
pub use error::{LlmError, Result};
pub use generate::LlmProgramGenerator;
pub use router::{
    bedrock_model_name, is_anthropic_arn, RoutingTable, PROVIDER_ANTHROPIC, PROVIDER_OPENAI,
};

#[cfg(feature = "anthropic")]
pub use client::AnthropicClient;

#[cfg(feature = "openai")]
pub use client::OpenAiCompatClient;
