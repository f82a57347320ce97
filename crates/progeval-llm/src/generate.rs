//! LLM-backed implementation of the program-generation seam.

use async_trait::async_trait;
use serde_json::Value;

use progeval_core::generator::{
    generation_prompt, improvement_prompt, orchestration_prompt, GenerateRequest,
    GeneratedProgram, ImproveRequest, ProgramGenerator, DEFAULT_MODEL,
};
use progeval_core::HarnessError;
use tracing::debug;

use crate::client::{ChatRequest, ChatResponse};
use crate::dispatch::ProviderRegistry;
use crate::error::LlmError;

const GENERATION_SYSTEM: &str =
    "You write complete, runnable programs. Respond with a JSON object of the form \
     {\"code\": \"<full source code>\"} and nothing else.";

const ORCHESTRATION_SYSTEM: &str =
    "You translate queries into structured JSON. Respond with a JSON object of the form \
     {\"input_json\": {...}} and nothing else.";

/// Generates, improves, and orchestrates programs through a routed LLM.
pub struct LlmProgramGenerator {
    registry: ProviderRegistry,
    model_id: String,
}

impl LlmProgramGenerator {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_registry(ProviderRegistry::new(), model_id)
    }

    pub fn with_registry(registry: ProviderRegistry, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let model_id = if model_id.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            model_id
        };
        Self { registry, model_id }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, system: &str, prompt: String) -> Result<ChatResponse, LlmError> {
        let dispatch = self.registry.dispatch(&self.model_id)?;
        debug!(provider = dispatch.provider_id, model = %dispatch.model, "llm call");
        let mut request = ChatRequest::new(dispatch.model.clone(), prompt);
        request.system = Some(system.to_string());
        dispatch.client.complete(&request).await
    }

    /// Pull program source out of a response: the `code` field of a JSON
    /// payload, a fenced block, or the raw text as a last resort.
    fn extract_code(response: &ChatResponse) -> String {
        if let Ok(payload) = response.json_payload() {
            if let Some(code) = payload.get("code").and_then(Value::as_str) {
                return code.to_string();
            }
        }
        if let Some(fenced) = crate::client::extract_fenced(&response.text) {
            return fenced.to_string();
        }
        response.text.trim().to_string()
    }
}

#[async_trait]
impl ProgramGenerator for LlmProgramGenerator {
    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> progeval_core::Result<GeneratedProgram> {
        let response = self
            .complete(GENERATION_SYSTEM, generation_prompt(request))
            .await
            .map_err(HarnessError::from)?;
        let code = Self::extract_code(&response);
        if code.is_empty() {
            return Err(HarnessError::Generation(
                "model returned no program code".to_string(),
            ));
        }
        Ok(GeneratedProgram { code })
    }

    async fn improve(&self, request: &ImproveRequest) -> progeval_core::Result<GeneratedProgram> {
        let response = self
            .complete(GENERATION_SYSTEM, improvement_prompt(request))
            .await
            .map_err(HarnessError::from)?;
        let code = Self::extract_code(&response);
        if code.is_empty() {
            return Err(HarnessError::Generation(
                "model returned no improved code".to_string(),
            ));
        }
        Ok(GeneratedProgram { code })
    }

    async fn orchestrate(
        &self,
        query_text: &str,
        input_schema: &Value,
    ) -> progeval_core::Result<Value> {
        let response = self
            .complete(
                ORCHESTRATION_SYSTEM,
                orchestration_prompt(query_text, input_schema),
            )
            .await
            .map_err(HarnessError::from)?;
        let payload = response.json_payload().map_err(HarnessError::from)?;
        // Accept either the wrapped form or a bare input object.
        Ok(payload
            .get("input_json")
            .cloned()
            .unwrap_or(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_prefers_json_field() {
        let response = ChatResponse {
            text: r#"{"code": "print('generated')"}"#.to_string(),
        };
        assert_eq!(LlmProgramGenerator::extract_code(&response), "print('generated')");
    }

    #[test]
    fn test_extract_code_falls_back_to_fence() {
        let response = ChatResponse {
            text: "```python\nprint('fenced')\n```".to_string(),
        };
        assert_eq!(LlmProgramGenerator::extract_code(&response), "print('fenced')");
    }

    #[test]
    fn test_empty_model_id_uses_default() {
        let generator = LlmProgramGenerator::new("");
        assert_eq!(generator.model_id(), DEFAULT_MODEL);
    }
}
