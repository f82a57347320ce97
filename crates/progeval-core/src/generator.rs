//! Program-generation seam.
//!
//! Pipelines depend on the [`ProgramGenerator`] trait rather than a concrete
//! LLM backend, so workflows can be driven end-to-end in tests with canned
//! generators. Prompt assembly lives here too; backends send the prompts
//! verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Result;

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-5";

/// Source code produced by a generation or improvement call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProgram {
    /// Complete source code of the program.
    pub code: String,
}

/// Inputs for the initial program generation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions describing the program conventions to follow.
    pub skill_instructions: String,
    /// The sample's bootstrap prompt.
    pub bootstrap_prompt: String,
    /// Whether the sample targets a tool-using agent program. Agent and
    /// single-extraction programs get different requirement lists.
    pub is_agent: bool,
}

/// Inputs for a feedback-driven improvement pass.
#[derive(Debug, Clone)]
pub struct ImproveRequest {
    /// Code of the program being improved.
    pub original_code: String,
    /// Annotated examples rendered by the training-set builder.
    pub training_examples: String,
    /// The original bootstrap prompt, for context.
    pub bootstrap_prompt: String,
}

/// Produces and refines programs, and translates queries into structured
/// program input.
#[async_trait]
pub trait ProgramGenerator: Send + Sync {
    /// Generate a fresh program from the bootstrap prompt.
    async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedProgram>;

    /// Produce an improved program from annotated feedback.
    async fn improve(&self, request: &ImproveRequest) -> Result<GeneratedProgram>;

    /// Translate a natural-language query into JSON matching the given
    /// input schema.
    async fn orchestrate(&self, query_text: &str, input_schema: &Value) -> Result<Value>;
}

// ---- Prompt assembly ----

const AGENT_REQUIREMENTS: &str = r#"1. Declare its own dependencies inline
2. Define a typed input model with a `query` field and an output model with `response` and `tool_calls` fields
3. Expose its capabilities as tools and drive them from an agentic loop until the model stops calling them
4. Support --help, --schema, and --input CLI flags
5. Print its output as JSON on stdout
6. Follow the tool-based agent patterns from the skill instructions"#;

const EXTRACTION_REQUIREMENTS: &str = r#"1. Declare its own dependencies inline
2. Define a typed input model with a `prompt` field carrying the user's natural language
3. Define a typed output model with structured fields for the extracted result
4. Extract the output from the natural-language input in a single model call
5. Support --help, --schema, and --input CLI flags
6. Print its output as JSON on stdout
7. Never expect pre-structured data as input; the prompt field is always natural language
8. Follow all robustness patterns from the skill instructions"#;

pub fn generation_prompt(request: &GenerateRequest) -> String {
    let kind = if request.is_agent {
        "TOOL-BASED AGENT "
    } else {
        ""
    };
    let requirements = if request.is_agent {
        AGENT_REQUIREMENTS
    } else {
        EXTRACTION_REQUIREMENTS
    };
    format!(
        r#"You are an LLM program generator. Follow the skill instructions exactly.

<skill_instructions>
{}
</skill_instructions>

Create a complete, self-contained {}program for the following request:

<request>
{}
</request>

Return the full source code. The program must:
{}"#,
        request.skill_instructions, kind, request.bootstrap_prompt, requirements
    )
}

pub fn improvement_prompt(request: &ImproveRequest) -> String {
    format!(
        r#"You are improving a program based on human feedback.

Here is the original bootstrap request that created this program:

<bootstrap_request>
{}
</bootstrap_request>

Here is the current program:

<current_program>
{}
</current_program>

Here are annotated results from running the program against test queries.
Each example shows: the query, the orchestrated input, the program output, whether it was acceptable, and human feedback.

<training_examples>
{}
</training_examples>

Based on this feedback, create an improved version of the program. Keep the same overall structure (inline dependencies, typed input/output models, CLI flags) but improve the prompt, models, or logic to address the feedback.

Return the complete improved source code."#,
        request.bootstrap_prompt, request.original_code, request.training_examples
    )
}

pub fn orchestration_prompt(query_text: &str, input_schema: &Value) -> String {
    let schema_text =
        serde_json::to_string_pretty(input_schema).unwrap_or_else(|_| input_schema.to_string());
    format!(
        r#"You are an orchestration layer that translates natural language queries into structured JSON input for a program.

The program accepts input matching this JSON schema:
{schema_text}

Translate the following user query into a valid JSON object matching the schema above.
If information is missing, use reasonable defaults. If the query doesn't relate to this program's purpose, return an empty object {{}}.

User query:
{query_text}

Return only the structured input as JSON."#
    )
}
