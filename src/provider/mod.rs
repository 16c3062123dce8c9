//! Provider Abstraction (spec.md §4.5): the wire format each LLM/agent
//! backend speaks is opaque to the core; every provider implements the same
//! contract. Grounded on `original_source/src/workflow/providers/` (the
//! `WorkflowLLMProvider` base class referenced by `claude_code.py` and
//! `sdk_provider.py`) and the teacher's `factory::agent_executor::TaskRunner`
//! trait-plus-test-double pattern.

mod cli_tool;
mod mock;
mod registry;

pub use cli_tool::CliToolProvider;
pub use mock::MockProvider;
pub use registry::{DefaultProviderRegistry, ProviderRegistry};
#[cfg(test)]
pub(crate) use registry::MockProviderRegistry;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Output of one `generate` call (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub model_used: String,
    pub finish_reason: String,
    pub raw_response: serde_json::Value,
}

/// One entry of `list_models` (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub model_name: String,
    pub provider: String,
    pub context_length: u32,
    pub supports_tools: bool,
    pub supports_vision: bool,
    pub supports_streaming: bool,
    pub cost_input_per_1k: f64,
    pub cost_output_per_1k: f64,
}

/// Per-instance lifecycle (spec.md §4.5 "Status lifecycle"). ERROR does not
/// preclude subsequent calls: implementations recover on the next `generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Ready,
    Generating,
    Error,
}

/// Arguments shared by `generate` and `generate_stream` (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// A backend capable of generating text for a phase (spec.md §4.5). The
/// phase runner only ever sees this trait; `fallback_provider` on
/// [`crate::model::ProviderConfig`] is consulted by the orchestrator, never
/// by the provider itself.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, ProviderError>;

    /// Finite, non-restartable stream of text chunks.
    async fn generate_stream(&self, request: GenerationRequest<'_>) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError>;

    async fn check_health(&self) -> bool;

    /// `(ok, message)` — message explains why when `ok` is false.
    async fn validate_config(&self) -> (bool, String);

    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Idempotent: safe to call more than once, including on a provider that
    /// never opened a connection.
    async fn close(&self);

    fn status(&self) -> ProviderStatus;
}
