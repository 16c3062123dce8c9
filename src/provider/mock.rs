//! A deterministic provider for tests and demos: no subprocess, no network.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::errors::ProviderError;
use crate::provider::{GenerationRequest, GenerationResult, ModelInfo, Provider, ProviderStatus};

/// Returns a fixed response (or echoes the prompt if none is configured) and
/// never touches a real backend. Used by the demo binary and by tests that
/// exercise the phase runner / orchestrator without a live model.
pub struct MockProvider {
    model_name: String,
    fixed_response: Option<String>,
    status: AtomicU8,
}

const READY: u8 = 0;
const GENERATING: u8 = 1;
const ERROR: u8 = 2;

impl MockProvider {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self { model_name: model_name.into(), fixed_response: None, status: AtomicU8::new(READY) }
    }

    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, ProviderError> {
        self.set_status(GENERATING);
        let content = self.fixed_response.clone().unwrap_or_else(|| format!("echo: {}", request.prompt));
        self.set_status(READY);
        Ok(GenerationResult {
            tokens_input: request.prompt.len() as u64 / 4,
            tokens_output: content.len() as u64 / 4,
            content,
            model_used: self.model_name.clone(),
            finish_reason: "stop".into(),
            raw_response: serde_json::json!({ "source": "mock" }),
        })
    }

    async fn generate_stream(&self, request: GenerationRequest<'_>) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let content = self.fixed_response.clone().unwrap_or_else(|| format!("echo: {}", request.prompt));
        let chunks: Vec<Result<String, ProviderError>> = content
            .split_whitespace()
            .map(|w| Ok(format!("{w} ")))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn check_health(&self) -> bool {
        true
    }

    async fn validate_config(&self) -> (bool, String) {
        (true, String::new())
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            model_id: self.model_name.clone(),
            model_name: self.model_name.clone(),
            provider: "mock".into(),
            context_length: 128_000,
            supports_tools: false,
            supports_vision: false,
            supports_streaming: true,
            cost_input_per_1k: 0.0,
            cost_output_per_1k: 0.0,
        }]
    }

    async fn close(&self) {}

    fn status(&self) -> ProviderStatus {
        match self.status.load(Ordering::SeqCst) {
            GENERATING => ProviderStatus::Generating,
            ERROR => ProviderStatus::Error,
            _ => ProviderStatus::Ready,
        }
    }
}
