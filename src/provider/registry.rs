//! Maps a [`ProviderConfig`](crate::model::ProviderConfig) to a live
//! [`Provider`] instance (spec.md §4.5 "A registry (external collaborator)
//! maps ProviderConfig → provider instance"). Grounded on
//! `original_source/src/workflow/providers/registry.py`'s `ModelRegistry
//! .create_provider` dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::model::{ProviderConfig, ProviderKind};
use crate::provider::{CliToolProvider, MockProvider, Provider};

/// Given a [`ProviderConfig`], produce the matching live provider. The core
/// only depends on this trait, never on a concrete registry, so tests can
/// substitute an all-mock implementation.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError>;

    /// `(ok, message)`: validates a provider kind can actually be reached,
    /// mirroring `registry.py`'s `validate_provider`.
    async fn validate_provider(&self, kind: ProviderKind) -> (bool, String);

    /// Probes locally-reachable backends (Ollama, LM Studio) without
    /// requiring a full `ProviderConfig` up front.
    async fn detect_local_providers(&self) -> HashMap<String, (bool, Vec<String>)>;
}

/// The engine's shipped registry: `CLI_TOOL` spawns the configured binary,
/// everything else not yet wired returns `ProviderError::Unconfigured` — the
/// remaining wire protocols (OpenAI-compatible HTTP, OpenRouter, Gemini,
/// Cloud Code Assist, local Ollama/LM Studio) are adapter concerns outside
/// this core the way the HTTP/WebSocket surface is.
pub struct DefaultProviderRegistry {
    cli_binary: String,
}

impl DefaultProviderRegistry {
    pub fn new(cli_binary: impl Into<String>) -> Self {
        Self { cli_binary: cli_binary.into() }
    }
}

impl Default for DefaultProviderRegistry {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl ProviderRegistry for DefaultProviderRegistry {
    fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        match config.kind {
            ProviderKind::CliTool => {
                let mut provider = CliToolProvider::new(self.cli_binary.clone());
                if !config.model_name.is_empty() {
                    provider = provider.with_model(config.model_name.clone());
                }
                Ok(Arc::new(provider))
            }
            ProviderKind::None => Err(ProviderError::Fatal("provider kind NONE cannot be used for generation".into())),
            other => Err(ProviderError::Unconfigured(other)),
        }
    }

    async fn validate_provider(&self, kind: ProviderKind) -> (bool, String) {
        let config = ProviderConfig::new(kind);
        match self.create_provider(&config) {
            Ok(provider) => {
                let result = provider.validate_config().await;
                provider.close().await;
                result
            }
            Err(e) => (false, e.to_string()),
        }
    }

    async fn detect_local_providers(&self) -> HashMap<String, (bool, Vec<String>)> {
        HashMap::new()
    }
}

/// Test-only registry returning the same [`MockProvider`] regardless of
/// config, so phase-runner/orchestrator tests don't depend on a CLI binary
/// being on PATH.
pub struct MockProviderRegistry;

#[async_trait]
impl ProviderRegistry for MockProviderRegistry {
    fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let model_name = if config.model_name.is_empty() { "mock-model".to_string() } else { config.model_name.clone() };
        Ok(Arc::new(MockProvider::new(model_name)))
    }

    async fn validate_provider(&self, _kind: ProviderKind) -> (bool, String) {
        (true, String::new())
    }

    async fn detect_local_providers(&self) -> HashMap<String, (bool, Vec<String>)> {
        HashMap::new()
    }
}
