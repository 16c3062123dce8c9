use serde::{Deserialize, Serialize};

/// Closed set of provider kinds a [`ProviderConfig`] may bind to
/// (spec.md §3). Wire protocols for all but [`ProviderKind::CliTool`] are
/// out of scope for this crate (spec.md §1); the registry still accepts
/// configs naming them, it just has no generator for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    CliTool,
    SdkAgent,
    GenericOpenaiHttp,
    Openrouter,
    Openai,
    GeminiDirect,
    GeminiOauth,
    GeminiViaOpenrouter,
    CloudCodeAssist,
    LocalOllama,
    LocalLmStudio,
    None,
}

/// Immutable description of one provider binding (spec.md §3).
///
/// `fallback_provider` is recursive and the orchestrator assumes the chain
/// is finite (validated at template-load time by
/// [`WorkflowTemplate::validate`](crate::model::WorkflowTemplate::validate)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Empty string means "provider default".
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub context_length: Option<u32>,
    #[serde(default)]
    pub fallback_provider: Option<Box<ProviderConfig>>,
}

fn default_temperature() -> f64 {
    0.1
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model_name: String::new(),
            api_url: None,
            temperature: default_temperature(),
            context_length: None,
            fallback_provider: None,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_fallback(mut self, fallback: ProviderConfig) -> Self {
        self.fallback_provider = Some(Box::new(fallback));
        self
    }

    /// Key used to cache provider instances within a single execution
    /// (spec.md §4.2 "Caching providers").
    pub fn cache_key(&self) -> String {
        format!("{:?}:{}", self.kind, self.model_name)
    }

    /// Walk the fallback chain, detecting a cycle by bounding depth — the
    /// spec states the chain "has no cycles"; this is the defensive check
    /// used at template validation time.
    pub fn fallback_chain_len(&self) -> usize {
        let mut len = 0;
        let mut cur = self.fallback_provider.as_deref();
        while let Some(p) = cur {
            len += 1;
            if len > 64 {
                break;
            }
            cur = p.fallback_provider.as_deref();
        }
        len
    }
}
