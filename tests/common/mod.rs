//! Shared fixtures for the integration tests in this directory. Each
//! `tests/*.rs` file is compiled as its own crate, so this module re-derives
//! a small provider registry in the same spirit as `MockProviderRegistry`
//! (unreachable here: it's `#[cfg(test)] pub(crate)` inside the library
//! crate) but keyed by model name so one execution can drive distinct
//! responses through distinct phases.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use conductor::errors::ProviderError;
use conductor::model::{
    ArtifactType, FailureBehavior, IterationBehavior, PhaseRole, ProviderConfig, ProviderKind, WorkflowPhase, WorkflowTemplate,
};
use conductor::event_bus::StoreSnapshotSource;
use conductor::provider::{MockProvider, Provider, ProviderRegistry};
use conductor::store::{DocumentStore, InMemoryStore};
use conductor::{ApprovalCoordinator, ArtifactStore, BudgetTracker, EventBus, Orchestrator};

/// Maps `ProviderConfig::model_name` to a fixed response; models with no
/// entry echo their prompt back, matching [`MockProvider`]'s own default.
#[derive(Default)]
pub struct ScenarioRegistry {
    responses: HashMap<String, String>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, model: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(model.into(), response.into());
        self
    }
}

#[async_trait]
impl ProviderRegistry for ScenarioRegistry {
    fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let model = if config.model_name.is_empty() { "mock-model".to_string() } else { config.model_name.clone() };
        let provider = match self.responses.get(&model) {
            Some(response) => MockProvider::new(model).with_fixed_response(response.clone()),
            None => MockProvider::new(model),
        };
        Ok(Arc::new(provider))
    }

    async fn validate_provider(&self, _kind: ProviderKind) -> (bool, String) {
        (true, String::new())
    }

    async fn detect_local_providers(&self) -> HashMap<String, (bool, Vec<String>)> {
        HashMap::new()
    }
}

/// One wired-up engine plus the collaborators tests need direct access to
/// (the orchestrator itself only exposes `event_bus()`/`approvals()`).
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn DocumentStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub budget: Arc<BudgetTracker>,
    pub approvals: Arc<ApprovalCoordinator>,
    pub events: Arc<EventBus>,
    _tmp: tempfile::TempDir,
}

pub fn harness(registry: ScenarioRegistry) -> Harness {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let tmp = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(ArtifactStore::new(store.clone(), tmp.path()));
    let budget = Arc::new(BudgetTracker::new(store.clone()));
    let approvals = Arc::new(ApprovalCoordinator::new(store.clone()));
    let events = Arc::new(EventBus::new().with_snapshot_source(Arc::new(StoreSnapshotSource::new(store.clone(), approvals.clone()))));
    let registry: Arc<dyn ProviderRegistry> = Arc::new(registry);
    let orchestrator = Orchestrator::new(store.clone(), artifacts.clone(), budget.clone(), approvals.clone(), events.clone(), registry);
    Harness { orchestrator, store, artifacts, budget, approvals, events, _tmp: tmp }
}

pub fn provider(model: &str) -> ProviderConfig {
    ProviderConfig::new(ProviderKind::CliTool).with_model(model)
}

#[allow(clippy::too_many_arguments)]
pub fn phase(
    id: &str,
    order: i64,
    role: PhaseRole,
    model: &str,
    prompt_template: &str,
    output_artifact_type: ArtifactType,
    success_pattern: &str,
    parallel_with: Option<&str>,
) -> WorkflowPhase {
    WorkflowPhase {
        id: id.to_string(),
        name: id.to_string(),
        role,
        provider_config: provider(model),
        prompt_template: prompt_template.to_string(),
        output_artifact_type,
        success_pattern: success_pattern.to_string(),
        can_skip: false,
        can_iterate: false,
        max_retries: 1,
        timeout_seconds: 30,
        parallel_with: parallel_with.map(|s| s.to_string()),
        order,
    }
}

pub fn template(id: &str, phases: Vec<WorkflowPhase>, failure_behavior: FailureBehavior) -> WorkflowTemplate {
    WorkflowTemplate {
        id: id.to_string(),
        name: format!("template-{id}"),
        phases,
        max_iterations: 1,
        iteration_behavior: IterationBehavior::AutoIterate,
        failure_behavior,
        budget_limit: None,
        scope_project_id: None,
        is_global: true,
    }
}
