//! Demo CLI: registers a three-phase template against [`MockProvider`]
//! responses and drives one execution end to end, printing every broadcast
//! event. Grounded on the teacher's `main.rs` (`clap::Parser` + `tokio::main`
//! entry point, `anyhow::Result` at the boundary).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;

use conductor::config::EngineConfig;
use conductor::errors::ProviderError;
use conductor::event_bus::{EventHandler, StoreSnapshotSource, WorkflowEvent};
use conductor::model::{
    ArtifactType, FailureBehavior, IterationBehavior, PhaseRole, ProviderConfig, ProviderKind, TriggerMode, WorkflowPhase, WorkflowTemplate,
};
use conductor::provider::{MockProvider, Provider, ProviderRegistry};
use conductor::store::InMemoryStore;
use conductor::{ApprovalCoordinator, ArtifactStore, BudgetTracker, EventBus, Orchestrator};

#[derive(Parser)]
#[command(name = "conductor-demo")]
#[command(version, about = "Drives a sample three-phase workflow against mock providers")]
struct Cli {
    /// Freeform description of the task to run through the workflow.
    #[arg(long, default_value = "add a health check endpoint")]
    task: String,

    /// Path to a project directory (used only for prompt interpolation).
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Overall execution budget in USD; omit for unlimited.
    #[arg(long)]
    budget: Option<f64>,

    /// Path to a config.toml layered over the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Always returns the same [`MockProvider`], regardless of `ProviderConfig`
/// (there is no real backend to dispatch to in this demo).
struct DemoProviderRegistry;

#[async_trait]
impl ProviderRegistry for DemoProviderRegistry {
    fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let model = if config.model_name.is_empty() { "demo-model".to_string() } else { config.model_name.clone() };
        Ok(Arc::new(MockProvider::new(model).with_fixed_response("/done\nlooks good")))
    }

    async fn validate_provider(&self, _kind: ProviderKind) -> (bool, String) {
        (true, String::new())
    }

    async fn detect_local_providers(&self) -> std::collections::HashMap<String, (bool, Vec<String>)> {
        std::collections::HashMap::new()
    }
}

/// Logs every broadcast event to stdout via `tracing`.
struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &WorkflowEvent) -> Result<()> {
        tracing::info!(?event, "workflow event");
        Ok(())
    }
}

fn demo_template() -> WorkflowTemplate {
    let provider = ProviderConfig::new(ProviderKind::CliTool).with_model("demo-model");
    WorkflowTemplate {
        id: "demo".to_string(),
        name: "demo three-phase workflow".to_string(),
        phases: vec![
            WorkflowPhase {
                id: "analyze".to_string(),
                name: "Analyze".to_string(),
                role: PhaseRole::Analyzer,
                provider_config: provider.clone(),
                prompt_template: "Analyze the following task: {task_description}".to_string(),
                output_artifact_type: ArtifactType::TaskList,
                success_pattern: String::new(),
                can_skip: false,
                can_iterate: false,
                max_retries: 1,
                timeout_seconds: 60,
                parallel_with: None,
                order: 0,
            },
            WorkflowPhase {
                id: "implement".to_string(),
                name: "Implement".to_string(),
                role: PhaseRole::Implementer,
                provider_config: provider.clone(),
                prompt_template: "Implement: {task_description}\n\nPrior analysis:\n{artifact:Analyze}".to_string(),
                output_artifact_type: ArtifactType::CodeDiff,
                success_pattern: String::new(),
                can_skip: false,
                can_iterate: false,
                max_retries: 1,
                timeout_seconds: 60,
                parallel_with: None,
                order: 1,
            },
            WorkflowPhase {
                id: "verify".to_string(),
                name: "Verify".to_string(),
                role: PhaseRole::Verifier,
                provider_config: provider,
                prompt_template: "Verify the diff below:\n{artifact:Implement}".to_string(),
                output_artifact_type: ArtifactType::VerificationReport,
                success_pattern: "/done".to_string(),
                can_skip: false,
                can_iterate: false,
                max_retries: 1,
                timeout_seconds: 60,
                parallel_with: None,
                order: 2,
            },
        ],
        max_iterations: 1,
        iteration_behavior: IterationBehavior::AutoIterate,
        failure_behavior: FailureBehavior::PauseNotify,
        budget_limit: None,
        scope_project_id: None,
        is_global: true,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::defaults(),
    };

    let store: Arc<dyn conductor::store::DocumentStore> = Arc::new(InMemoryStore::new());
    let artifacts = Arc::new(ArtifactStore::new(store.clone(), config.artifact_base_dir.clone()));
    let budget = Arc::new(BudgetTracker::with_cost_overrides(store.clone(), config.cost_overrides.clone()));
    let approvals = Arc::new(ApprovalCoordinator::new(store.clone()));
    let events = Arc::new(EventBus::new().with_snapshot_source(Arc::new(StoreSnapshotSource::new(store.clone(), approvals.clone()))));
    let registry: Arc<dyn ProviderRegistry> = Arc::new(DemoProviderRegistry);

    let orchestrator = Orchestrator::new(store, artifacts, budget, approvals, events.clone(), registry);
    orchestrator.register_template(demo_template())?;

    let execution = orchestrator
        .create_execution(
            Some("demo"),
            TriggerMode::ManualTask,
            None,
            cli.project_dir.to_string_lossy(),
            cli.task,
            cli.budget,
            false,
        )
        .await?;

    events.subscribe(execution.id.clone(), Arc::new(LoggingHandler)).await;

    let finished = orchestrator.run(&execution.id).await?;
    println!(
        "execution {} finished with status {:?} (cost ${:.4}, {} artifacts)",
        finished.id,
        finished.status,
        finished.total_cost_usd,
        finished.artifact_ids.len()
    );

    Ok(())
}
