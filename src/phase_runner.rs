//! Phase Runner (spec.md §4.2): prepares and executes one phase attempt
//! given the artifacts published so far. Grounded on the teacher's
//! `factory::agent_executor::AgentExecutor` (prompt building, provider
//! invocation, output classification) and `original_source/src/workflow/
//! phase_runner.py` (budget-then-generate-then-classify order and the
//! `success_pattern` regex check).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;

use crate::budget::BudgetTracker;
use crate::errors::{PhaseError, ProviderError};
use crate::event_bus::{EventBus, WorkflowEvent};
use crate::model::{Artifact, BudgetScope, PhaseExecution, PhaseStatus, ProviderConfig, WorkflowExecution, WorkflowPhase};
use crate::provider::{GenerationRequest, GenerationResult, Provider, ProviderRegistry};
use crate::artifact_store::ArtifactStore;

/// Runs one `(phase, iteration)` attempt. Owns a provider cache scoped to a
/// single execution — callers create one `PhaseRunner` per execution and
/// call [`PhaseRunner::cleanup`] on exit (spec.md §4.2 "Caching providers").
pub struct PhaseRunner {
    registry: Arc<dyn ProviderRegistry>,
    budget: Arc<BudgetTracker>,
    artifacts: Arc<ArtifactStore>,
    events: Arc<EventBus>,
    providers: DashMap<String, Arc<dyn Provider>>,
}

impl PhaseRunner {
    pub fn new(
        registry: Arc<dyn ProviderRegistry>,
        budget: Arc<BudgetTracker>,
        artifacts: Arc<ArtifactStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self { registry, budget, artifacts, events, providers: DashMap::new() }
    }

    fn provider_for(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, PhaseError> {
        let key = config.cache_key();
        if let Some(provider) = self.providers.get(&key) {
            return Ok(provider.clone());
        }
        let provider = self.registry.create_provider(config)?;
        self.providers.insert(key, provider.clone());
        Ok(provider)
    }

    /// Substitutes `{task_description}`, `{project_path}`, and every
    /// `{artifact:NAME}` occurrence (spec.md §4.2 "Prompt assembly"). Unknown
    /// `{...}` tokens are left untouched (spec.md §6 "Placeholder format").
    fn assemble_prompt(phase: &WorkflowPhase, execution: &WorkflowExecution, artifacts: &[Artifact]) -> String {
        let prompt = phase
            .prompt_template
            .replace("{task_description}", &execution.task_description)
            .replace("{project_path}", &execution.project_path);

        let artifact_token = Regex::new(r"\{artifact:([^}]+)\}").expect("static pattern");
        artifact_token
            .replace_all(&prompt, |caps: &regex::Captures| {
                let name = &caps[1];
                Self::find_artifact_content(artifacts, name)
                    .unwrap_or_else(|| format!("[Artifact '{name}' not found]"))
            })
            .into_owned()
    }

    fn find_artifact_content(artifacts: &[Artifact], name: &str) -> Option<String> {
        let needle = name.to_lowercase();
        artifacts.iter().find(|a| a.name.to_lowercase().contains(&needle)).map(|a| a.content.clone())
    }

    /// Spec.md §4.2 "Classify success": leading `/` is a literal
    /// case-insensitive substring; otherwise a case-insensitive regex, with a
    /// compile failure falling back to substring; an empty pattern always
    /// succeeds.
    fn classify_success(pattern: &str, output: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        if let Some(needle) = pattern.strip_prefix('/') {
            return output.to_lowercase().contains(&needle.to_lowercase());
        }
        match Regex::new(&format!("(?i){pattern}")) {
            Ok(re) => re.is_match(output),
            Err(_) => output.to_lowercase().contains(&pattern.to_lowercase()),
        }
    }

    fn fail(mut phase_execution: PhaseExecution, message: impl Into<String>) -> PhaseExecution {
        phase_execution.status = PhaseStatus::Failed;
        phase_execution.error_message = Some(message.into());
        phase_execution.completed_at = Some(chrono::Utc::now());
        phase_execution
    }

    /// Debits the cost of one generation across all three budget scopes,
    /// then classifies success and publishes an artifact if the output
    /// matched. A post-debit budget breach does *not* fail the phase here:
    /// spec.md §8 scenario 4 requires the artifact to survive even when the
    /// execution as a whole is about to transition to BUDGET_EXCEEDED, so
    /// that decision is left to the caller (the orchestrator checks budget
    /// state again once this returns).
    async fn debit_and_classify(
        &self,
        execution: &WorkflowExecution,
        phase: &WorkflowPhase,
        mut phase_execution: PhaseExecution,
        generation: GenerationResult,
    ) -> Result<PhaseExecution, PhaseError> {
        phase_execution.tokens_input = generation.tokens_input;
        phase_execution.tokens_output = generation.tokens_output;

        let usage = self
            .budget
            .record_execution_usage(
                execution.id.as_str(),
                execution.project_id.as_deref(),
                &generation.model_used,
                generation.tokens_input,
                generation.tokens_output,
            )
            .await?;
        phase_execution.cost_usd = usage.cost_usd;

        if Self::classify_success(&phase.success_pattern, &generation.content) {
            let artifact = self
                .artifacts
                .create(
                    execution.id.clone(),
                    phase_execution.id.clone(),
                    phase.output_artifact_type,
                    format!("{}_output", phase.name),
                    generation.content,
                    serde_json::Value::Null,
                )
                .await?;
            phase_execution.output_artifact_id = Some(artifact.id);
            phase_execution.status = PhaseStatus::Completed;
            phase_execution.completed_at = Some(chrono::Utc::now());
            Ok(phase_execution)
        } else {
            Ok(Self::fail(phase_execution, "Success pattern not found in output"))
        }
    }

    /// Runs a phase to completion with a single buffered `generate` call
    /// (spec.md §4.2 "Execution" steps 1-5). Transient provider errors are
    /// retried in place, up to `phase.max_retries`, with `0.5s × 2^k`
    /// backoff capped at 10s (spec.md §4.1 "Failure semantics") — the retry
    /// loop lives here so a retry never produces a second `PhaseExecution`
    /// record.
    pub async fn run_phase(
        &self,
        execution: &WorkflowExecution,
        phase: &WorkflowPhase,
        iteration: u32,
        published_artifacts: &[Artifact],
    ) -> Result<PhaseExecution, PhaseError> {
        let mut phase_execution = PhaseExecution::new_pending(
            execution.id.clone(),
            phase.id.clone(),
            iteration,
            published_artifacts.iter().map(|a| a.id.clone()).collect(),
        );
        phase_execution.status = PhaseStatus::Running;

        let (ok, _) = self.budget.check(BudgetScope::Execution, execution.id.as_str(), 0.0).await?;
        if !ok {
            return Ok(Self::fail(phase_execution, "BUDGET_EXCEEDED"));
        }

        let provider = self.provider_for(&phase.provider_config)?;
        let prompt = Self::assemble_prompt(phase, execution, published_artifacts);

        let mut attempt: u32 = 0;
        let generation: Result<GenerationResult, String> = loop {
            let request = GenerationRequest {
                prompt: &prompt,
                system_prompt: None,
                temperature: Some(phase.provider_config.temperature),
                max_tokens: None,
            };
            let deadline = Duration::from_secs(phase.timeout_seconds.max(1));
            match tokio::time::timeout(deadline, provider.generate(request)).await {
                Ok(Ok(result)) => break Ok(result),
                Ok(Err(ProviderError::Transient(_))) if attempt < phase.max_retries => {
                    attempt += 1;
                    let backoff_secs = (0.5 * 2f64.powi(attempt as i32 - 1)).min(10.0);
                    tokio::time::sleep(Duration::from_secs_f64(backoff_secs)).await;
                }
                Ok(Err(e)) => break Err(e.to_string()),
                Err(_) => break Err(format!("phase {} timed out after {}s", phase.id, phase.timeout_seconds)),
            }
        };

        let generation = match generation {
            Ok(g) => g,
            Err(msg) => return Ok(Self::fail(phase_execution, msg)),
        };

        self.debit_and_classify(execution, phase, phase_execution, generation).await
    }

    /// Identical to [`PhaseRunner::run_phase`], but forwards each chunk to
    /// the event bus as it arrives and only publishes the artifact once the
    /// stream completes (spec.md §4.2 step 6). Streamed output carries no
    /// per-chunk token accounting, so this path debits budget using the
    /// accumulated content's length as a proxy token count — see DESIGN.md.
    pub async fn run_phase_streaming(
        &self,
        execution: &WorkflowExecution,
        phase: &WorkflowPhase,
        iteration: u32,
        published_artifacts: &[Artifact],
    ) -> Result<PhaseExecution, PhaseError> {
        let mut phase_execution = PhaseExecution::new_pending(
            execution.id.clone(),
            phase.id.clone(),
            iteration,
            published_artifacts.iter().map(|a| a.id.clone()).collect(),
        );
        phase_execution.status = PhaseStatus::Running;

        let (ok, _) = self.budget.check(BudgetScope::Execution, execution.id.as_str(), 0.0).await?;
        if !ok {
            return Ok(Self::fail(phase_execution, "BUDGET_EXCEEDED"));
        }

        let provider = self.provider_for(&phase.provider_config)?;
        let prompt = Self::assemble_prompt(phase, execution, published_artifacts);
        let request = GenerationRequest {
            prompt: &prompt,
            system_prompt: None,
            temperature: Some(phase.provider_config.temperature),
            max_tokens: None,
        };

        let mut stream = match provider.generate_stream(request).await {
            Ok(s) => s,
            Err(e) => return Ok(Self::fail(phase_execution, e.to_string())),
        };

        use futures::StreamExt;
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(text) => {
                    self.events
                        .broadcast(
                            &execution.id,
                            WorkflowEvent::PhaseOutput { phase_id: phase.id.clone(), content_chunk: text.clone() },
                        )
                        .await;
                    content.push_str(&text);
                }
                Err(e) => return Ok(Self::fail(phase_execution, e.to_string())),
            }
        }

        let approx_tokens = content.len() as u64 / 4;
        let generation = GenerationResult {
            content,
            tokens_input: 0,
            tokens_output: approx_tokens,
            model_used: phase.provider_config.model_name.clone(),
            finish_reason: "stop".into(),
            raw_response: serde_json::Value::Null,
        };

        self.debit_and_classify(execution, phase, phase_execution, generation).await
    }

    /// Closes every cached provider (spec.md §4.2 "cache is torn down on
    /// execution exit").
    pub async fn cleanup(&self) {
        for entry in self.providers.iter() {
            entry.value().close().await;
        }
        self.providers.clear();
    }
}
