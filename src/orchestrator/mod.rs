//! Orchestrator (spec.md §4.1): owns execution lifecycle, sequences phases,
//! manages iterations, and broadcasts events. Grounded on the teacher's
//! `dag::executor::DagExecutor::execute` (Semaphore + mpsc + JoinHandle
//! concurrent-group join); the per-iteration sequencing loop and
//! failure_behavior dispatch are spec.md §4.1's own algorithm, since
//! `original_source` has no orchestration module to port from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, info, warn};

use crate::approval::ApprovalCoordinator;
use crate::artifact_store::ArtifactStore;
use crate::budget::BudgetTracker;
use crate::errors::EngineError;
use crate::event_bus::{EventBus, WorkflowEvent};
use crate::model::{
    Artifact, BudgetScope, ExecutionId, FailureBehavior, IterationBehavior, PhaseExecution, PhaseStatus,
    TemplateId, TriggerMode, WorkflowExecution, WorkflowPhase, WorkflowStatus, WorkflowTemplate,
};
use crate::phase_runner::PhaseRunner;
use crate::provider::ProviderRegistry;
use crate::store::{DocumentStore, ExecutionFilter};

/// Cancellation state for one in-flight `run` (spec.md §5 "Cancellation").
/// `notify` wakes a caller blocked in `cancel`'s bounded wait once the
/// sequencing loop observes the flag and returns.
struct ExecutionHandle {
    cancel_requested: AtomicBool,
    finished: Notify,
}

impl ExecutionHandle {
    fn new() -> Self {
        Self { cancel_requested: AtomicBool::new(false), finished: Notify::new() }
    }
}

/// Outcome of running one item of the sequencing plan (a phase or a parallel
/// group) for the worst-outcome rule in §4.1 "Parallel group semantics".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum GroupOutcome {
    Completed,
    Skipped,
    Failed,
}

/// Drives templates against tasks (spec.md §4.1). One instance is shared
/// across every execution; per-execution state (provider cache, cancellation
/// flag) lives in values keyed by [`ExecutionId`].
pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    artifacts: Arc<ArtifactStore>,
    budget: Arc<BudgetTracker>,
    approvals: Arc<ApprovalCoordinator>,
    events: Arc<EventBus>,
    registry: Arc<dyn ProviderRegistry>,
    templates: DashMap<String, Arc<WorkflowTemplate>>,
    handles: DashMap<ExecutionId, Arc<ExecutionHandle>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        artifacts: Arc<ArtifactStore>,
        budget: Arc<BudgetTracker>,
        approvals: Arc<ApprovalCoordinator>,
        events: Arc<EventBus>,
        registry: Arc<dyn ProviderRegistry>,
    ) -> Self {
        Self {
            store,
            artifacts,
            budget,
            approvals,
            events,
            registry,
            templates: DashMap::new(),
            handles: DashMap::new(),
        }
    }

    /// Registers a template so it is resolvable by id, and by
    /// project/global default, from `create_execution`. Rejects templates
    /// that fail [`WorkflowTemplate::validate`] rather than letting a
    /// malformed template reach `create_execution`.
    pub fn register_template(&self, template: WorkflowTemplate) -> Result<(), EngineError> {
        template.validate().map_err(crate::errors::ConfigError::InvalidTemplate)?;
        self.templates.insert(template.id.clone(), Arc::new(template));
        Ok(())
    }

    fn find_template(&self, id: &str) -> Option<Arc<WorkflowTemplate>> {
        self.templates.get(id).map(|t| t.clone())
    }

    /// Project-default first, then a global default (spec.md §4.1
    /// `create_execution`).
    fn default_template(&self, project_id: Option<&str>) -> Option<Arc<WorkflowTemplate>> {
        if let Some(pid) = project_id {
            if let Some(t) = self.templates.iter().find(|t| t.scope_project_id.as_deref() == Some(pid)) {
                return Some(t.clone());
            }
        }
        self.templates.iter().find(|t| t.is_global).map(|t| t.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_execution(
        &self,
        template_id: Option<&str>,
        trigger: TriggerMode,
        project_id: Option<String>,
        project_path: impl Into<String>,
        task_description: impl Into<String>,
        budget_limit: Option<f64>,
        interactive_mode: bool,
    ) -> Result<WorkflowExecution, EngineError> {
        let template = match template_id {
            Some(id) => self.find_template(id).ok_or_else(|| crate::errors::ConfigError::TemplateNotFound(id.to_string()))?,
            None => self
                .default_template(project_id.as_deref())
                .ok_or(crate::errors::ConfigError::NoDefaultTemplate)?,
        };

        let execution = WorkflowExecution::new(
            TemplateId::from(template.id.clone()),
            template.name.clone(),
            project_id,
            project_path,
            task_description,
            trigger,
            budget_limit,
            interactive_mode,
        );
        self.store.put_execution(&execution).await?;
        Ok(execution)
    }

    async fn get_execution_or_fail(&self, execution_id: &ExecutionId) -> Result<WorkflowExecution, EngineError> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.clone()))
    }

    async fn save(&self, execution: &WorkflowExecution) -> Result<(), EngineError> {
        self.store.put_execution(execution).await?;
        Ok(())
    }

    async fn set_status(&self, execution: &mut WorkflowExecution, status: WorkflowStatus) -> Result<(), EngineError> {
        info!(execution_id = %execution.id, ?status, "execution status transition");
        execution.status = status;
        if status.is_terminal() {
            execution.finished_at = Some(chrono::Utc::now());
        }
        self.save(execution).await?;
        self.events.broadcast(&execution.id, WorkflowEvent::StatusUpdate { status }).await;
        Ok(())
    }

    /// Groups a template's ordered phases into sequencing items: singleton
    /// phases run serially, phases sharing a `parallel_with` anchor (either
    /// naming one another directly or both naming a common third phase) are
    /// merged into one concurrent group regardless of declaration order
    /// (spec.md §4.1 step 1).
    fn group_phases<'a>(template: &'a WorkflowTemplate) -> Vec<Vec<&'a WorkflowPhase>> {
        let ordered = template.ordered_phases();
        let mut anchor_to_group: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Vec<&WorkflowPhase>> = Vec::new();

        for phase in ordered {
            let anchor = phase.parallel_anchor().unwrap_or(phase.id.as_str());
            match anchor_to_group.get(anchor) {
                Some(&idx) => groups[idx].push(phase),
                None => {
                    let idx = groups.len();
                    groups.push(vec![phase]);
                    anchor_to_group.insert(anchor, idx);
                    anchor_to_group.insert(phase.id.as_str(), idx);
                }
            }
        }

        groups
    }

    fn is_sensitive(phase: &WorkflowPhase, iteration: u32, is_first_in_iteration: bool) -> bool {
        phase.role.is_sensitive() || (iteration > 1 && is_first_in_iteration)
    }

    /// Runs every member of a parallel group concurrently, grounded on the
    /// teacher's `DagExecutor::execute` Semaphore + mpsc + JoinHandle join
    /// loop. Returns (outcomes, published artifacts) with the group-level
    /// outcome resolved as the worst of {Failed, Skipped, Completed}.
    async fn run_group(
        &self,
        runner: &Arc<PhaseRunner>,
        execution: &WorkflowExecution,
        group: &[&WorkflowPhase],
        iteration: u32,
        published_so_far: &[Artifact],
    ) -> Result<(GroupOutcome, Vec<PhaseExecution>), EngineError> {
        debug!(execution_id = %execution.id, group_size = group.len(), "running parallel group");
        let semaphore = Arc::new(Semaphore::new(group.len().max(1)));
        let (result_tx, mut result_rx) = mpsc::channel::<PhaseExecution>(group.len().max(1));
        let mut handles = Vec::with_capacity(group.len());

        for phase in group {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let runner = runner.clone();
            let execution = execution.clone();
            let phase = (*phase).clone();
            let published = published_so_far.to_vec();
            let result_tx = result_tx.clone();
            self.events
                .broadcast(&execution.id, WorkflowEvent::PhaseStart { phase_id: phase.id.clone(), name: phase.name.clone() })
                .await;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = runner.run_phase(&execution, &phase, iteration, &published).await;
                let phase_execution = match result {
                    Ok(pe) => pe,
                    Err(e) => {
                        let mut pe = PhaseExecution::new_pending(execution.id.clone(), phase.id.clone(), iteration, vec![]);
                        pe.status = PhaseStatus::Failed;
                        pe.error_message = Some(e.to_string());
                        pe.completed_at = Some(chrono::Utc::now());
                        pe
                    }
                };
                result_tx.send(phase_execution).await.ok();
            });
            handles.push(handle);
        }
        drop(result_tx);

        let mut results = Vec::with_capacity(group.len());
        while let Some(phase_execution) = result_rx.recv().await {
            self.store.put_phase_execution(&phase_execution).await?;
            self.events
                .broadcast(
                    &execution.id,
                    WorkflowEvent::PhaseComplete { phase_id: phase_execution.phase_id.clone(), status: phase_execution.status },
                )
                .await;
            results.push(phase_execution);
        }
        for handle in handles {
            let _ = handle.await;
        }

        let outcome = results
            .iter()
            .map(|pe| match pe.status {
                PhaseStatus::Failed => GroupOutcome::Failed,
                PhaseStatus::Skipped => GroupOutcome::Skipped,
                _ => GroupOutcome::Completed,
            })
            .max()
            .unwrap_or(GroupOutcome::Completed);

        Ok((outcome, results))
    }

    /// Applies `template.failure_behavior` to one failed phase execution
    /// already persisted by the caller (spec.md §4.1 step 2e). Returns
    /// `true` if the execution should keep running (phase skipped or
    /// fallback succeeded), `false` if it must pause.
    async fn handle_failure(
        &self,
        runner: &Arc<PhaseRunner>,
        execution: &mut WorkflowExecution,
        template: &WorkflowTemplate,
        phase: &WorkflowPhase,
        failed: PhaseExecution,
        iteration: u32,
        published: &[Artifact],
    ) -> Result<bool, EngineError> {
        debug!(execution_id = %execution.id, phase_id = %phase.id, ?template.failure_behavior, "handling phase failure");
        match template.failure_behavior {
            FailureBehavior::SkipPhase => {
                let mut skipped = failed;
                skipped.status = PhaseStatus::Skipped;
                self.store.put_phase_execution(&skipped).await?;
                self.events
                    .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: PhaseStatus::Skipped })
                    .await;
                Ok(true)
            }
            FailureBehavior::FallbackProvider => match &phase.provider_config.fallback_provider {
                Some(fallback_config) => {
                    let mut fallback_phase = phase.clone();
                    fallback_phase.provider_config = (**fallback_config).clone();
                    // spec.md §9 open question: the retry is a new
                    // PhaseExecution row sharing phase_id with an incremented
                    // iteration, not an amendment of the failed row.
                    let retried = runner.run_phase(execution, &fallback_phase, iteration + 1, published).await?;
                    self.store.put_phase_execution(&retried).await?;
                    self.record_execution_totals(execution, &retried).await?;
                    self.events
                        .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: retried.status })
                        .await;
                    if retried.status == PhaseStatus::Completed {
                        Ok(true)
                    } else {
                        // spec.md §4.1 step 2e: "if still failed, escalate to
                        // PAUSE_NOTIFY" — same terminal treatment as that arm.
                        self.fail_execution(execution, &retried.error_message.unwrap_or_default()).await?;
                        Ok(false)
                    }
                }
                None => {
                    self.events
                        .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: PhaseStatus::Failed })
                        .await;
                    self.fail_execution(execution, &failed.error_message.unwrap_or_default()).await?;
                    Ok(false)
                }
            },
            FailureBehavior::PauseNotify => {
                self.events
                    .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: PhaseStatus::Failed })
                    .await;
                self.fail_execution(execution, &failed.error_message.unwrap_or_default()).await?;
                Ok(false)
            }
        }
    }

    /// Terminates the execution on an unrecovered phase failure (spec.md §8
    /// scenario 2: "Execution status = FAILED").
    async fn fail_execution(&self, execution: &mut WorkflowExecution, reason: &str) -> Result<(), EngineError> {
        warn!(execution_id = %execution.id, reason, "phase failure terminates the execution");
        self.set_status(execution, WorkflowStatus::Failed).await?;
        Ok(())
    }

    /// Requests interactive approval for a sensitive phase (spec.md §4.1
    /// step 2c). Returns `true` if the execution should proceed.
    async fn gate_on_approval(&self, execution: &mut WorkflowExecution, phase: &WorkflowPhase) -> Result<bool, EngineError> {
        self.events
            .broadcast(
                &execution.id,
                WorkflowEvent::ApprovalNeeded {
                    message: format!("approval required before running sensitive phase '{}'", phase.name),
                    timeout_seconds: crate::approval::DEFAULT_TIMEOUT_SECONDS,
                },
            )
            .await;

        let approvals = self.approvals.clone();
        let mut rx = approvals
            .create_request(execution.id.clone(), format!("run phase '{}'?", phase.name), None, false)
            .await;
        rx.changed().await.ok();
        let outcome = rx.borrow().clone();

        let approved = outcome.map(|o| o.approved).unwrap_or(false);
        if let Some(outcome) = outcome {
            info!(execution_id = %execution.id, phase_id = %phase.id, approved = outcome.approved, ?outcome.source, "approval resolved");
            self.events
                .broadcast(&execution.id, WorkflowEvent::ApprovalResolved { approved: outcome.approved, source: outcome.source })
                .await;
        }

        if !approved {
            self.set_status(execution, WorkflowStatus::Paused).await?;
        }
        Ok(approved)
    }

    /// Runs the sequencing loop for one execution, starting at iteration 1
    /// (or wherever `resume` left off), until a terminal state or pause.
    async fn drive(&self, execution_id: &ExecutionId) -> Result<WorkflowExecution, EngineError> {
        let handle = Arc::new(ExecutionHandle::new());
        self.handles.insert(execution_id.clone(), handle.clone());

        let mut execution = self.get_execution_or_fail(execution_id).await?;
        let template = self
            .find_template(execution.template_id.as_str())
            .ok_or_else(|| crate::errors::ConfigError::TemplateNotFound(execution.template_id.to_string()))?;

        self.set_status(&mut execution, WorkflowStatus::Running).await?;
        let runner = Arc::new(PhaseRunner::new(self.registry.clone(), self.budget.clone(), self.artifacts.clone(), self.events.clone()));

        let result = self.run_iterations(&handle, &runner, &mut execution, &template).await;
        runner.cleanup().await;
        self.handles.remove(execution_id);
        handle.finished.notify_waiters();

        result?;
        Ok(execution)
    }

    async fn run_iterations(
        &self,
        handle: &Arc<ExecutionHandle>,
        runner: &Arc<PhaseRunner>,
        execution: &mut WorkflowExecution,
        template: &WorkflowTemplate,
    ) -> Result<(), EngineError> {
        loop {
            let groups = Self::group_phases(template);
            let mut requested_iteration = false;
            let mut paused = false;

            'groups: for group in &groups {
                let is_first = group
                    .iter()
                    .any(|p| template.ordered_phases().first().map(|f| f.id == p.id).unwrap_or(false));

                if handle.cancel_requested.load(Ordering::SeqCst) {
                    info!(execution_id = %execution.id, "cancellation observed, stopping sequencing loop");
                    self.set_status(execution, WorkflowStatus::Cancelled).await?;
                    return Ok(());
                }

                let (ok, _) = self.budget.check(BudgetScope::Execution, execution.id.as_str(), 0.0).await?;
                if !ok {
                    self.set_status(execution, WorkflowStatus::BudgetExceeded).await?;
                    return Ok(());
                }

                if execution.interactive_mode {
                    for phase in group {
                        if Self::is_sensitive(phase, execution.iteration, is_first) {
                            execution.current_phase_id = Some(phase.id.clone());
                            self.save(execution).await?;
                            if !self.gate_on_approval(execution, phase).await? {
                                paused = true;
                                break 'groups;
                            }
                            self.set_status(execution, WorkflowStatus::Running).await?;
                        }
                    }
                }

                execution.current_phase_id = group.first().map(|p| p.id.clone());
                self.save(execution).await?;

                let published = self.artifacts.get_by_workflow(&execution.id).await?;

                if group.len() == 1 {
                    let phase = group[0];
                    self.events
                        .broadcast(&execution.id, WorkflowEvent::PhaseStart { phase_id: phase.id.clone(), name: phase.name.clone() })
                        .await;
                    let phase_execution = runner.run_phase(execution, phase, execution.iteration, &published).await?;
                    self.store.put_phase_execution(&phase_execution).await?;
                    self.record_execution_totals(execution, &phase_execution).await?;

                    // Post-debit budget check takes priority over
                    // failure_behavior: a BUDGET_EXCEEDED phase (whether
                    // pre-call or post-debit) always terminates the whole
                    // execution, keeping whatever artifact the phase already
                    // produced (spec.md §8 scenario 4).
                    let (budget_ok, _) = self.budget.check(BudgetScope::Execution, execution.id.as_str(), 0.0).await?;
                    if !budget_ok {
                        warn!(execution_id = %execution.id, phase_id = %phase.id, "budget exceeded after phase run, terminating execution");
                        self.events
                            .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: phase_execution.status })
                            .await;
                        self.set_status(execution, WorkflowStatus::BudgetExceeded).await?;
                        return Ok(());
                    }

                    if phase_execution.status == PhaseStatus::Failed {
                        let can_iterate = phase.can_iterate;
                        let keep_going = self
                            .handle_failure(runner, execution, template, phase, phase_execution, execution.iteration, &published)
                            .await?;
                        if !keep_going {
                            paused = true;
                            break 'groups;
                        }
                        if can_iterate {
                            requested_iteration = true;
                        }
                    } else {
                        self.events
                            .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase.id.clone(), status: phase_execution.status })
                            .await;
                    }
                } else {
                    let (outcome, phase_executions) = self.run_group(runner, execution, group, execution.iteration, &published).await?;
                    for pe in &phase_executions {
                        self.record_execution_totals(execution, pe).await?;
                    }

                    let (budget_ok, _) = self.budget.check(BudgetScope::Execution, execution.id.as_str(), 0.0).await?;
                    if !budget_ok {
                        self.set_status(execution, WorkflowStatus::BudgetExceeded).await?;
                        return Ok(());
                    }

                    if outcome == GroupOutcome::Failed {
                        for (phase, pe) in group.iter().zip(phase_executions.into_iter()) {
                            if pe.status == PhaseStatus::Failed {
                                let keep_going = self
                                    .handle_failure(runner, execution, template, phase, pe, execution.iteration, &published)
                                    .await?;
                                if !keep_going {
                                    paused = true;
                                    break 'groups;
                                }
                            }
                        }
                    }
                }
            }

            if paused {
                return Ok(());
            }

            if requested_iteration && execution.iteration < template.max_iterations {
                match template.iteration_behavior {
                    IterationBehavior::AutoIterate => {
                        execution.iteration += 1;
                        self.save(execution).await?;
                        continue;
                    }
                    IterationBehavior::PauseForApproval => {
                        self.set_status(execution, WorkflowStatus::Paused).await?;
                        self.events
                            .broadcast(&execution.id, WorkflowEvent::ApprovalNeeded { message: "ready to iterate".into(), timeout_seconds: 0 })
                            .await;
                        return Ok(());
                    }
                }
            }

            self.set_status(execution, WorkflowStatus::Completed).await?;
            return Ok(());
        }
    }

    async fn record_execution_totals(&self, execution: &mut WorkflowExecution, phase_execution: &PhaseExecution) -> Result<(), EngineError> {
        execution.phase_execution_ids.push(phase_execution.id.clone());
        execution.total_cost_usd += phase_execution.cost_usd;
        execution.total_tokens_input += phase_execution.tokens_input;
        execution.total_tokens_output += phase_execution.tokens_output;
        if let Some(artifact_id) = &phase_execution.output_artifact_id {
            execution.artifact_ids.push(artifact_id.clone());
        }
        self.save(execution).await
    }

    /// Idempotent for a terminal execution (spec.md §8 "Idempotence of run
    /// on terminal"): returns the current record without re-entering the
    /// sequencing loop.
    pub async fn run(&self, execution_id: &ExecutionId) -> Result<WorkflowExecution, EngineError> {
        let execution = self.get_execution_or_fail(execution_id).await?;
        if execution.status.is_terminal() {
            return Ok(execution);
        }
        self.drive(execution_id).await
    }

    /// Transitions RUNNING/PAUSED → CANCELLED, returning after the active
    /// phase observes the signal or a bounded wait elapses (spec.md §4.1
    /// `cancel`).
    pub async fn cancel(&self, execution_id: &ExecutionId) -> Result<bool, EngineError> {
        let execution = self.get_execution_or_fail(execution_id).await?;
        if !matches!(execution.status, WorkflowStatus::Running | WorkflowStatus::Paused) {
            return Ok(false);
        }

        self.approvals.cancel(execution_id).await;

        match self.handles.get(execution_id).map(|h| h.clone()) {
            Some(handle) => {
                handle.cancel_requested.store(true, Ordering::SeqCst);
                let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle.finished.notified()).await;
                Ok(true)
            }
            None => {
                // Not actively running the sequencing loop (e.g. PAUSED
                // awaiting approval): transition directly.
                let mut execution = execution;
                self.set_status(&mut execution, WorkflowStatus::Cancelled).await?;
                Ok(true)
            }
        }
    }

    /// PAUSED → RUNNING, re-entering the sequencing loop (spec.md §4.1
    /// `resume`).
    pub async fn resume(&self, execution_id: &ExecutionId) -> Result<WorkflowExecution, EngineError> {
        let execution = self.get_execution_or_fail(execution_id).await?;
        if execution.status != WorkflowStatus::Paused {
            return Ok(execution);
        }
        self.drive(execution_id).await
    }

    /// Only valid when `phase_id` is the current phase and it `can_skip`
    /// (spec.md §4.1 `skip_phase`).
    pub async fn skip_phase(&self, execution_id: &ExecutionId, phase_id: &str) -> Result<bool, EngineError> {
        let mut execution = self.get_execution_or_fail(execution_id).await?;
        if self.approvals.has_pending(execution_id).await {
            return Err(EngineError::ApprovalPending(execution_id.clone()));
        }

        let template = self
            .find_template(execution.template_id.as_str())
            .ok_or_else(|| crate::errors::ConfigError::TemplateNotFound(execution.template_id.to_string()))?;
        let phase = template.phase(phase_id);

        let can_skip = execution.current_phase_id.as_deref() == Some(phase_id) && phase.is_some_and(|p| p.can_skip);
        if !can_skip {
            return Err(EngineError::CannotSkip { phase_id: phase_id.to_string() });
        }

        let mut pe = PhaseExecution::new_pending(execution.id.clone(), phase_id, execution.iteration, vec![]);
        pe.status = PhaseStatus::Skipped;
        pe.completed_at = Some(chrono::Utc::now());
        self.store.put_phase_execution(&pe).await?;
        execution.phase_execution_ids.push(pe.id.clone());
        self.save(&execution).await?;
        self.events
            .broadcast(&execution.id, WorkflowEvent::PhaseComplete { phase_id: phase_id.to_string(), status: PhaseStatus::Skipped })
            .await;
        Ok(true)
    }

    pub async fn get(&self, execution_id: &ExecutionId) -> Result<Option<WorkflowExecution>, EngineError> {
        Ok(self.store.get_execution(execution_id).await?)
    }

    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>, EngineError> {
        Ok(self.store.list_executions(filter).await?)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn approvals(&self) -> Arc<ApprovalCoordinator> {
        self.approvals.clone()
    }
}
