use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{generate_id, ArtifactId, ExecutionId, TemplateId};

/// Identifies one (phase × iteration) attempt. Distinct from the phase's own
/// `id` (a `WorkflowPhase::id`, stable across the template): a phase that
/// iterates twice, or is re-run once under `FALLBACK_PROVIDER`, produces
/// multiple `PhaseExecution` rows sharing a `phase_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseExecutionId(pub String);

impl PhaseExecutionId {
    pub fn new() -> Self {
        Self(generate_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PhaseExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PhaseExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PhaseExecutionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PhaseExecutionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How a [`WorkflowExecution`] was started; informational only (ported from
/// the original's `TriggerMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    GithubIssue,
    ManualTask,
    DirectoryScan,
}

/// Lifecycle state of one phase attempt (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }
}

/// One recorded attempt at running a `WorkflowPhase` within one iteration
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub id: PhaseExecutionId,
    pub workflow_execution_id: ExecutionId,
    pub phase_id: String,
    pub status: PhaseStatus,
    /// 1-based.
    pub iteration: u32,
    #[serde(default)]
    pub input_artifact_ids: Vec<ArtifactId>,
    #[serde(default)]
    pub output_artifact_id: Option<ArtifactId>,
    #[serde(default)]
    pub tokens_input: u64,
    #[serde(default)]
    pub tokens_output: u64,
    #[serde(default)]
    pub cost_usd: f64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl PhaseExecution {
    pub fn new_pending(
        workflow_execution_id: ExecutionId,
        phase_id: impl Into<String>,
        iteration: u32,
        input_artifact_ids: Vec<ArtifactId>,
    ) -> Self {
        Self {
            id: PhaseExecutionId::new(),
            workflow_execution_id,
            phase_id: phase_id.into(),
            status: PhaseStatus::Pending,
            iteration,
            input_artifact_ids,
            output_artifact_id: None,
            tokens_input: 0,
            tokens_output: 0,
            cost_usd: 0.0,
            started_at: chrono::Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// Top-level status of a [`WorkflowExecution`] (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
    BudgetExceeded,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Failed
                | WorkflowStatus::Cancelled
                | WorkflowStatus::BudgetExceeded
        )
    }
}

/// One run of a [`crate::model::WorkflowTemplate`] against a task (spec.md
/// §3). `template_id`/`template_name` are a snapshot taken at creation time:
/// later edits or deletion of the template never change a past execution's
/// record of what it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub template_id: TemplateId,
    pub template_name: String,
    pub project_id: Option<String>,
    pub project_path: String,
    pub task_description: String,
    pub status: WorkflowStatus,
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub current_phase_id: Option<String>,
    #[serde(default = "default_iteration")]
    pub iteration: u32,
    #[serde(default)]
    pub phase_execution_ids: Vec<PhaseExecutionId>,
    #[serde(default)]
    pub artifact_ids: Vec<ArtifactId>,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub total_tokens_input: u64,
    #[serde(default)]
    pub total_tokens_output: u64,
    #[serde(default)]
    pub budget_limit: Option<f64>,
    #[serde(default)]
    pub interactive_mode: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_iteration() -> u32 {
    1
}

impl WorkflowExecution {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        template_id: TemplateId,
        template_name: impl Into<String>,
        project_id: Option<String>,
        project_path: impl Into<String>,
        task_description: impl Into<String>,
        trigger_mode: TriggerMode,
        budget_limit: Option<f64>,
        interactive_mode: bool,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            template_id,
            template_name: template_name.into(),
            project_id,
            project_path: project_path.into(),
            task_description: task_description.into(),
            status: WorkflowStatus::Pending,
            trigger_mode,
            current_phase_id: None,
            iteration: default_iteration(),
            phase_execution_ids: Vec::new(),
            artifact_ids: Vec::new(),
            total_cost_usd: 0.0,
            total_tokens_input: 0,
            total_tokens_output: 0,
            budget_limit,
            interactive_mode,
            created_at: chrono::Utc::now(),
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phase_statuses_are_completed_failed_skipped() {
        for s in [PhaseStatus::Completed, PhaseStatus::Failed, PhaseStatus::Skipped] {
            assert!(s.is_terminal());
        }
        assert!(!PhaseStatus::Pending.is_terminal());
        assert!(!PhaseStatus::Running.is_terminal());
        assert!(!PhaseStatus::Paused.is_terminal());
    }

    #[test]
    fn terminal_workflow_statuses() {
        for s in [
            WorkflowStatus::Completed,
            WorkflowStatus::Failed,
            WorkflowStatus::Cancelled,
            WorkflowStatus::BudgetExceeded,
        ] {
            assert!(s.is_terminal());
        }
        assert!(!WorkflowStatus::AwaitingApproval.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
    }

    #[test]
    fn new_pending_phase_execution_has_zeroed_counters() {
        let pe = PhaseExecution::new_pending(ExecutionId::new(), "analyze", 1, vec![]);
        assert_eq!(pe.status, PhaseStatus::Pending);
        assert_eq!(pe.tokens_input, 0);
        assert!(pe.output_artifact_id.is_none());
    }

    #[test]
    fn new_workflow_execution_starts_pending_at_iteration_one() {
        let we = WorkflowExecution::new(
            TemplateId::new(),
            "t",
            None,
            "/tmp/proj",
            "do it",
            TriggerMode::ManualTask,
            None,
            false,
        );
        assert_eq!(we.status, WorkflowStatus::Pending);
        assert_eq!(we.iteration, 1);
        assert!(we.current_phase_id.is_none());
    }
}
