use serde::{Deserialize, Serialize};

use crate::model::WorkflowPhase;

/// What happens when a phase marked `can_iterate` fails its success pattern
/// and the whole template's phase sequence has run to completion (spec.md
/// §4.1 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationBehavior {
    AutoIterate,
    PauseForApproval,
}

/// What the orchestrator does when a phase fails and exhausts retries /
/// isn't eligible for iteration (spec.md §4.1 step 2e).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureBehavior {
    PauseNotify,
    FallbackProvider,
    SkipPhase,
}

/// An ordered set of phases plus the global policies that govern iteration,
/// failure handling, and budget (spec.md §3). Immutable once loaded into an
/// execution: edits to a template never retroactively change the history of
/// executions already snapshotted from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub phases: Vec<WorkflowPhase>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    pub iteration_behavior: IterationBehavior,
    pub failure_behavior: FailureBehavior,
    #[serde(default)]
    pub budget_limit: Option<f64>,
    /// Non-null when this template is the default for one project;
    /// `is_global` templates are the fallback when no project default
    /// exists (spec.md §4.1 `create_execution`).
    #[serde(default)]
    pub scope_project_id: Option<String>,
    #[serde(default)]
    pub is_global: bool,
}

fn default_max_iterations() -> u32 {
    3
}

/// Errors that make a template unusable; caught once at load time, distinct
/// from the runtime [`crate::errors::EngineError`] hierarchy.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateValidationError {
    #[error("template has no phases")]
    Empty,
    #[error("duplicate phase id: {0}")]
    DuplicatePhaseId(String),
    #[error("phase {phase_id} has parallel_with referencing unknown phase {anchor}")]
    UnknownParallelAnchor { phase_id: String, anchor: String },
    #[error("provider fallback chain for phase {0} exceeds 64 hops; likely a cycle")]
    FallbackChainTooLong(String),
}

impl WorkflowTemplate {
    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.phases.is_empty() {
            return Err(TemplateValidationError::Empty);
        }

        let mut seen = std::collections::HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.id.as_str()) {
                return Err(TemplateValidationError::DuplicatePhaseId(phase.id.clone()));
            }
        }

        for phase in &self.phases {
            if let Some(anchor) = &phase.parallel_with {
                if !seen.contains(anchor.as_str()) {
                    return Err(TemplateValidationError::UnknownParallelAnchor {
                        phase_id: phase.id.clone(),
                        anchor: anchor.clone(),
                    });
                }
            }
            if phase.provider_config.fallback_chain_len() > 63 {
                return Err(TemplateValidationError::FallbackChainTooLong(phase.id.clone()));
            }
        }

        Ok(())
    }

    pub fn phase(&self, id: &str) -> Option<&WorkflowPhase> {
        self.phases.iter().find(|p| p.id == id)
    }

    /// Phases in sequencing order (spec.md §4.1 step 1: "stable sort by
    /// `order`").
    pub fn ordered_phases(&self) -> Vec<&WorkflowPhase> {
        let mut phases: Vec<&WorkflowPhase> = self.phases.iter().collect();
        phases.sort_by_key(|p| p.order);
        phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactType, PhaseRole, ProviderConfig, ProviderKind};

    fn phase(id: &str, order: i64, parallel_with: Option<&str>) -> WorkflowPhase {
        WorkflowPhase {
            id: id.to_string(),
            name: id.to_string(),
            role: PhaseRole::Analyzer,
            provider_config: ProviderConfig::new(ProviderKind::LocalOllama),
            prompt_template: "x".into(),
            output_artifact_type: ArtifactType::TaskList,
            success_pattern: "/ok".into(),
            can_skip: false,
            can_iterate: false,
            max_retries: 2,
            timeout_seconds: 60,
            parallel_with: parallel_with.map(|s| s.to_string()),
            order,
        }
    }

    fn template(phases: Vec<WorkflowPhase>) -> WorkflowTemplate {
        WorkflowTemplate {
            id: "t1".into(),
            name: "test".into(),
            phases,
            max_iterations: default_max_iterations(),
            iteration_behavior: IterationBehavior::AutoIterate,
            failure_behavior: FailureBehavior::PauseNotify,
            budget_limit: None,
            scope_project_id: None,
            is_global: true,
        }
    }

    #[test]
    fn rejects_empty_template() {
        assert_eq!(template(vec![]).validate(), Err(TemplateValidationError::Empty));
    }

    #[test]
    fn rejects_duplicate_phase_ids() {
        let t = template(vec![phase("a", 0, None), phase("a", 1, None)]);
        assert_eq!(
            t.validate(),
            Err(TemplateValidationError::DuplicatePhaseId("a".into()))
        );
    }

    #[test]
    fn rejects_unknown_parallel_anchor() {
        let t = template(vec![phase("a", 0, Some("ghost"))]);
        assert_eq!(
            t.validate(),
            Err(TemplateValidationError::UnknownParallelAnchor {
                phase_id: "a".into(),
                anchor: "ghost".into(),
            })
        );
    }

    #[test]
    fn accepts_valid_template() {
        let t = template(vec![phase("a", 0, None), phase("b", 1, Some("a"))]);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn ordered_phases_sorts_by_order_field() {
        let t = template(vec![phase("b", 1, None), phase("a", 0, None)]);
        let ordered = t.ordered_phases();
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }
}
