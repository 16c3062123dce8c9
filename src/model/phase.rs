use serde::{Deserialize, Serialize};

use crate::model::{ArtifactType, ProviderConfig};

/// Informational role tag on a phase (`original_source/src/workflow/models.py`
/// `PhaseRole`). The orchestrator's "sensitive phase" check (spec.md §4.1
/// step 2c) is defined against this enum: any reviewer role or the
/// implementer role is sensitive, as is the first phase of an iteration > 1
/// (checked by the orchestrator, not here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRole {
    Analyzer,
    Planner,
    Implementer,
    ReviewerFunctional,
    ReviewerStyle,
    ReviewerSecurity,
    ReviewerCustom,
    Verifier,
    BrowserVerifier,
}

impl PhaseRole {
    pub fn is_sensitive(self) -> bool {
        matches!(
            self,
            PhaseRole::Implementer
                | PhaseRole::ReviewerFunctional
                | PhaseRole::ReviewerStyle
                | PhaseRole::ReviewerSecurity
                | PhaseRole::ReviewerCustom
        )
    }
}

/// One phase in a [`crate::model::WorkflowTemplate`] (spec.md §3). Immutable
/// once the template is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPhase {
    pub id: String,
    pub name: String,
    pub role: PhaseRole,
    pub provider_config: ProviderConfig,
    /// Template text with `{task_description}`, `{project_path}`, and
    /// `{artifact:NAME}` placeholders, resolved by the phase runner.
    pub prompt_template: String,
    pub output_artifact_type: ArtifactType,
    /// Leading `/` ⇒ case-insensitive literal substring; otherwise a
    /// case-insensitive regex; empty ⇒ always succeeds (spec.md §4.2).
    #[serde(default)]
    pub success_pattern: String,
    #[serde(default)]
    pub can_skip: bool,
    #[serde(default)]
    pub can_iterate: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Id of a sibling phase this one may run concurrently with. Symmetric
    /// membership is established by the orchestrator grouping every phase
    /// sharing the same anchor (spec.md §4.1 step 1).
    #[serde(default)]
    pub parallel_with: Option<String>,
    /// Primary sort key for phase ordering (spec.md §3, §4.1 step 1).
    pub order: i64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_seconds() -> u64 {
    3600
}

impl WorkflowPhase {
    /// Phases that share a `parallel_with` anchor (either naming the other
    /// directly, or both naming a common third phase) belong to the same
    /// concurrent group.
    pub fn parallel_anchor(&self) -> Option<&str> {
        self.parallel_with.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderKind;

    fn phase(id: &str, order: i64) -> WorkflowPhase {
        WorkflowPhase {
            id: id.to_string(),
            name: id.to_string(),
            role: PhaseRole::Analyzer,
            provider_config: ProviderConfig::new(ProviderKind::LocalOllama),
            prompt_template: "do {task_description}".into(),
            output_artifact_type: ArtifactType::TaskList,
            success_pattern: "/done".into(),
            can_skip: false,
            can_iterate: false,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            parallel_with: None,
            order,
        }
    }

    #[test]
    fn implementer_and_reviewers_are_sensitive() {
        assert!(PhaseRole::Implementer.is_sensitive());
        assert!(PhaseRole::ReviewerSecurity.is_sensitive());
        assert!(!PhaseRole::Analyzer.is_sensitive());
        assert!(!PhaseRole::Verifier.is_sensitive());
    }

    #[test]
    fn defaults_match_spec() {
        let p = phase("a", 0);
        assert_eq!(p.max_retries, 2);
        assert_eq!(p.timeout_seconds, 3600);
    }

    #[test]
    fn parallel_anchor_is_none_by_default() {
        let p = phase("a", 0);
        assert!(p.parallel_anchor().is_none());
    }
}
