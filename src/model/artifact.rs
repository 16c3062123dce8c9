use serde::{Deserialize, Serialize};

use crate::model::{ArtifactId, ExecutionId, PhaseExecutionId};

/// Kind tag carried alongside an artifact's content (spec.md §3; the closed
/// set from `original_source/src/workflow/models.py`'s `ArtifactType`).
/// Purely descriptive: the artifact store does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    TaskList,
    CodebaseDocs,
    ImplementationPlan,
    CodeDiff,
    ReviewReport,
    VerificationReport,
    BrowserVerificationReport,
    Custom,
}

/// A published output of one phase execution (spec.md §3, §4.6; ported from
/// `original_source/src/workflow/artifact_manager.py`).
///
/// `workflow_execution_id` and `phase_execution_id` are immutable for the
/// artifact's lifetime. `content` is immutable unless [`Artifact::edit`] is
/// called, which is the only operation allowed to mutate it; every other
/// field is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub workflow_execution_id: ExecutionId,
    pub phase_execution_id: PhaseExecutionId,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub content: String,
    /// Path under the artifact store's base directory, set once the durable
    /// copy is written (spec.md §4.6 storage model).
    #[serde(default)]
    pub external_path: Option<std::path::PathBuf>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Artifact {
    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }

    /// Apply an `update_content` call: replaces `content`, sets `is_edited`,
    /// bumps `updated_at`. `created_at` and the id fields never change.
    pub fn edit(&mut self, new_content: String) {
        self.content = new_content;
        self.is_edited = true;
        self.updated_at = chrono::Utc::now();
    }
}
