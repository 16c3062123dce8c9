//! Artifact Store (spec.md §4.6): durable home for the text a phase
//! publishes. Grounded on `original_source/src/workflow/artifact_manager.py`'s
//! `ArtifactManager` — content lives inline in the document store as the
//! primary copy, with an optional plain-text file mirrored alongside it for
//! anything that wants to read artifacts off disk directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::StoreError;
use crate::model::{Artifact, ArtifactId, ArtifactType, ExecutionId, PhaseExecutionId};
use crate::store::DocumentStore;

/// Keeps alphanumerics, `.`, `-`, `_`; replaces everything else with `_`
/// (spec.md §4.6 "Storage model", ported from `artifact_manager.py`'s
/// `_get_artifact_path`).
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Publishes and retrieves phase artifacts. Inline `content` in the document
/// store is the artifact's primary, authoritative copy; the durable file
/// under `base_dir` is a convenience mirror, not a second source of truth —
/// [`ArtifactStore::read_content`] only falls back to the store's `content`
/// field if the file is missing.
pub struct ArtifactStore {
    store: Arc<dyn DocumentStore>,
    base_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn DocumentStore>, base_dir: impl Into<PathBuf>) -> Self {
        Self { store, base_dir: base_dir.into() }
    }

    fn artifact_path(&self, workflow_execution_id: &ExecutionId, artifact_id: &ArtifactId, name: &str) -> PathBuf {
        self.base_dir
            .join(workflow_execution_id.as_str())
            .join(format!("{}_{}", artifact_id.as_str(), sanitize_name(name)))
    }

    fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io { path: parent.to_path_buf(), source: e })?;
        }
        std::fs::write(path, content).map_err(|e| StoreError::Io { path: path.to_path_buf(), source: e })
    }

    pub async fn create(
        &self,
        workflow_execution_id: ExecutionId,
        phase_execution_id: PhaseExecutionId,
        artifact_type: ArtifactType,
        name: impl Into<String>,
        content: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<Artifact, StoreError> {
        let id = ArtifactId::new();
        let name = name.into();
        let content = content.into();
        let path = self.artifact_path(&workflow_execution_id, &id, &name);
        Self::write_file(&path, &content)?;

        let now = chrono::Utc::now();
        let artifact = Artifact {
            id,
            workflow_execution_id,
            phase_execution_id,
            artifact_type,
            name,
            content,
            external_path: Some(path),
            metadata,
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        self.store.put_artifact(&artifact).await?;
        Ok(artifact)
    }

    pub async fn get(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        self.store.get_artifact(id).await
    }

    /// Stable by `created_at` (spec.md §4.6 "Invariants").
    pub async fn get_by_workflow(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts = self.store.list_artifacts_by_workflow(workflow_execution_id).await?;
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    pub async fn get_by_phase(&self, phase_execution_id: &PhaseExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let mut artifacts = self.store.list_artifacts_by_phase(phase_execution_id).await?;
        artifacts.sort_by_key(|a| a.created_at);
        Ok(artifacts)
    }

    pub async fn get_latest_by_type(
        &self,
        workflow_execution_id: &ExecutionId,
        artifact_type: ArtifactType,
    ) -> Result<Option<Artifact>, StoreError> {
        let artifacts = self.store.list_artifacts_by_workflow(workflow_execution_id).await?;
        Ok(artifacts.into_iter().filter(|a| a.artifact_type == artifact_type).max_by_key(|a| a.created_at))
    }

    /// Sets `is_edited`, bumps `updated_at`, rewrites the durable mirror if
    /// one exists. Returns `false` if the artifact doesn't exist.
    pub async fn update_content(&self, id: &ArtifactId, content: impl Into<String>) -> Result<bool, StoreError> {
        let Some(mut artifact) = self.store.get_artifact(id).await? else {
            return Ok(false);
        };
        artifact.edit(content.into());
        if let Some(path) = &artifact.external_path {
            Self::write_file(path, &artifact.content)?;
        }
        self.store.put_artifact(&artifact).await?;
        Ok(true)
    }

    /// Prefers the durable file on disk over the inline copy, falling back
    /// to `content` if the file was never written or has since been removed.
    pub async fn read_content(&self, id: &ArtifactId) -> Result<Option<String>, StoreError> {
        let Some(artifact) = self.store.get_artifact(id).await? else {
            return Ok(None);
        };
        if let Some(path) = &artifact.external_path {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(|e| StoreError::Io { path: path.clone(), source: e })?;
                return Ok(Some(text));
            }
        }
        Ok(Some(artifact.content))
    }

    pub async fn delete(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        let Some(artifact) = self.store.get_artifact(id).await? else {
            return Ok(false);
        };
        if let Some(path) = &artifact.external_path {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| StoreError::Io { path: path.clone(), source: e })?;
            }
        }
        self.store.delete_artifact(id).await?;
        Ok(true)
    }

    /// Deletes every artifact for the workflow, then removes its directory
    /// if left empty. Returns the number of artifacts removed.
    pub async fn cleanup_workflow(&self, workflow_execution_id: &ExecutionId) -> Result<usize, StoreError> {
        let artifacts = self.store.list_artifacts_by_workflow(workflow_execution_id).await?;
        let mut count = 0;
        for artifact in &artifacts {
            if self.delete(&artifact.id).await? {
                count += 1;
            }
        }

        let workflow_dir = self.base_dir.join(workflow_execution_id.as_str());
        if workflow_dir.exists() {
            let is_empty = workflow_dir.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false);
            if is_empty {
                let _ = std::fs::remove_dir(&workflow_dir);
            }
        }
        Ok(count)
    }
}
