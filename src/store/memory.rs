use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::model::{
    Artifact, ArtifactId, BudgetScope, ExecutionId, PhaseExecution, PhaseExecutionId, WorkflowExecution,
};
use crate::store::{ApprovalRecord, BudgetRow, DocumentStore, ExecutionFilter};

/// The crate's zero-dependency default store: everything lives in memory
/// behind a handful of `RwLock`-guarded maps. Good for tests and for
/// processes that don't need durability across restarts.
#[derive(Default)]
pub struct InMemoryStore {
    executions: RwLock<HashMap<ExecutionId, WorkflowExecution>>,
    phase_executions: RwLock<HashMap<PhaseExecutionId, PhaseExecution>>,
    artifacts: RwLock<HashMap<ArtifactId, Artifact>>,
    budget_rows: RwLock<HashMap<(BudgetScope, String), BudgetRow>>,
    approvals: RwLock<Vec<ApprovalRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn put_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        self.executions.write().await.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>, StoreError> {
        let mut rows: Vec<WorkflowExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| filter.project_id.is_none() || e.project_id == filter.project_id)
            .filter(|e| filter.status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn delete_execution(&self, id: &ExecutionId) -> Result<(), StoreError> {
        self.executions.write().await.remove(id);
        self.phase_executions.write().await.retain(|_, pe| &pe.workflow_execution_id != id);
        self.approvals.write().await.retain(|a| &a.execution_id != id);
        Ok(())
    }

    async fn put_phase_execution(&self, phase_execution: &PhaseExecution) -> Result<(), StoreError> {
        self.phase_executions
            .write()
            .await
            .insert(phase_execution.id.clone(), phase_execution.clone());
        Ok(())
    }

    async fn get_phase_execution(&self, id: &PhaseExecutionId) -> Result<Option<PhaseExecution>, StoreError> {
        Ok(self.phase_executions.read().await.get(id).cloned())
    }

    async fn list_phase_executions(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<PhaseExecution>, StoreError> {
        let mut rows: Vec<PhaseExecution> = self
            .phase_executions
            .read()
            .await
            .values()
            .filter(|pe| &pe.workflow_execution_id == workflow_execution_id)
            .cloned()
            .collect();
        rows.sort_by_key(|pe| pe.started_at);
        Ok(rows)
    }

    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.artifacts.write().await.insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.read().await.get(id).cloned())
    }

    async fn list_artifacts_by_workflow(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let mut rows: Vec<Artifact> = self
            .artifacts
            .read()
            .await
            .values()
            .filter(|a| &a.workflow_execution_id == workflow_execution_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn list_artifacts_by_phase(&self, phase_execution_id: &PhaseExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let mut rows: Vec<Artifact> = self
            .artifacts
            .read()
            .await
            .values()
            .filter(|a| &a.phase_execution_id == phase_execution_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn delete_artifact(&self, id: &ArtifactId) -> Result<(), StoreError> {
        self.artifacts.write().await.remove(id);
        Ok(())
    }

    async fn get_or_create_budget_row(&self, scope: BudgetScope, scope_id: &str) -> Result<BudgetRow, StoreError> {
        let mut rows = self.budget_rows.write().await;
        let key = (scope, scope_id.to_string());
        Ok(rows
            .entry(key)
            .or_insert_with(|| BudgetRow::new(scope, scope_id))
            .clone())
    }

    async fn set_budget_limit(&self, scope: BudgetScope, scope_id: &str, limit: Option<f64>) -> Result<(), StoreError> {
        let mut rows = self.budget_rows.write().await;
        let key = (scope, scope_id.to_string());
        let row = rows.entry(key).or_insert_with(|| BudgetRow::new(scope, scope_id));
        row.budget_limit = limit;
        Ok(())
    }

    async fn increment_budget_row(
        &self,
        scope: BudgetScope,
        scope_id: &str,
        cost: f64,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<BudgetRow, StoreError> {
        let mut rows = self.budget_rows.write().await;
        let key = (scope, scope_id.to_string());
        let row = rows.entry(key).or_insert_with(|| BudgetRow::new(scope, scope_id));
        row.total_spent += cost;
        row.token_count_input += tokens_in;
        row.token_count_output += tokens_out;
        Ok(row.clone())
    }

    async fn append_approval_record(&self, record: &ApprovalRecord) -> Result<(), StoreError> {
        self.approvals.write().await.push(record.clone());
        Ok(())
    }

    async fn list_approval_records(&self, execution_id: &ExecutionId) -> Result<Vec<ApprovalRecord>, StoreError> {
        Ok(self
            .approvals
            .read()
            .await
            .iter()
            .filter(|a| &a.execution_id == execution_id)
            .cloned()
            .collect())
    }
}
