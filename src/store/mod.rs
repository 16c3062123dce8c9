//! The document store contract (spec.md §6): "what the core needs, not how
//! it's stored." Two implementations ship: [`memory::InMemoryStore`] (the
//! crate's zero-dependency default, used throughout the test suite) and
//! [`sqlite::SqliteStore`] (grounded on the teacher's `factory/db.rs`
//! migration/CRUD style).

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::model::{Artifact, ArtifactId, BudgetScope, ExecutionId, PhaseExecution, PhaseExecutionId, WorkflowExecution};

/// Ledger row for one (scope, scope_id) pair (spec.md §3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRow {
    pub scope: BudgetScope,
    pub scope_id: String,
    pub budget_limit: Option<f64>,
    pub total_spent: f64,
    pub token_count_input: u64,
    pub token_count_output: u64,
    pub period_start: chrono::DateTime<chrono::Utc>,
}

impl BudgetRow {
    pub fn new(scope: BudgetScope, scope_id: impl Into<String>) -> Self {
        Self {
            scope,
            scope_id: scope_id.into(),
            budget_limit: None,
            total_spent: 0.0,
            token_count_input: 0,
            token_count_output: 0,
            period_start: chrono::Utc::now(),
        }
    }
}

/// Who resolved a pending approval (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalSource {
    Web,
    Cli,
    Timeout,
    Callback,
}

/// How a pending approval was resolved (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approved,
    Rejected,
    Timeout,
}

/// Append-only record of one approval resolution (spec.md §6 "Approvals:
/// append-only log").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub execution_id: ExecutionId,
    pub message: String,
    pub action: ApprovalAction,
    pub source: ApprovalSource,
    pub responded_at: chrono::DateTime<chrono::Utc>,
    pub was_timeout: bool,
}

/// Filter for `list_executions` (spec.md §6: "list(filter by
/// project/status/limit)").
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub project_id: Option<String>,
    pub status: Option<crate::model::WorkflowStatus>,
    pub limit: Option<usize>,
}

/// The storage contract the core depends on. Every method is safe to call
/// concurrently; implementations serialize internally where needed (spec.md
/// §5 "Artifact store operations are thread-safe via the backing document
/// store").
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;
    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>, StoreError>;
    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>, StoreError>;
    /// Cascades to this execution's phase executions and approval records.
    /// Artifacts are owned by the artifact store, not cascaded here.
    async fn delete_execution(&self, id: &ExecutionId) -> Result<(), StoreError>;

    async fn put_phase_execution(&self, phase_execution: &PhaseExecution) -> Result<(), StoreError>;
    async fn get_phase_execution(&self, id: &PhaseExecutionId) -> Result<Option<PhaseExecution>, StoreError>;
    async fn list_phase_executions(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<PhaseExecution>, StoreError>;

    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError>;
    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError>;
    async fn list_artifacts_by_workflow(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<Artifact>, StoreError>;
    async fn list_artifacts_by_phase(&self, phase_execution_id: &PhaseExecutionId) -> Result<Vec<Artifact>, StoreError>;
    async fn delete_artifact(&self, id: &ArtifactId) -> Result<(), StoreError>;

    /// Create the row with zeroed counters if absent, then return it.
    async fn get_or_create_budget_row(&self, scope: BudgetScope, scope_id: &str) -> Result<BudgetRow, StoreError>;
    async fn set_budget_limit(&self, scope: BudgetScope, scope_id: &str, limit: Option<f64>) -> Result<(), StoreError>;
    /// Atomically add `cost`/`tokens_in`/`tokens_out` to the row's running
    /// totals, creating it first if absent, and return the row post-debit.
    async fn increment_budget_row(
        &self,
        scope: BudgetScope,
        scope_id: &str,
        cost: f64,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<BudgetRow, StoreError>;

    async fn append_approval_record(&self, record: &ApprovalRecord) -> Result<(), StoreError>;
    async fn list_approval_records(&self, execution_id: &ExecutionId) -> Result<Vec<ApprovalRecord>, StoreError>;
}
