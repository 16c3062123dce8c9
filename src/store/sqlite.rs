use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::errors::StoreError;
use crate::model::{
    Artifact, ArtifactId, BudgetScope, ExecutionId, PhaseExecution, PhaseExecutionId, WorkflowExecution,
};
use crate::store::{ApprovalRecord, BudgetRow, DocumentStore, ExecutionFilter};

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// On-disk store backed by SQLite (grounded on the teacher's
/// `factory/db.rs`). Every document type is stored as a JSON blob under its
/// id: the core's contract (spec.md §6) doesn't need relational queries
/// beyond filter-by-project/status/execution, so a normalized schema buys
/// nothing the document model doesn't already give us.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                project_id TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS phase_executions (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                phase_execution_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS budget_rows (
                scope TEXT NOT NULL,
                scope_id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (scope, scope_id)
            );

            CREATE TABLE IF NOT EXISTS approvals (
                execution_id TEXT NOT NULL,
                responded_at TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_phase_executions_execution ON phase_executions(execution_id);
            CREATE INDEX IF NOT EXISTS idx_artifacts_execution ON artifacts(execution_id);
            CREATE INDEX IF NOT EXISTS idx_artifacts_phase ON artifacts(phase_execution_id);
            CREATE INDEX IF NOT EXISTS idx_approvals_execution ON approvals(execution_id);
            ",
        )
        .map_err(backend_err)?;
        Ok(())
    }
}

/// Runs a closure against the connection on a blocking thread, the way the
/// teacher's `ClaudeRunner` pushes subprocess I/O off the async executor.
/// `rusqlite::Connection` is synchronous end to end, so every store method
/// is a thin `spawn_blocking` wrapper around one of these.
async fn with_conn<T, F>(conn: &Mutex<Connection>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send,
    T: Send,
{
    // rusqlite::Connection isn't Send across an await, so this crosses the
    // boundary via the same thread the closure runs on; callers are the
    // `DocumentStore` methods below, which only ever invoke `with_conn` and
    // return its result, so there is no `.await` in between touching `conn`.
    let guard = conn.lock().expect("sqlite connection mutex poisoned");
    f(&guard)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn put_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let body = serde_json::to_string(execution).map_err(backend_err)?;
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO executions (id, project_id, status, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET project_id = ?2, status = ?3, body = ?5",
                params![
                    execution.id.as_str(),
                    execution.project_id,
                    format!("{:?}", execution.status),
                    execution.created_at.to_rfc3339(),
                    body,
                ],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        with_conn(&self.conn, move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM executions WHERE id = ?1", params![id.as_str()], |row| row.get(0))
                .ok();
            body.map(|b| serde_json::from_str(&b).map_err(backend_err)).transpose()
        })
        .await
    }

    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>, StoreError> {
        let filter = filter.clone();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn.prepare("SELECT body FROM executions ORDER BY created_at").map_err(backend_err)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                let body = row.map_err(backend_err)?;
                let execution: WorkflowExecution = serde_json::from_str(&body).map_err(backend_err)?;
                if filter.project_id.is_some() && execution.project_id != filter.project_id {
                    continue;
                }
                if let Some(status) = filter.status {
                    if execution.status != status {
                        continue;
                    }
                }
                out.push(execution);
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
        .await
    }

    async fn delete_execution(&self, id: &ExecutionId) -> Result<(), StoreError> {
        with_conn(&self.conn, move |conn| {
            conn.execute("DELETE FROM executions WHERE id = ?1", params![id.as_str()]).map_err(backend_err)?;
            conn.execute("DELETE FROM phase_executions WHERE execution_id = ?1", params![id.as_str()])
                .map_err(backend_err)?;
            conn.execute("DELETE FROM approvals WHERE execution_id = ?1", params![id.as_str()]).map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn put_phase_execution(&self, phase_execution: &PhaseExecution) -> Result<(), StoreError> {
        let body = serde_json::to_string(phase_execution).map_err(backend_err)?;
        let pe = phase_execution.clone();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO phase_executions (id, execution_id, started_at, body) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET body = ?4",
                params![pe.id.as_str(), pe.workflow_execution_id.as_str(), pe.started_at.to_rfc3339(), body],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_phase_execution(&self, id: &PhaseExecutionId) -> Result<Option<PhaseExecution>, StoreError> {
        with_conn(&self.conn, move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM phase_executions WHERE id = ?1", params![id.as_str()], |row| row.get(0))
                .ok();
            body.map(|b| serde_json::from_str(&b).map_err(backend_err)).transpose()
        })
        .await
    }

    async fn list_phase_executions(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<PhaseExecution>, StoreError> {
        let execution_id = workflow_execution_id.clone();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT body FROM phase_executions WHERE execution_id = ?1 ORDER BY started_at")
                .map_err(backend_err)?;
            let rows = stmt.query_map(params![execution_id.as_str()], |row| row.get::<_, String>(0)).map_err(backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row.map_err(backend_err)?).map_err(backend_err)?);
            }
            Ok(out)
        })
        .await
    }

    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let body = serde_json::to_string(artifact).map_err(backend_err)?;
        let artifact = artifact.clone();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO artifacts (id, execution_id, phase_execution_id, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET body = ?5",
                params![
                    artifact.id.as_str(),
                    artifact.workflow_execution_id.as_str(),
                    artifact.phase_execution_id.as_str(),
                    artifact.created_at.to_rfc3339(),
                    body,
                ],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        with_conn(&self.conn, move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM artifacts WHERE id = ?1", params![id.as_str()], |row| row.get(0))
                .ok();
            body.map(|b| serde_json::from_str(&b).map_err(backend_err)).transpose()
        })
        .await
    }

    async fn list_artifacts_by_workflow(&self, workflow_execution_id: &ExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let execution_id = workflow_execution_id.clone();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT body FROM artifacts WHERE execution_id = ?1 ORDER BY created_at")
                .map_err(backend_err)?;
            let rows = stmt.query_map(params![execution_id.as_str()], |row| row.get::<_, String>(0)).map_err(backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row.map_err(backend_err)?).map_err(backend_err)?);
            }
            Ok(out)
        })
        .await
    }

    async fn list_artifacts_by_phase(&self, phase_execution_id: &PhaseExecutionId) -> Result<Vec<Artifact>, StoreError> {
        let phase_execution_id = phase_execution_id.clone();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT body FROM artifacts WHERE phase_execution_id = ?1 ORDER BY created_at")
                .map_err(backend_err)?;
            let rows = stmt.query_map(params![phase_execution_id.as_str()], |row| row.get::<_, String>(0)).map_err(backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row.map_err(backend_err)?).map_err(backend_err)?);
            }
            Ok(out)
        })
        .await
    }

    async fn delete_artifact(&self, id: &ArtifactId) -> Result<(), StoreError> {
        with_conn(&self.conn, move |conn| {
            conn.execute("DELETE FROM artifacts WHERE id = ?1", params![id.as_str()]).map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_or_create_budget_row(&self, scope: BudgetScope, scope_id: &str) -> Result<BudgetRow, StoreError> {
        let scope_id = scope_id.to_string();
        with_conn(&self.conn, move |conn| load_or_init_budget_row(conn, scope, &scope_id)).await
    }

    async fn set_budget_limit(&self, scope: BudgetScope, scope_id: &str, limit: Option<f64>) -> Result<(), StoreError> {
        let scope_id = scope_id.to_string();
        with_conn(&self.conn, move |conn| {
            let mut row = load_or_init_budget_row(conn, scope, &scope_id)?;
            row.budget_limit = limit;
            save_budget_row(conn, &row)
        })
        .await
    }

    async fn increment_budget_row(
        &self,
        scope: BudgetScope,
        scope_id: &str,
        cost: f64,
        tokens_in: u64,
        tokens_out: u64,
    ) -> Result<BudgetRow, StoreError> {
        let scope_id = scope_id.to_string();
        with_conn(&self.conn, move |conn| {
            let mut row = load_or_init_budget_row(conn, scope, &scope_id)?;
            row.total_spent += cost;
            row.token_count_input += tokens_in;
            row.token_count_output += tokens_out;
            save_budget_row(conn, &row)?;
            Ok(row)
        })
        .await
    }

    async fn append_approval_record(&self, record: &ApprovalRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(record).map_err(backend_err)?;
        let record = record.clone();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO approvals (execution_id, responded_at, body) VALUES (?1, ?2, ?3)",
                params![record.execution_id.as_str(), record.responded_at.to_rfc3339(), body],
            )
            .map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn list_approval_records(&self, execution_id: &ExecutionId) -> Result<Vec<ApprovalRecord>, StoreError> {
        let execution_id = execution_id.clone();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn
                .prepare("SELECT body FROM approvals WHERE execution_id = ?1 ORDER BY responded_at")
                .map_err(backend_err)?;
            let rows = stmt.query_map(params![execution_id.as_str()], |row| row.get::<_, String>(0)).map_err(backend_err)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row.map_err(backend_err)?).map_err(backend_err)?);
            }
            Ok(out)
        })
        .await
    }
}

fn load_or_init_budget_row(conn: &Connection, scope: BudgetScope, scope_id: &str) -> Result<BudgetRow, StoreError> {
    let scope_key = format!("{scope:?}");
    let existing: Option<String> = conn
        .query_row(
            "SELECT body FROM budget_rows WHERE scope = ?1 AND scope_id = ?2",
            params![scope_key, scope_id],
            |row| row.get(0),
        )
        .ok();
    match existing {
        Some(body) => serde_json::from_str(&body).map_err(backend_err),
        None => {
            let row = BudgetRow::new(scope, scope_id);
            save_budget_row(conn, &row)?;
            Ok(row)
        }
    }
}

fn save_budget_row(conn: &Connection, row: &BudgetRow) -> Result<(), StoreError> {
    let body = serde_json::to_string(row).map_err(backend_err)?;
    conn.execute(
        "INSERT INTO budget_rows (scope, scope_id, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(scope, scope_id) DO UPDATE SET body = ?3",
        params![format!("{:?}", row.scope), row.scope_id, body],
    )
    .map_err(backend_err)?;
    Ok(())
}
