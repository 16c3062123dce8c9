//! Approval Coordinator (spec.md §4.4): single-point human-in-the-loop gate
//! keyed by execution id. Grounded directly on
//! `original_source/src/workflow/api.py`'s `ApprovalManager`: a prior
//! pending request for the same execution is cancelled by a new one, a
//! timer resolves to the default on expiry, and `resolve`/`cancel` are
//! mutually exclusive, serialized transitions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::errors::ApprovalError;
use crate::model::ExecutionId;
use crate::store::{ApprovalAction, ApprovalRecord, ApprovalSource, DocumentStore};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Terminal outcome of one approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub approved: bool,
    pub source: ApprovalSource,
}

struct PendingRequest {
    /// `None` once resolved. A `watch` channel (not a `oneshot`) because
    /// both the orchestrator and `get_pending_info`-style callers need to
    /// observe the outcome, and `get_pending_info` may be called more than
    /// once before resolution — a `oneshot::Receiver` can only be consumed
    /// once (spec.md §4.4 "Ordering guarantee").
    outcome_tx: watch::Sender<Option<ApprovalOutcome>>,
    message: String,
    created_at: chrono::DateTime<chrono::Utc>,
    timeout_seconds: u64,
    timeout_handle: tokio::task::JoinHandle<()>,
}

/// Snapshot of a pending request (spec.md §4.4 `get_pending_info`).
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub remaining_seconds: Option<f64>,
}

pub struct ApprovalCoordinator {
    store: Arc<dyn DocumentStore>,
    pending: Mutex<HashMap<ExecutionId, PendingRequest>>,
}

impl ApprovalCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, pending: Mutex::new(HashMap::new()) }
    }

    /// Create a new pending request, cancelling any prior one for the same
    /// execution. Returns a `watch::Receiver` the caller can `.wait_for`
    /// until the outcome is populated.
    pub async fn create_request(
        self: &Arc<Self>,
        execution_id: ExecutionId,
        message: impl Into<String>,
        timeout_seconds: Option<u64>,
        default_on_timeout: bool,
    ) -> watch::Receiver<Option<ApprovalOutcome>> {
        let message = message.into();
        let effective_timeout = timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let mut pending = self.pending.lock().await;
        if let Some(prior) = pending.remove(&execution_id) {
            prior.timeout_handle.abort();
        }

        let (outcome_tx, outcome_rx) = watch::channel(None);

        let timeout_handle = if effective_timeout > 0 {
            let this = Arc::clone(self);
            let execution_id = execution_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(effective_timeout)).await;
                let _ = this.resolve(&execution_id, default_on_timeout, ApprovalSource::Timeout).await;
            })
        } else {
            tokio::spawn(async {})
        };

        pending.insert(
            execution_id,
            PendingRequest {
                outcome_tx,
                message,
                created_at: chrono::Utc::now(),
                timeout_seconds: effective_timeout,
                timeout_handle,
            },
        );

        outcome_rx
    }

    /// Resolve a pending request. Succeeds only if one exists and is
    /// unresolved; the future completes exactly once (spec.md §4.4).
    pub async fn resolve(&self, execution_id: &ExecutionId, approved: bool, source: ApprovalSource) -> Result<bool, ApprovalError> {
        let mut pending = self.pending.lock().await;
        let Some(request) = pending.get(execution_id) else {
            return Ok(false);
        };
        if request.outcome_tx.borrow().is_some() {
            return Ok(false);
        }

        let action = if source == ApprovalSource::Timeout {
            ApprovalAction::Timeout
        } else if approved {
            ApprovalAction::Approved
        } else {
            ApprovalAction::Rejected
        };

        let record = ApprovalRecord {
            execution_id: execution_id.clone(),
            message: request.message.clone(),
            action,
            source,
            responded_at: chrono::Utc::now(),
            was_timeout: source == ApprovalSource::Timeout,
        };

        let request = pending.remove(execution_id).expect("checked above");
        request.timeout_handle.abort();
        let _ = request.outcome_tx.send(Some(ApprovalOutcome { approved, source }));
        drop(pending);

        info!(%execution_id, approved, ?source, "approval request resolved");

        // The resolution itself already succeeded; a failed audit-log write
        // doesn't roll it back, it's surfaced for the caller to handle.
        self.store.append_approval_record(&record).await?;

        Ok(true)
    }

    /// Teardown without recording (spec.md §5 cancellation: "resolves the
    /// future to `false` with source=`callback-cancel` and does not record
    /// an approval row").
    pub async fn cancel(&self, execution_id: &ExecutionId) {
        let mut pending = self.pending.lock().await;
        if let Some(request) = pending.remove(execution_id) {
            request.timeout_handle.abort();
            let _ = request.outcome_tx.send(Some(ApprovalOutcome { approved: false, source: ApprovalSource::Callback }));
            info!(%execution_id, "pending approval request cancelled");
        }
    }

    pub async fn has_pending(&self, execution_id: &ExecutionId) -> bool {
        self.pending.lock().await.contains_key(execution_id)
    }

    pub async fn get_pending_info(&self, execution_id: &ExecutionId) -> Option<PendingInfo> {
        let pending = self.pending.lock().await;
        let request = pending.get(execution_id)?;
        let elapsed = (chrono::Utc::now() - request.created_at).num_milliseconds() as f64 / 1000.0;
        let remaining = if request.timeout_seconds > 0 {
            Some((request.timeout_seconds as f64 - elapsed).max(0.0))
        } else {
            None
        };
        Some(PendingInfo {
            message: request.message.clone(),
            created_at: request.created_at,
            remaining_seconds: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn coordinator() -> Arc<ApprovalCoordinator> {
        Arc::new(ApprovalCoordinator::new(Arc::new(InMemoryStore::new())))
    }

    #[tokio::test]
    async fn resolve_before_timeout_succeeds_and_records_once() {
        let coord = coordinator();
        let id = ExecutionId::new();
        let mut rx = coord.create_request(id.clone(), "proceed?", Some(30), false).await;

        let resolved = coord.resolve(&id, true, ApprovalSource::Web).await.unwrap();
        assert!(resolved);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(ApprovalOutcome { approved: true, source: ApprovalSource::Web }));

        let records = coord.store.list_approval_records(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, ApprovalAction::Approved);
    }

    #[tokio::test]
    async fn second_resolve_after_first_fails() {
        let coord = coordinator();
        let id = ExecutionId::new();
        coord.create_request(id.clone(), "proceed?", Some(30), false).await;

        assert!(coord.resolve(&id, true, ApprovalSource::Web).await.unwrap());
        assert!(!coord.resolve(&id, false, ApprovalSource::Cli).await.unwrap());
    }

    #[tokio::test]
    async fn resolve_with_no_pending_request_returns_false() {
        let coord = coordinator();
        let id = ExecutionId::new();
        assert!(!coord.resolve(&id, true, ApprovalSource::Web).await.unwrap());
    }

    #[tokio::test]
    async fn new_request_cancels_prior_pending_request() {
        let coord = coordinator();
        let id = ExecutionId::new();
        let mut first_rx = coord.create_request(id.clone(), "first", Some(30), false).await;
        coord.create_request(id.clone(), "second", Some(30), false).await;

        // the first request's watch channel never resolves: it was replaced,
        // not cancelled-through-resolve, so no approval row is recorded for it.
        assert!(first_rx.has_changed().is_ok());
        assert_eq!(*first_rx.borrow_and_update(), None);

        assert!(coord.resolve(&id, true, ApprovalSource::Web).await.unwrap());
        let records = coord.store.list_approval_records(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "second");
    }

    #[tokio::test]
    async fn cancel_does_not_record_an_approval() {
        let coord = coordinator();
        let id = ExecutionId::new();
        let mut rx = coord.create_request(id.clone(), "proceed?", Some(30), false).await;
        coord.cancel(&id).await;
        rx.changed().await.unwrap();
        assert_eq!(
            *rx.borrow(),
            Some(ApprovalOutcome { approved: false, source: ApprovalSource::Callback })
        );
        assert!(coord.store.list_approval_records(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_resolves_to_default_and_records_timeout_action() {
        let coord = coordinator();
        let id = ExecutionId::new();
        let mut rx = coord.create_request(id.clone(), "proceed?", Some(0), false).await;
        // effective_timeout of exactly 0 disarms the timer per the original;
        // use a tiny positive timeout instead to exercise the timer path.
        drop(rx);
        let mut rx = coord.create_request(id.clone(), "proceed?", Some(1), false).await;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        rx.changed().await.unwrap();
        assert_eq!(
            *rx.borrow(),
            Some(ApprovalOutcome { approved: false, source: ApprovalSource::Timeout })
        );
    }
}
