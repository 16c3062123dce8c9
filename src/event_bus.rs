//! Event Bus (spec.md §4.7): per-execution multiplexed publisher of typed
//! lifecycle events. Grounded on `original_source/src/workflow/api.py`'s
//! `WorkflowWebSocketManager.broadcast`: iterate subscribers, push, drop any
//! that fail — no backpressure, no retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalCoordinator;
use crate::model::{ExecutionId, WorkflowStatus};
use crate::store::{ApprovalSource, DocumentStore};

/// Typed envelope broadcast on the bus (spec.md §4.1 "Event contract",
/// §6 "Event stream"). Serializes to the newline-delimited JSON `{type,
/// ...}` shape transport adapters expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Snapshot sent to a newly attached subscriber: current execution,
    /// pending approval if any, and the latest todos forwarded from an
    /// SDK-style provider.
    Init {
        execution: Box<crate::model::WorkflowExecution>,
        pending_approval: Option<PendingApprovalSnapshot>,
        todos: Vec<serde_json::Value>,
    },
    StatusUpdate { status: WorkflowStatus },
    PhaseStart { phase_id: String, name: String },
    PhaseOutput { phase_id: String, content_chunk: String },
    PhaseComplete { phase_id: String, status: crate::model::PhaseStatus },
    ApprovalNeeded { message: String, timeout_seconds: u64 },
    ApprovalResolved { approved: bool, source: ApprovalSource },
    /// Opaque passthrough: the core doesn't interpret SDK todo structures,
    /// it only forwards what the provider reported.
    TodoUpdate { todos: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApprovalSnapshot {
    pub message: String,
    pub remaining_seconds: Option<f64>,
}

/// A bus subscriber. Handlers that return `Err` are dropped from the set on
/// their next failed delivery, mirroring the original's disconnect-on-error
/// websocket behavior.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &WorkflowEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Builds the `init` snapshot a newly attached subscriber receives. Grounded
/// on `original_source/src/workflow/api.py`'s `workflow_websocket` route,
/// which assembles `init_data` from the orchestrator's execution record, the
/// approval manager's pending request, and the todo sync manager — the
/// event bus itself stays storage-agnostic, so this is a thin adapter the
/// orchestrator wires in rather than the bus reaching into stores directly.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self, execution_id: &ExecutionId) -> Option<WorkflowEvent>;
}

/// The production [`SnapshotSource`]: current execution plus pending
/// approval. `todos` is always empty — nothing in this crate produces SDK
/// todo updates, so there is never a snapshot to forward.
pub struct StoreSnapshotSource {
    store: Arc<dyn DocumentStore>,
    approvals: Arc<ApprovalCoordinator>,
}

impl StoreSnapshotSource {
    pub fn new(store: Arc<dyn DocumentStore>, approvals: Arc<ApprovalCoordinator>) -> Self {
        Self { store, approvals }
    }
}

#[async_trait]
impl SnapshotSource for StoreSnapshotSource {
    async fn snapshot(&self, execution_id: &ExecutionId) -> Option<WorkflowEvent> {
        let execution = self.store.get_execution(execution_id).await.ok()??;
        let pending_approval = self.approvals.get_pending_info(execution_id).await.map(|info| PendingApprovalSnapshot {
            message: info.message,
            remaining_seconds: info.remaining_seconds,
        });
        Some(WorkflowEvent::Init { execution: Box::new(execution), pending_approval, todos: Vec::new() })
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<ExecutionId, Vec<Subscriber>>,
    next_id: AtomicU64,
    snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    /// Registers `handler` and, if a snapshot source is configured and the
    /// execution exists, immediately sends it an `init` event (spec.md §4.7
    /// "a snapshot emitted when a new subscriber attaches") before it joins
    /// the broadcast set — re-subscribing (a fresh call with a new handler)
    /// gets a fresh `init` the same way the first subscription did.
    pub async fn subscribe(&self, execution_id: ExecutionId, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        if let Some(source) = &self.snapshot_source {
            if let Some(init) = source.snapshot(&execution_id).await {
                let _ = handler.handle(&init).await;
            }
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(execution_id)
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    pub fn unsubscribe(&self, execution_id: &ExecutionId, id: SubscriptionId) {
        if let Some(mut subs) = self.subscribers.get_mut(execution_id) {
            subs.retain(|s| s.id != id);
        }
    }

    /// Best-effort, non-blocking, FIFO per execution from the broadcaster's
    /// point of view (spec.md §4.7, §5 "Ordering guarantees").
    pub async fn broadcast(&self, execution_id: &ExecutionId, event: WorkflowEvent) {
        let Some(mut subs) = self.subscribers.get_mut(execution_id) else {
            return;
        };
        let mut alive = Vec::with_capacity(subs.len());
        for sub in subs.drain(..) {
            if sub.handler.handle(&event).await.is_ok() {
                alive.push(sub);
            }
        }
        *subs = alive;
    }

    pub fn has_subscribers(&self, execution_id: &ExecutionId) -> bool {
        self.subscribers.get(execution_id).is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _event: &WorkflowEvent) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _event: &WorkflowEvent) -> anyhow::Result<()> {
            anyhow::bail!("disconnected")
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_subscribers() {
        let bus = EventBus::new();
        let id = ExecutionId::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(id.clone(), Arc::new(CountingHandler { count: count.clone() })).await;
        bus.subscribe(id.clone(), Arc::new(CountingHandler { count: count.clone() })).await;

        bus.broadcast(&id, WorkflowEvent::StatusUpdate { status: WorkflowStatus::Running }).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_is_dropped_after_one_failure() {
        let bus = EventBus::new();
        let id = ExecutionId::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(id.clone(), Arc::new(FailingHandler)).await;
        bus.subscribe(id.clone(), Arc::new(CountingHandler { count: count.clone() })).await;

        bus.broadcast(&id, WorkflowEvent::StatusUpdate { status: WorkflowStatus::Running }).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.has_subscribers(&id));

        bus.broadcast(&id, WorkflowEvent::StatusUpdate { status: WorkflowStatus::Completed }).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let id = ExecutionId::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub_id = bus.subscribe(id.clone(), Arc::new(CountingHandler { count: count.clone() })).await;
        bus.unsubscribe(&id, sub_id);

        bus.broadcast(&id, WorkflowEvent::StatusUpdate { status: WorkflowStatus::Running }).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn has_subscribers_false_when_no_one_subscribed() {
        let bus = EventBus::new();
        let id = ExecutionId::new();
        assert!(!bus.has_subscribers(&id));
    }

    #[tokio::test]
    async fn subscribe_with_no_snapshot_source_sends_nothing_extra() {
        let bus = EventBus::new();
        let id = ExecutionId::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct RecordingHandler(Arc<std::sync::Mutex<Vec<WorkflowEvent>>>);
        #[async_trait]
        impl EventHandler for RecordingHandler {
            async fn handle(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(event.clone());
                Ok(())
            }
        }

        bus.subscribe(id, Arc::new(RecordingHandler(seen.clone()))).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribe_with_a_snapshot_source_sends_init_before_any_broadcast() {
        use crate::model::{TemplateId, TriggerMode};
        use crate::store::InMemoryStore;

        struct RecordingHandler(Arc<std::sync::Mutex<Vec<WorkflowEvent>>>);
        #[async_trait]
        impl EventHandler for RecordingHandler {
            async fn handle(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(event.clone());
                Ok(())
            }
        }

        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let approvals = Arc::new(ApprovalCoordinator::new(store.clone()));
        let execution = crate::model::WorkflowExecution::new(
            TemplateId::from("t1".to_string()),
            "template-t1",
            None,
            "/tmp/proj",
            "do the thing",
            TriggerMode::ManualTask,
            None,
            false,
        );
        store.put_execution(&execution).await.unwrap();

        let bus = EventBus::new().with_snapshot_source(Arc::new(StoreSnapshotSource::new(store, approvals)));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.subscribe(execution.id.clone(), Arc::new(RecordingHandler(seen.clone()))).await;
        bus.broadcast(&execution.id, WorkflowEvent::StatusUpdate { status: WorkflowStatus::Running }).await;

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], WorkflowEvent::Init { execution: e, pending_approval: None, .. } if e.id == execution.id));
        assert!(matches!(&events[1], WorkflowEvent::StatusUpdate { status: WorkflowStatus::Running }));
    }

    #[tokio::test]
    async fn resubscribing_sends_a_fresh_init_each_time() {
        use crate::model::{TemplateId, TriggerMode};
        use crate::store::InMemoryStore;

        struct RecordingHandler(Arc<std::sync::Mutex<Vec<WorkflowEvent>>>);
        #[async_trait]
        impl EventHandler for RecordingHandler {
            async fn handle(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(event.clone());
                Ok(())
            }
        }

        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let approvals = Arc::new(ApprovalCoordinator::new(store.clone()));
        let execution = crate::model::WorkflowExecution::new(
            TemplateId::from("t1".to_string()),
            "template-t1",
            None,
            "/tmp/proj",
            "do the thing",
            TriggerMode::ManualTask,
            None,
            false,
        );
        store.put_execution(&execution).await.unwrap();

        let bus = EventBus::new().with_snapshot_source(Arc::new(StoreSnapshotSource::new(store, approvals)));

        let first_seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.subscribe(execution.id.clone(), Arc::new(RecordingHandler(first_seen.clone()))).await;
        assert_eq!(first_seen.lock().unwrap().len(), 1);

        let second_seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        bus.subscribe(execution.id.clone(), Arc::new(RecordingHandler(second_seen.clone()))).await;
        let second = second_seen.lock().unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], WorkflowEvent::Init { .. }));
    }
}
