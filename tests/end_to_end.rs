//! End-to-end scenarios exercising the full orchestrator → phase runner →
//! budget/approval/artifact stack together, through the public API only.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{harness, phase, template, ScenarioRegistry};
use conductor::event_bus::{EventHandler, WorkflowEvent};
use conductor::model::{ArtifactType, FailureBehavior, PhaseRole, PhaseStatus, TriggerMode, WorkflowStatus};
use conductor::store::ApprovalSource;

#[tokio::test]
async fn single_phase_success_publishes_one_artifact_with_the_raw_output() {
    let h = harness(ScenarioRegistry::new().with_response("analyzer-model", "ok /done"));
    h.orchestrator.register_template(template(
        "t1",
        vec![phase("a", 0, PhaseRole::Analyzer, "analyzer-model", "{task_description}", ArtifactType::TaskList, "/done", None)],
        FailureBehavior::PauseNotify,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert_eq!(finished.artifact_ids.len(), 1);
    let artifact = h.artifacts.get(&finished.artifact_ids[0]).await.unwrap().unwrap();
    assert_eq!(artifact.content, "ok /done");
    assert_eq!(artifact.artifact_type, ArtifactType::TaskList);
}

/// spec.md §8 scenario 2, literally: a phase failing under the default
/// `PAUSE_NOTIFY` behavior fails the execution outright.
#[tokio::test]
async fn pattern_mismatch_fails_the_execution_and_records_the_phase_failure() {
    let h = harness(ScenarioRegistry::new().with_response("analyzer-model", "ok"));
    h.orchestrator.register_template(template(
        "t1",
        vec![phase("a", 0, PhaseRole::Analyzer, "analyzer-model", "{task_description}", ArtifactType::TaskList, "/done", None)],
        FailureBehavior::PauseNotify,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    assert_eq!(finished.status, WorkflowStatus::Failed);
    let phase_executions = h.store.list_phase_executions(&finished.id).await.unwrap();
    assert_eq!(phase_executions.len(), 1);
    assert_eq!(phase_executions[0].status, PhaseStatus::Failed);
    assert_eq!(phase_executions[0].error_message.as_deref(), Some("Success pattern not found in output"));
}

#[tokio::test]
async fn second_phase_receives_the_first_phases_artifact_content_by_name() {
    // model-b carries no fixed response, so MockProvider echoes whatever
    // prompt it actually received — the most direct way to observe the
    // placeholder substitution rather than inferring it indirectly.
    let h = harness(ScenarioRegistry::new().with_response("model-a", "42"));
    h.orchestrator.register_template(template(
        "t2",
        vec![
            phase("a", 0, PhaseRole::Analyzer, "model-a", "{task_description}", ArtifactType::TaskList, "", None),
            phase("b", 1, PhaseRole::Implementer, "model-b", "x={artifact:a}", ArtifactType::CodeDiff, "", None),
        ],
        FailureBehavior::PauseNotify,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t2"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    assert_eq!(finished.status, WorkflowStatus::Completed);
    let phase_executions = h.store.list_phase_executions(&finished.id).await.unwrap();
    let b = phase_executions.iter().find(|pe| pe.phase_id == "b").unwrap();
    let artifact = h.artifacts.get(b.output_artifact_id.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(artifact.content, "echo: x=42");
}

#[tokio::test]
async fn post_debit_budget_overrun_terminates_the_execution_but_keeps_the_artifact() {
    let h = harness(ScenarioRegistry::new().with_response("expensive-model", "x".repeat(20_000).as_str()));
    h.orchestrator.register_template(template(
        "t1",
        vec![phase("a", 0, PhaseRole::Analyzer, "expensive-model", "{task_description}", ArtifactType::TaskList, "", None)],
        FailureBehavior::PauseNotify,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", Some(0.001), false)
        .await
        .unwrap();
    h.budget.set_limit(conductor::model::BudgetScope::Execution, execution.id.as_str(), Some(0.001)).await.unwrap();

    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    assert_eq!(finished.status, WorkflowStatus::BudgetExceeded);
    assert_eq!(finished.artifact_ids.len(), 1, "the phase's own output is still persisted");
    let artifact = h.artifacts.get(&finished.artifact_ids[0]).await.unwrap();
    assert!(artifact.is_some());
}

#[tokio::test]
async fn approval_timeout_then_resolve_logs_both_and_resume_completes() {
    let h = harness(ScenarioRegistry::new().with_response("implementer-model", "done"));
    h.orchestrator.register_template(template(
        "t1",
        vec![phase("a", 0, PhaseRole::Implementer, "implementer-model", "{task_description}", ArtifactType::CodeDiff, "", None)],
        FailureBehavior::PauseNotify,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, true)
        .await
        .unwrap();

    let orch = Arc::new(h.orchestrator);
    let execution_id = execution.id.clone();
    let orch_for_run = orch.clone();
    let run_handle = tokio::spawn(async move { orch_for_run.run(&execution_id).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orch.approvals().has_pending(&execution.id).await);
    // simulate the 30s-out timeout firing with default_on_timeout=false,
    // rather than actually waiting it out.
    orch.approvals().resolve(&execution.id, false, ApprovalSource::Timeout).await.unwrap();
    let paused = run_handle.await.unwrap().unwrap();
    assert_eq!(paused.status, WorkflowStatus::Paused);

    let execution_id = execution.id.clone();
    let orch_for_resume = orch.clone();
    let resume_handle = tokio::spawn(async move { orch_for_resume.resume(&execution_id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orch.approvals().has_pending(&execution.id).await);
    orch.approvals().resolve(&execution.id, true, ApprovalSource::Web).await.unwrap();
    let finished = resume_handle.await.unwrap().unwrap();
    assert_eq!(finished.status, WorkflowStatus::Completed);

    let records = h.store.list_approval_records(&execution.id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.action == conductor::store::ApprovalAction::Timeout));
    assert!(records.iter().any(|r| r.action == conductor::store::ApprovalAction::Approved));
}

#[tokio::test]
async fn subscribing_after_the_execution_exists_immediately_receives_an_init_snapshot() {
    struct RecordingHandler(Arc<std::sync::Mutex<Vec<WorkflowEvent>>>);
    #[async_trait::async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    let h = harness(ScenarioRegistry::new().with_response("analyzer-model", "ok /done"));
    h.orchestrator
        .register_template(template(
            "t1",
            vec![phase("a", 0, PhaseRole::Analyzer, "analyzer-model", "{task_description}", ArtifactType::TaskList, "/done", None)],
            FailureBehavior::PauseNotify,
        ))
        .unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    h.events.subscribe(execution.id.clone(), Arc::new(RecordingHandler(seen.clone()))).await;

    let events = seen.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], WorkflowEvent::Init { execution: e, .. } if e.id == execution.id));
}

#[tokio::test]
async fn parallel_group_reports_failed_as_the_worst_outcome_and_emits_both_completions() {
    let h = harness(ScenarioRegistry::new().with_response("model-p1", "ok"));
    h.orchestrator.register_template(template(
        "t1",
        vec![
            phase("p1", 0, PhaseRole::Analyzer, "model-p1", "{task_description}", ArtifactType::TaskList, "", Some("p2")),
            phase("p2", 0, PhaseRole::Analyzer, "model-p2", "{task_description}", ArtifactType::TaskList, "/never-appears", Some("p1")),
        ],
        FailureBehavior::SkipPhase,
    )).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    // SkipPhase turns the group's worst outcome (Failed) into a recorded
    // Skipped phase and lets the execution run to completion.
    assert_eq!(finished.status, WorkflowStatus::Completed);
    let phase_executions = h.store.list_phase_executions(&finished.id).await.unwrap();
    assert_eq!(phase_executions.len(), 2);
    assert!(phase_executions.iter().any(|pe| pe.phase_id == "p1" && pe.status == PhaseStatus::Completed));
    assert!(phase_executions.iter().any(|pe| pe.phase_id == "p2" && pe.status == PhaseStatus::Skipped));
}
