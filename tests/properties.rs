//! The invariants, laws, and boundary behaviors spec.md §8 states directly,
//! to the extent they aren't already pinned down by a unit test closer to
//! the code they describe.

mod common;

use common::{harness, phase, template, ScenarioRegistry};
use conductor::model::{ArtifactType, FailureBehavior, PhaseRole, TriggerMode, WorkflowStatus, WorkflowTemplate};

#[test]
fn template_serialization_round_trips_phase_order_and_fields() {
    let t = template(
        "t1",
        vec![
            phase("b", 1, PhaseRole::Verifier, "model-b", "{task_description}", ArtifactType::VerificationReport, "/done", Some("a")),
            phase("a", 0, PhaseRole::Analyzer, "model-a", "{task_description}", ArtifactType::TaskList, "", Some("b")),
        ],
        FailureBehavior::FallbackProvider,
    );

    let json = serde_json::to_string(&t).unwrap();
    let round_tripped: WorkflowTemplate = serde_json::from_str(&json).unwrap();
    assert_eq!(t, round_tripped);
    assert_eq!(round_tripped.phases[0].id, "b");
    assert_eq!(round_tripped.phases[1].id, "a");
}

#[tokio::test]
async fn max_iterations_one_never_re_enters_the_sequencing_loop_even_when_a_phase_requests_iteration() {
    let h = harness(ScenarioRegistry::new().with_response("model-a", "no match here"));
    let mut iterating_phase = phase("a", 0, PhaseRole::Analyzer, "model-a", "{task_description}", ArtifactType::TaskList, "/done", None);
    iterating_phase.can_iterate = true;
    let mut t = template("t1", vec![iterating_phase], FailureBehavior::SkipPhase);
    t.max_iterations = 1;
    h.orchestrator.register_template(t).unwrap();

    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();

    // SkipPhase keeps the loop going despite the failed, iteration-eligible
    // phase, but max_iterations=1 must still stop it from looping back.
    assert_eq!(finished.status, WorkflowStatus::Completed);
    assert_eq!(finished.iteration, 1);
}

#[tokio::test]
async fn concurrent_resolves_of_the_same_request_produce_exactly_one_success_and_one_record() {
    let h = harness(ScenarioRegistry::new());
    h.orchestrator.register_template(template(
        "t1",
        vec![phase("a", 0, PhaseRole::Analyzer, "model-a", "{task_description}", ArtifactType::TaskList, "", None)],
        FailureBehavior::PauseNotify,
    )).unwrap();
    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();

    h.approvals.create_request(execution.id.clone(), "proceed?", Some(30), false).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let approvals = h.approvals.clone();
        let id = execution.id.clone();
        handles.push(tokio::spawn(async move { approvals.resolve(&id, i % 2 == 0, conductor::store::ApprovalSource::Web).await.unwrap() }));
    }
    let results: Vec<bool> = futures::future::join_all(handles).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(results.iter().filter(|&&ok| ok).count(), 1);

    let records = h.store.list_approval_records(&execution.id).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn sum_of_phase_costs_equals_the_execution_total_and_artifacts_reference_their_own_execution() {
    let h = harness(ScenarioRegistry::new().with_response("model-a", "first").with_response("model-b", "second"));
    h.orchestrator.register_template(template(
        "t1",
        vec![
            phase("a", 0, PhaseRole::Analyzer, "model-a", "{task_description}", ArtifactType::TaskList, "", None),
            phase("b", 1, PhaseRole::Implementer, "model-b", "{task_description}", ArtifactType::CodeDiff, "", None),
        ],
        FailureBehavior::PauseNotify,
    )).unwrap();
    let execution = h
        .orchestrator
        .create_execution(Some("t1"), TriggerMode::ManualTask, None, "/tmp/proj", "do the thing", None, false)
        .await
        .unwrap();
    let finished = h.orchestrator.run(&execution.id).await.unwrap();
    assert_eq!(finished.status, WorkflowStatus::Completed);

    let phase_executions = h.store.list_phase_executions(&finished.id).await.unwrap();
    let summed: f64 = phase_executions.iter().map(|pe| pe.cost_usd).sum();
    assert!((summed - finished.total_cost_usd).abs() < 1e-9);

    for artifact_id in &finished.artifact_ids {
        let artifact = h.artifacts.get(artifact_id).await.unwrap().unwrap();
        assert_eq!(artifact.workflow_execution_id, finished.id);
    }
}
