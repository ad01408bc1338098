use std::sync::Arc;

use loomflow::approval::{ApprovalKind, ApprovalResponse};
use loomflow::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use loomflow::config::EngineConfig;
use loomflow::engine::{
    EngineError, InvokeOptions, RecoveryError, RecoveryPhase, RunOutcome, WaitingFor,
};
use loomflow::machine::WorkflowNode;
use loomflow::state::WorkflowStatus;
use loomflow::worker::WorkerOutput;

mod common;
use common::*;

#[tokio::test]
async fn linear_pipeline_runs_to_completion() {
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["architect", "backend"]))
        .script("architect", ok_output("system design"))
        .script("backend", ok_output("api implemented"));
    let engine = engine(executor);

    let run = engine
        .invoke(input("build the api"), InvokeOptions::thread("t-linear"))
        .await
        .unwrap();

    assert_eq!(run.state.status, WorkflowStatus::Completed);
    assert!(matches!(run.outcome, RunOutcome::Completed));
    let roles: Vec<&str> = run
        .state
        .agent_outputs
        .iter()
        .map(|o| o.role.as_str())
        .collect();
    assert_eq!(roles, vec!["analyst", "architect", "backend"]);
    assert!(run.state.agent_outputs.iter().all(|o| o.success));
    assert!(run.state.completion_summary.is_some());
    assert!(!run.state.thinking_history.is_empty());
}

#[tokio::test]
async fn analysis_failure_is_terminal() {
    let executor = ScriptedExecutor::new().script_err("analyst", "cannot decompose");
    let engine = engine(executor);

    let run = engine
        .invoke(input("???"), InvokeOptions::thread("t-no-analysis"))
        .await
        .unwrap();

    assert_eq!(run.state.status, WorkflowStatus::Failed);
    assert!(run.state.analysis.is_none());
    assert!(run.state.failure.is_some());
}

#[tokio::test]
async fn worker_failure_retries_then_fails_within_budget() {
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script_err("backend", "connection refused");
    let engine = engine_with(
        executor,
        Arc::new(InMemoryCheckpointStore::new()),
        EngineConfig::default().with_max_retries(2),
    );

    let run = engine
        .invoke(input("build the api"), InvokeOptions::thread("t-retry"))
        .await
        .unwrap();

    assert_eq!(run.state.status, WorkflowStatus::Failed);
    assert_eq!(run.state.retry_count, 2);
    assert!(run.state.retry_count <= run.state.max_retries);
    // analyst + initial attempt + two retries
    assert_eq!(run.state.agent_outputs.len(), 4);
    let last = run.state.last_output().unwrap();
    assert!(!last.success);
    assert!(last.error.as_deref().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn thrown_and_reported_failures_behave_identically() {
    let thrown = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script_err("backend", "boom");
    let reported = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script("backend", WorkerOutput::failed("boom"));

    let run_thrown = engine(thrown)
        .invoke(input("x"), InvokeOptions::thread("t-thrown"))
        .await
        .unwrap();
    let run_reported = engine(reported)
        .invoke(input("x"), InvokeOptions::thread("t-reported"))
        .await
        .unwrap();

    assert_eq!(run_thrown.state.status, run_reported.state.status);
    assert_eq!(
        run_thrown.state.agent_outputs.len(),
        run_reported.state.agent_outputs.len()
    );
    assert_eq!(run_thrown.state.retry_count, run_reported.state.retry_count);
}

#[tokio::test]
async fn style_competition_with_partial_failure_offers_reduced_options() {
    let executor = ScriptedExecutor::new()
        .script(
            "analyst",
            analysis_with_competition(&["designer"], "designer", &["minimal", "bold", "noir"]),
        )
        .script("designer:minimal", ok_output("clean lines"))
        .script("designer:bold", ok_output("big type"))
        .script_err("designer:noir", "renderer crashed");
    let engine = engine(executor);

    let run = engine
        .invoke(input("design a landing page"), InvokeOptions::thread("t-comp"))
        .await
        .unwrap();

    // Fan-out recorded exactly one entry per target, failure isolated.
    let group: Vec<_> = run.state.agent_outputs.iter().skip(1).collect();
    assert_eq!(group.len(), 3);
    let group_id = group[0].group_id.clone().unwrap();
    assert!(group.iter().all(|o| o.group_id.as_deref() == Some(&*group_id)));
    let successes: Vec<bool> = group.iter().map(|o| o.success).collect();
    assert_eq!(successes, vec![true, true, false]);

    // Workflow proceeded to approval with the two surviving candidates.
    let request = run.pending_approval().expect("suspended on approval");
    assert_eq!(request.config.kind, ApprovalKind::StyleSelection);
    let option_ids: Vec<&str> = request.config.options.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(option_ids, vec!["minimal", "bold"]);
}

#[tokio::test]
async fn approved_selection_resumes_to_completion() {
    let executor = ScriptedExecutor::new()
        .script(
            "analyst",
            analysis_with_competition(&["designer"], "designer", &["minimal", "bold"]),
        )
        .script("designer:minimal", ok_output("clean"))
        .script("designer:bold", ok_output("loud"));
    let engine = engine(executor);

    let run = engine
        .invoke(input("design it"), InvokeOptions::thread("t-approve"))
        .await
        .unwrap();
    let request = run.pending_approval().expect("suspended on approval").clone();

    let resumed = engine
        .resume(
            "t-approve",
            ApprovalResponse::approved(&request.id, Some("bold".to_string())),
        )
        .await
        .unwrap();

    assert_eq!(resumed.state.status, WorkflowStatus::Completed);
    assert_eq!(resumed.state.style_iteration_count, 0);
}

#[tokio::test]
async fn fifth_rejection_with_cap_five_escalates_to_failure() {
    let executor = ScriptedExecutor::new()
        .script(
            "analyst",
            analysis_with_competition(&["designer"], "designer", &["minimal", "bold"]),
        )
        .script("designer:minimal", ok_output("clean"))
        .script("designer:bold", ok_output("loud"));
    let engine = engine_with(
        executor,
        Arc::new(InMemoryCheckpointStore::new()),
        EngineConfig::default().with_max_style_iterations(5),
    );

    let mut run = engine
        .invoke(input("design it"), InvokeOptions::thread("t-reject"))
        .await
        .unwrap();

    for iteration in 1..=5u32 {
        let request = run.pending_approval().expect("suspended on approval").clone();
        run = engine
            .resume(
                "t-reject",
                ApprovalResponse::rejected(&request.id, Some("try again".to_string())),
            )
            .await
            .unwrap();
        if iteration < 5 {
            assert!(run.pending_approval().is_some(), "round {iteration} should re-suspend");
        }
    }

    assert_eq!(run.state.status, WorkflowStatus::Failed);
    assert_eq!(run.state.style_iteration_count, 5);
    assert!(run.state.style_iteration_count <= run.state.max_style_iterations);
    assert!(!run.state.rejected_option_ids.is_empty());
}

#[tokio::test]
async fn invoking_a_suspended_thread_returns_the_same_pending_round() {
    let executor = ScriptedExecutor::new()
        .script(
            "analyst",
            analysis_with_competition(&["designer"], "designer", &["minimal", "bold"]),
        )
        .script("designer:minimal", ok_output("clean"))
        .script("designer:bold", ok_output("loud"));
    let engine = engine(executor);

    let first = engine
        .invoke(input("design it"), InvokeOptions::thread("t-reinvoke"))
        .await
        .unwrap();
    let first_id = first.pending_approval().unwrap().id.clone();

    let second = engine
        .invoke(input("design it"), InvokeOptions::thread("t-reinvoke"))
        .await
        .unwrap();
    assert_eq!(second.pending_approval().unwrap().id, first_id);
    assert_eq!(second.state.agent_outputs.len(), first.state.agent_outputs.len());
}

#[tokio::test]
async fn replaying_a_checkpoint_with_the_same_response_is_deterministic() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let executor = ScriptedExecutor::new()
        .script(
            "analyst",
            analysis_with_competition(&["designer"], "designer", &["minimal", "bold"]),
        )
        .script("designer:minimal", ok_output("clean"))
        .script("designer:bold", ok_output("loud"));
    let engine = engine_with(executor, store.clone(), EngineConfig::default());

    let run = engine
        .invoke(input("design it"), InvokeOptions::thread("t-replay"))
        .await
        .unwrap();
    let request = run.pending_approval().unwrap().clone();
    let checkpoint_id = store.list_by_thread("t-replay").await.unwrap()[0].id.clone();

    let first = engine
        .resume_at(
            "t-replay",
            &checkpoint_id,
            ApprovalResponse::approved(&request.id, Some("minimal".to_string())),
        )
        .await
        .unwrap();
    let second = engine
        .resume_at(
            "t-replay",
            &checkpoint_id,
            ApprovalResponse::approved(&request.id, Some("minimal".to_string())),
        )
        .await
        .unwrap();

    assert_eq!(first.state.status, second.state.status);
    assert_eq!(
        first.state.agent_outputs.len(),
        second.state.agent_outputs.len()
    );
}

#[tokio::test]
async fn resume_without_any_checkpoint_is_blocked_with_explicit_blockers() {
    let executor = ScriptedExecutor::new();
    let engine = engine(executor);

    let err = engine
        .resume("t-ghost", ApprovalResponse::approved("appr-x", None))
        .await
        .unwrap_err();

    match err {
        EngineError::Recovery(RecoveryError::Blocked { blockers }) => {
            assert!(blockers[0].contains("t-ghost"));
        }
        other => panic!("expected a blocked recovery, got {other:?}"),
    }
}

#[tokio::test]
async fn resume_of_a_completed_thread_is_blocked() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script("backend", ok_output("done"));
    let engine = engine_with(executor, store, EngineConfig::default());

    engine
        .invoke(input("build"), InvokeOptions::thread("t-done"))
        .await
        .unwrap();
    let err = engine
        .resume("t-done", ApprovalResponse::approved("appr-x", None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Recovery(RecoveryError::Blocked { .. })
    ));
}

#[tokio::test]
async fn restoring_a_checkpoint_from_another_thread_fails_validation() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script("backend", ok_output("done"));
    let engine = engine_with(executor, store.clone(), EngineConfig::default());

    engine
        .invoke(input("build"), InvokeOptions::thread("t-owner"))
        .await
        .unwrap();
    let foreign = store.list_by_thread("t-owner").await.unwrap()[0].id.clone();

    let err = engine
        .invoke(
            input("build"),
            InvokeOptions::thread("t-thief").at_checkpoint(&foreign),
        )
        .await
        .unwrap_err();

    match err {
        EngineError::Recovery(RecoveryError::Failed { phase, .. }) => {
            assert_eq!(phase, RecoveryPhase::Validation);
        }
        other => panic!("expected a validation-phase recovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn incoherent_counters_fail_recovery_in_the_agents_phase() {
    use loomflow::checkpoint::{Checkpoint, CheckpointTrigger};

    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut state = loomflow::state::WorkflowState::builder("t-bent", "prompt")
        .max_retries(1)
        .build();
    state.retry_count = 9;
    store
        .save(Checkpoint::capture(
            "ckpt-bent",
            CheckpointTrigger::Manual,
            "crafted",
            &state,
        ))
        .await
        .unwrap();

    let engine = engine_with(
        ScriptedExecutor::new(),
        store,
        EngineConfig::default(),
    );
    let err = engine
        .invoke(input("prompt"), InvokeOptions::thread("t-bent"))
        .await
        .unwrap_err();

    match err {
        EngineError::Recovery(RecoveryError::Failed { phase, .. }) => {
            assert_eq!(phase, RecoveryPhase::Agents);
        }
        other => panic!("expected an agents-phase recovery failure, got {other:?}"),
    }
}

#[tokio::test]
async fn interrupt_after_analyze_pauses_and_resumes_without_rerunning_analysis() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["architect"]))
        .script("architect", ok_output("design"));
    let engine = engine_with(
        executor,
        store,
        EngineConfig::default().with_interrupt_after(vec![WorkflowNode::Analyze]),
    );

    let paused = engine
        .invoke(input("build"), InvokeOptions::thread("t-interrupt"))
        .await
        .unwrap();
    match &paused.outcome {
        RunOutcome::Suspended(suspension) => {
            assert_eq!(suspension.node, WorkflowNode::Analyze);
            assert!(matches!(
                suspension.waiting_for,
                WaitingFor::Interrupt {
                    resume_at: WorkflowNode::Route
                }
            ));
        }
        other => panic!("expected an interrupt suspension, got {other:?}"),
    }
    assert!(paused.state.analysis.is_some());

    // Re-invoking restores the interrupt checkpoint and re-enters at
    // route; the analyze interrupt does not fire again.
    let resumed = engine
        .invoke(input("build"), InvokeOptions::thread("t-interrupt"))
        .await
        .unwrap();

    assert_eq!(resumed.state.status, WorkflowStatus::Completed);
    let analyst_runs = resumed
        .state
        .agent_outputs
        .iter()
        .filter(|o| o.role == "analyst")
        .count();
    assert_eq!(analyst_runs, 1);
}

#[tokio::test]
async fn suggested_next_role_overrides_the_queue() {
    let executor = ScriptedExecutor::new()
        .script("analyst", analysis_output(&["backend"]))
        .script(
            "backend",
            ok_output_with_hints(
                "api done, needs review",
                loomflow::state::RoutingHints {
                    needs_approval: false,
                    has_failures: false,
                    suggested_next: vec!["reviewer".to_string()],
                },
            ),
        )
        .script("reviewer", ok_output("looks good"));
    let engine = engine(executor);

    let run = engine
        .invoke(input("build the api"), InvokeOptions::thread("t-suggest"))
        .await
        .unwrap();

    assert_eq!(run.state.status, WorkflowStatus::Completed);
    let roles: Vec<&str> = run
        .state
        .agent_outputs
        .iter()
        .map(|o| o.role.as_str())
        .collect();
    assert_eq!(roles, vec!["analyst", "backend", "reviewer"]);
}
