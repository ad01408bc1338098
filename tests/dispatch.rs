use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use loomflow::decision::DispatchTarget;
use loomflow::dispatch::{DispatchCoordinator, DispatchJob};
use loomflow::worker::{
    AcceptAllValidator, WorkerError, WorkerOutput, WorkerRequest, WorkerExecutor,
};

mod common;
use common::*;

fn job(thread: &str) -> DispatchJob {
    DispatchJob {
        thread_id: thread.to_string(),
        task: "do the thing".to_string(),
        context: json!({}),
    }
}

fn coordinator(executor: impl WorkerExecutor + 'static, bound: usize) -> DispatchCoordinator {
    let (tx, _rx) = flume::unbounded();
    DispatchCoordinator::new(Arc::new(executor), Arc::new(AcceptAllValidator), bound, tx)
}

#[tokio::test]
async fn fanout_returns_one_result_per_target_in_order() {
    let executor = ScriptedExecutor::new()
        .script("a", ok_output("alpha"))
        .script_err("b", "b exploded")
        .script("c", ok_output("gamma"))
        .script_err("d", "d exploded");
    let coordinator = coordinator(executor, 8);

    let targets = vec![
        DispatchTarget::role("a"),
        DispatchTarget::role("b"),
        DispatchTarget::role("c"),
        DispatchTarget::role("d"),
    ];
    let results = coordinator.dispatch(&job("t-iso"), &targets).await;

    assert_eq!(results.len(), 4);
    let roles: Vec<&str> = results.iter().map(|r| r.agent_id.as_str()).collect();
    assert_eq!(roles, vec!["a", "b", "c", "d"]);
    let successes: Vec<bool> = results.iter().map(|r| r.success).collect();
    assert_eq!(successes, vec![true, false, true, false]);
    assert!(results[1].error.as_deref().unwrap().contains("b exploded"));
    // One failure never cancels siblings.
    assert!(results[2].success);

    let mut execution_ids: Vec<&str> =
        results.iter().map(|r| r.execution_id.as_str()).collect();
    execution_ids.sort_unstable();
    execution_ids.dedup();
    assert_eq!(execution_ids.len(), 4);
}

#[tokio::test]
async fn single_target_is_the_degenerate_case_without_a_group() {
    let executor = ScriptedExecutor::new().script("solo", ok_output("done"));
    let coordinator = coordinator(executor, 4);

    let results = coordinator
        .dispatch(&job("t-solo"), &[DispatchTarget::role("solo")])
        .await;

    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(results[0].group_id, None);
}

#[tokio::test]
async fn fanout_members_share_a_group_id() {
    let executor = ScriptedExecutor::new()
        .script("x", ok_output("1"))
        .script("y", ok_output("2"));
    let coordinator = coordinator(executor, 4);

    let results = coordinator
        .dispatch(
            &job("t-group"),
            &[DispatchTarget::role("x"), DispatchTarget::role("y")],
        )
        .await;

    let group = results[0].group_id.clone().expect("fan-out has a group id");
    assert!(results.iter().all(|r| r.group_id.as_deref() == Some(&*group)));
}

struct GaugeExecutor {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl WorkerExecutor for GaugeExecutor {
    async fn execute(&self, _request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(WorkerOutput::ok(json!({"ok": true})))
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_semaphore_bound() {
    let executor = GaugeExecutor {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    };
    // Keep a handle on the gauges through the Arc the coordinator owns.
    let executor = Arc::new(executor);
    let (tx, _rx) = flume::unbounded();
    let coordinator =
        DispatchCoordinator::new(executor.clone(), Arc::new(AcceptAllValidator), 2, tx);

    let targets: Vec<DispatchTarget> = (0..6)
        .map(|i| DispatchTarget::role(format!("worker-{i}")))
        .collect();
    let results = coordinator.dispatch(&job("t-bound"), &targets).await;

    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|r| r.success));
    assert!(executor.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn guardrail_rejection_downgrades_only_the_offending_result() {
    let executor = ScriptedExecutor::new()
        .script("clean", ok_output("fine"))
        .script("dirty", ok_output("forbidden content"));
    let (tx, _rx) = flume::unbounded();
    let coordinator = DispatchCoordinator::new(
        Arc::new(executor),
        Arc::new(ForbiddenWordValidator),
        4,
        tx,
    );

    let results = coordinator
        .dispatch(
            &job("t-guard"),
            &[DispatchTarget::role("clean"), DispatchTarget::role("dirty")],
        )
        .await;

    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[1].error.as_deref().unwrap().contains("guardrail"));
}

#[tokio::test]
async fn styles_are_carried_through_to_results() {
    let executor = ScriptedExecutor::new()
        .script("designer:minimal", ok_output("clean"))
        .script("designer:bold", ok_output("loud"));
    let coordinator = coordinator(executor, 4);

    let results = coordinator
        .dispatch(
            &job("t-style"),
            &[
                DispatchTarget::role("designer").with_style("minimal"),
                DispatchTarget::role("designer").with_style("bold"),
            ],
        )
        .await;

    let styles: Vec<Option<&str>> = results.iter().map(|r| r.style.as_deref()).collect();
    assert_eq!(styles, vec![Some("minimal"), Some("bold")]);
}
