use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::json;

use loomflow::checkpoint::{Checkpoint, CheckpointTrigger, persistence};
use loomflow::decision::{DispatchTarget, parse_decision};
use loomflow::dispatch::{DispatchCoordinator, DispatchJob};
use loomflow::state::WorkflowState;
use loomflow::worker::{
    AcceptAllValidator, WorkerError, WorkerOutput, WorkerRequest, WorkerExecutor,
};

/// Succeeds for roles prefixed `ok`, fails for everything else.
struct PatternExecutor;

#[async_trait]
impl WorkerExecutor for PatternExecutor {
    async fn execute(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        if request.role.starts_with("ok") {
            Ok(WorkerOutput::ok(json!({"role": request.role})))
        } else {
            Err(WorkerError::Failed {
                role: request.role,
                message: "scripted failure".to_string(),
            })
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A fan-out of N targets yields exactly N results, in target order,
    /// with per-target failures isolated — for every success pattern.
    #[test]
    fn fanout_always_returns_exactly_n_results(
        pattern in proptest::collection::vec(any::<bool>(), 1..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (tx, _rx) = flume::unbounded();
            let coordinator = DispatchCoordinator::new(
                Arc::new(PatternExecutor),
                Arc::new(AcceptAllValidator),
                3,
                tx,
            );
            let targets: Vec<DispatchTarget> = pattern
                .iter()
                .enumerate()
                .map(|(i, ok)| {
                    let prefix = if *ok { "ok" } else { "bad" };
                    DispatchTarget::role(format!("{prefix}-{i}"))
                })
                .collect();

            let results = coordinator
                .dispatch(
                    &DispatchJob {
                        thread_id: "t-prop".to_string(),
                        task: "task".to_string(),
                        context: json!({}),
                    },
                    &targets,
                )
                .await;

            prop_assert_eq!(results.len(), pattern.len());
            for (result, expected_ok) in results.iter().zip(&pattern) {
                prop_assert_eq!(result.success, *expected_ok);
                prop_assert_eq!(result.error.is_some(), !*expected_ok);
            }
            Ok(())
        })?;
    }

    /// Sealed snapshots always unseal back to an equivalent state and
    /// pass the integrity check.
    #[test]
    fn checkpoint_round_trip_holds_for_arbitrary_states(
        prompt in ".{0,64}",
        retries in 0u32..10,
        iterations in 0u32..10,
    ) {
        let mut state = WorkflowState::builder("t-prop-ckpt", prompt)
            .max_retries(retries.max(1))
            .max_style_iterations(iterations.max(1))
            .build();
        state.rejected_option_ids = vec!["opt-a".to_string()];

        let checkpoint =
            Checkpoint::capture("ckpt-prop", CheckpointTrigger::Manual, "prop", &state);
        let envelope = persistence::seal(&checkpoint).unwrap();
        let restored = persistence::unseal(&envelope).unwrap();
        prop_assert_eq!(restored.state, state);
    }

    /// Parsed confidence is always inside [0, 1] when present.
    #[test]
    fn parsed_confidence_is_always_clamped(
        confidence in any::<f64>().prop_filter("finite", |f| f.is_finite()),
    ) {
        let decision = parse_decision(&json!({
            "action": "complete",
            "confidence": confidence,
        }))
        .unwrap();
        if let Some(value) = decision.confidence {
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
