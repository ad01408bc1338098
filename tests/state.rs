use serde_json::json;

use loomflow::decision::{DecisionAction, OrchestratorDecision};
use loomflow::state::{
    AgentOutput, Analysis, Complexity, RoutingHints, ThinkingTrigger, WorkflowState,
    WorkflowStatus,
};

fn output(role: &str, success: bool) -> AgentOutput {
    AgentOutput {
        role: role.to_string(),
        success,
        output: json!({"result": role}),
        routing_hints: RoutingHints::default(),
        duration_ms: 3,
        error: None,
        group_id: None,
        style: None,
    }
}

#[test]
fn builder_sets_identity_and_caps() {
    let state = WorkflowState::builder("t-b", "prompt")
        .task_id("task-1")
        .tenant_id("acme")
        .project_id("proj-1")
        .max_retries(7)
        .max_style_iterations(2)
        .build();

    assert_eq!(state.thread_id, "t-b");
    assert_eq!(state.tenant_id, "acme");
    assert_eq!(state.status, WorkflowStatus::Pending);
    assert_eq!(state.max_retries, 7);
    assert_eq!(state.max_style_iterations, 2);
    assert_eq!(state.last_trigger, ThinkingTrigger::Initial);
}

#[test]
fn thinking_steps_are_monotonic_and_append_only() {
    let mut state = WorkflowState::builder("t-think", "prompt").build();
    for trigger in [
        ThinkingTrigger::Initial,
        ThinkingTrigger::AgentCompleted,
        ThinkingTrigger::ApprovalReceived,
    ] {
        state.record_thinking(
            trigger,
            OrchestratorDecision::new(DecisionAction::Wait, "thinking"),
        );
    }

    let steps: Vec<u64> = state.thinking_history.iter().map(|s| s.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
    assert_eq!(state.step, 3);
    assert_eq!(state.thinking_history[1].trigger, ThinkingTrigger::AgentCompleted);
}

#[test]
fn group_outputs_preserve_completion_order() {
    let mut state = WorkflowState::builder("t-group", "prompt").build();
    let mut a = output("designer", true);
    a.group_id = Some("g1".to_string());
    a.style = Some("bold".to_string());
    let mut b = output("designer", false);
    b.group_id = Some("g1".to_string());
    state.record_output(output("analyst", true));
    state.record_output(a);
    state.record_output(b);

    assert_eq!(state.last_group_id(), Some("g1"));
    let group = state.group_outputs("g1");
    assert_eq!(group.len(), 2);
    assert!(group[0].success);
    assert!(!group[1].success);
}

#[test]
fn full_state_survives_a_serde_round_trip() {
    let mut state = WorkflowState::builder("t-serde", "prompt")
        .task_id("task-9")
        .build();
    state.status = WorkflowStatus::Executing;
    state.analysis = Analysis::from_value(&json!({
        "summary": "plan",
        "complexity": "high",
        "planned_roles": ["architect"],
        "competitions": {"designer": ["a", "b"]},
    }));
    state.agent_queue.push_back("architect".to_string());
    state.record_output(output("analyst", true));
    state.record_thinking(
        ThinkingTrigger::AgentCompleted,
        OrchestratorDecision::new(DecisionAction::Complete, "done").with_confidence(0.4),
    );
    state.rejected_option_ids.push("opt-a".to_string());

    let raw = serde_json::to_string(&state).unwrap();
    let back: WorkflowState = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, state);
}

#[test]
fn analysis_parses_structured_objects() {
    let analysis = Analysis::from_value(&json!({
        "summary": "split into design and build",
        "complexity": "Medium",
        "roles": ["architect", "backend"],
        "competitions": {"designer": ["minimal", "bold"]},
    }))
    .unwrap();

    assert_eq!(analysis.complexity, Some(Complexity::Medium));
    assert_eq!(analysis.planned_roles, vec!["architect", "backend"]);
    assert_eq!(
        analysis.competitions.get("designer").unwrap(),
        &vec!["minimal".to_string(), "bold".to_string()]
    );
}

#[test]
fn analysis_accepts_bare_text_and_refuses_junk() {
    let text = Analysis::from_value(&json!("just a summary")).unwrap();
    assert_eq!(text.summary, "just a summary");
    assert!(text.planned_roles.is_empty());

    assert!(Analysis::from_value(&json!(42)).is_none());
    assert!(Analysis::from_value(&json!({})).is_none());
    assert!(Analysis::from_value(&json!("   ")).is_none());
}

#[test]
fn cap_helpers_track_their_counters() {
    let mut state = WorkflowState::builder("t-caps", "prompt")
        .max_retries(1)
        .max_style_iterations(1)
        .build();
    assert!(!state.retries_exhausted());
    assert!(!state.rejections_exhausted());

    state.retry_count = 1;
    state.style_iteration_count = 1;
    assert!(state.retries_exhausted());
    assert!(state.rejections_exhausted());

    let summary = state.summarize();
    assert!(summary.contains("retries=1/1"));
    assert!(summary.contains("rejections=1/1"));
}
