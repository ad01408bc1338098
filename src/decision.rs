//! The routing decision model and its boundary parser.
//!
//! [`OrchestratorDecision`] is the sole output contract of the thinking
//! router: the engine only branches on [`DecisionAction`] and applies the
//! decision's consequences. The internal types here are strict; all
//! leniency toward loosely structured external input (a worker or policy
//! engine returning JSON) is confined to [`parse_decision`], which maps
//! that input into the strict types or a typed parse error. Nothing past
//! the boundary function defaults or coerces.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::approval::ApprovalConfig;

/// What the engine should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Run a single worker.
    Dispatch,
    /// Fan out to several workers concurrently.
    ParallelDispatch,
    /// Suspend for a human decision.
    Approval,
    /// The task is done.
    Complete,
    /// Terminal failure.
    Fail,
    /// Nothing to do right now (e.g. waiting on an external signal).
    Wait,
}

impl DecisionAction {
    /// Stable string form used in persisted thinking steps and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::ParallelDispatch => "parallel_dispatch",
            Self::Approval => "approval",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One worker the decision wants to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchTarget {
    /// Worker role, e.g. `architect`, `designer`, `backend`, `reviewer`.
    pub role: String,
    /// Style variant for competition fan-outs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Relative priority; advisory, higher runs earlier when queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Context references resolved by the executor's context collaborator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_refs: Vec<String>,
}

impl DispatchTarget {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            style: None,
            priority: None,
            context_refs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    #[must_use]
    pub fn with_context_refs(mut self, refs: Vec<String>) -> Self {
        self.context_refs = refs;
        self
    }
}

/// Structured output of one routing decision.
///
/// Appended to the thinking history as part of a
/// [`ThinkingStep`](crate::state::ThinkingStep) before it is acted on, so
/// the audit trail is sufficient to reconstruct why each transition
/// happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorDecision {
    /// Routing rationale in prose.
    pub reasoning: String,
    pub action: DecisionAction,
    /// Workers to run for `Dispatch` / `ParallelDispatch`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<DispatchTarget>,
    /// Mapping of context keys to sources, forwarded to the executor.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub context_mapping: FxHashMap<String, String>,
    /// Round configuration for the `Approval` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalConfig>,
    /// Failure description for the `Fail` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Completion summary for the `Complete` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Advisory confidence in `[0, 1]`; carried for observability only —
    /// no action currently depends on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl OrchestratorDecision {
    pub fn new(action: DecisionAction, reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            action,
            targets: Vec::new(),
            context_mapping: FxHashMap::default(),
            approval: None,
            error: None,
            summary: None,
            confidence: None,
        }
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<DispatchTarget>) -> Self {
        self.targets = targets;
        self
    }

    #[must_use]
    pub fn with_approval(mut self, approval: ApprovalConfig) -> Self {
        self.approval = Some(approval);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

/// Errors produced by [`parse_decision`].
#[derive(Debug, Error, Diagnostic)]
pub enum DecisionParseError {
    #[error("decision is not a JSON object")]
    #[diagnostic(code(loomflow::decision::not_object))]
    NotAnObject,

    #[error("decision has no action field")]
    #[diagnostic(
        code(loomflow::decision::missing_action),
        help("Expected an `action` (or `type`) field naming the next move.")
    )]
    MissingAction,

    #[error("unknown action: {value}")]
    #[diagnostic(
        code(loomflow::decision::unknown_action),
        help("Known actions: dispatch, parallel_dispatch, approval, complete, fail, wait.")
    )]
    UnknownAction { value: String },

    #[error("action {action} requires at least one dispatch target")]
    #[diagnostic(code(loomflow::decision::missing_targets))]
    MissingTargets { action: DecisionAction },

    #[error("approval action carried a malformed approval config: {source}")]
    #[diagnostic(code(loomflow::decision::bad_approval))]
    BadApprovalConfig {
        #[source]
        source: serde_json::Error,
    },
}

/// Map loosely structured external input into a strict
/// [`OrchestratorDecision`].
///
/// The leniency lives here and only here:
/// - `action` may also be spelled `type` or `next_action`, in any case,
///   with the synonyms `parallel`/`fan_out` (parallel dispatch),
///   `approve`/`request_approval` (approval), `done`/`finish` (complete)
///   and `abort`/`error` (fail);
/// - `targets` entries may be bare role strings or objects;
/// - `confidence` may be a number or a numeric string and is clamped to
///   `[0, 1]`;
/// - missing `reasoning` defaults to empty prose.
///
/// Structural violations (no action, unknown action, dispatch without
/// targets) are typed errors, never silently patched.
pub fn parse_decision(value: &Value) -> Result<OrchestratorDecision, DecisionParseError> {
    let obj = value.as_object().ok_or(DecisionParseError::NotAnObject)?;

    let raw_action = obj
        .get("action")
        .or_else(|| obj.get("type"))
        .or_else(|| obj.get("next_action"))
        .and_then(Value::as_str)
        .ok_or(DecisionParseError::MissingAction)?;
    let action = parse_action(raw_action)?;

    let reasoning = obj
        .get("reasoning")
        .or_else(|| obj.get("rationale"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let targets = obj
        .get("targets")
        .or_else(|| obj.get("agents"))
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(parse_target).collect::<Vec<_>>())
        .unwrap_or_default();
    if matches!(
        action,
        DecisionAction::Dispatch | DecisionAction::ParallelDispatch
    ) && targets.is_empty()
    {
        return Err(DecisionParseError::MissingTargets { action });
    }

    let context_mapping = obj
        .get("context_mapping")
        .or_else(|| obj.get("contextMapping"))
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<FxHashMap<_, _>>()
        })
        .unwrap_or_default();

    let approval = match obj
        .get("approval")
        .or_else(|| obj.get("approval_config"))
        .or_else(|| obj.get("approvalConfig"))
    {
        Some(raw) => Some(
            serde_json::from_value::<ApprovalConfig>(raw.clone())
                .map_err(|source| DecisionParseError::BadApprovalConfig { source })?,
        ),
        None => None,
    };

    let confidence = obj.get("confidence").and_then(coerce_confidence);

    Ok(OrchestratorDecision {
        reasoning,
        action,
        targets,
        context_mapping,
        approval,
        error: obj.get("error").and_then(Value::as_str).map(str::to_string),
        summary: obj
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string),
        confidence,
    })
}

fn parse_action(raw: &str) -> Result<DecisionAction, DecisionParseError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "dispatch" | "execute" | "run" => Ok(DecisionAction::Dispatch),
        "parallel_dispatch" | "parallel" | "fan_out" | "fanout" => {
            Ok(DecisionAction::ParallelDispatch)
        }
        "approval" | "approve" | "request_approval" => Ok(DecisionAction::Approval),
        "complete" | "done" | "finish" => Ok(DecisionAction::Complete),
        "fail" | "abort" | "error" => Ok(DecisionAction::Fail),
        "wait" | "idle" => Ok(DecisionAction::Wait),
        other => Err(DecisionParseError::UnknownAction {
            value: other.to_string(),
        }),
    }
}

fn parse_target(entry: &Value) -> Option<DispatchTarget> {
    match entry {
        Value::String(role) if !role.trim().is_empty() => Some(DispatchTarget::role(role.trim())),
        Value::Object(obj) => {
            let role = obj.get("role").or_else(|| obj.get("agent"))?.as_str()?;
            let mut target = DispatchTarget::role(role);
            target.style = obj.get("style").and_then(Value::as_str).map(str::to_string);
            target.priority = obj
                .get("priority")
                .and_then(Value::as_u64)
                .map(|p| p.min(u8::MAX as u64) as u8);
            target.context_refs = obj
                .get("context_refs")
                .or_else(|| obj.get("contextRefs"))
                .and_then(Value::as_array)
                .map(|refs| {
                    refs.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(target)
        }
        _ => None,
    }
}

fn coerce_confidence(raw: &Value) -> Option<f64> {
    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then(|| number.clamp(0.0, 1.0))
}
