//! Approval gate: the suspension point where a human decision is required.
//!
//! The gate owns the *round* lifecycle (`pending -> approved | rejected |
//! deferred`, or unresolved on deadline expiry) and nothing else. It does
//! not decide what happens after a rejection or a timeout — that is the
//! router's job — but it exposes the current iteration count so the router
//! can enforce the rejection cap.
//!
//! A request produced by [`ApprovalGate::open`] is persisted inside
//! [`WorkflowState`](crate::state::WorkflowState) while the workflow is
//! suspended; resolution is a plain function call with the externally
//! delivered [`ApprovalResponse`].

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::IdGenerator;

/// What kind of decision is being requested from the human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// Pick one of N candidate variants (e.g. the winner of a style
    /// competition).
    StyleSelection,
    /// Review a produced design/plan before building continues.
    DesignReview,
    /// Simple yes/no before proceeding.
    Confirmation,
    /// Free-form feedback that feeds the next routing decision.
    Feedback,
}

impl ApprovalKind {
    /// Selection kinds present an option set; the others are yes/no or
    /// free-form.
    #[must_use]
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::StyleSelection | Self::DesignReview)
    }
}

/// One selectable candidate presented to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalOption {
    pub id: String,
    pub label: String,
    /// Optional rendered preview of the candidate (opaque to the core).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<Value>,
}

impl ApprovalOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            preview: None,
        }
    }

    #[must_use]
    pub fn with_preview(mut self, preview: Value) -> Self {
        self.preview = Some(preview);
        self
    }
}

/// Configuration of one approval round.
///
/// Carried inside the router's
/// [`OrchestratorDecision`](crate::decision::OrchestratorDecision) when it
/// chooses the `Approval` action, and stored on the pending request while
/// the workflow is suspended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    pub kind: ApprovalKind,
    /// Question shown to the user.
    pub prompt: String,
    /// Option set for selection kinds; empty for confirmation/feedback.
    #[serde(default)]
    pub options: Vec<ApprovalOption>,
    /// Whether the user may reject every presented option.
    #[serde(default = "default_true")]
    pub allow_reject_all: bool,
    /// Rejection iterations already consumed on this thread.
    #[serde(default)]
    pub iteration: u32,
    /// Rejection cap; reaching it forces escalation by the router.
    pub max_iterations: u32,
    /// Optional deadline; expiry makes the round unresolved and surfaces a
    /// `timeout` trigger to the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl ApprovalConfig {
    pub fn new(kind: ApprovalKind, prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
            options: Vec::new(),
            allow_reject_all: true,
            iteration: 0,
            max_iterations,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<ApprovalOption>) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// How many rejections are still allowed before the router must
    /// escalate.
    #[must_use]
    pub fn iterations_remaining(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iteration)
    }
}

/// Terminal state of one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Deferred,
}

/// The user's decision, delivered from outside the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved {
        /// Selected option id for selection kinds; `None` for plain
        /// confirmations.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_option: Option<String>,
    },
    Rejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    Deferred,
}

/// Response injected via `resume`; pairs a decision with the round it
/// answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: String,
    #[serde(flatten)]
    pub decision: ApprovalDecision,
    pub responded_at: DateTime<Utc>,
}

impl ApprovalResponse {
    pub fn approved(request_id: impl Into<String>, selected_option: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            decision: ApprovalDecision::Approved { selected_option },
            responded_at: Utc::now(),
        }
    }

    pub fn rejected(request_id: impl Into<String>, feedback: Option<String>) -> Self {
        Self {
            request_id: request_id.into(),
            decision: ApprovalDecision::Rejected { feedback },
            responded_at: Utc::now(),
        }
    }

    pub fn deferred(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            decision: ApprovalDecision::Deferred,
            responded_at: Utc::now(),
        }
    }
}

/// A pending approval round, persisted with the suspended workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub thread_id: String,
    pub config: ApprovalConfig,
    pub requested_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

/// Outcome of resolving a round.
///
/// `TimedOut` means the round stays unresolved: the deadline passed before
/// the response arrived, and the router — not the gate — decides whether
/// to retry, escalate, or fail.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    Approved {
        selected: Option<ApprovalOption>,
    },
    Rejected {
        feedback: Option<String>,
        rejected_option_ids: Vec<String>,
    },
    Deferred,
    TimedOut,
}

/// Errors raised while opening or resolving a round.
#[derive(Debug, Error, Diagnostic)]
pub enum ApprovalError {
    #[error("selection round opened without options")]
    #[diagnostic(
        code(loomflow::approval::empty_options),
        help("Style selection and design review rounds need at least one option.")
    )]
    EmptyOptions,

    #[error("response {response_id} does not answer request {request_id}")]
    #[diagnostic(code(loomflow::approval::request_mismatch))]
    RequestMismatch {
        request_id: String,
        response_id: String,
    },

    #[error("round {request_id} is already resolved ({status:?})")]
    #[diagnostic(code(loomflow::approval::already_resolved))]
    AlreadyResolved {
        request_id: String,
        status: ApprovalStatus,
    },

    #[error("selected option {option_id} is not part of the presented set")]
    #[diagnostic(
        code(loomflow::approval::unknown_option),
        help("The response must pick one of the option ids from the request.")
    )]
    UnknownOption { option_id: String },

    #[error("rejecting all options is not allowed for this round")]
    #[diagnostic(code(loomflow::approval::reject_all_forbidden))]
    RejectAllForbidden,
}

/// Opens and resolves approval rounds.
///
/// The gate is deliberately small and stateless: all round state lives in
/// the [`ApprovalRequest`] carried by the workflow, so a suspended thread
/// can be resolved by a different process than the one that suspended it.
///
/// # Examples
///
/// ```
/// use loomflow::approval::{
///     ApprovalConfig, ApprovalGate, ApprovalKind, ApprovalOption, ApprovalResponse, RoundOutcome,
/// };
///
/// let gate = ApprovalGate::new();
/// let config = ApprovalConfig::new(ApprovalKind::StyleSelection, "Pick a style", 5)
///     .with_options(vec![
///         ApprovalOption::new("opt-a", "Minimalist"),
///         ApprovalOption::new("opt-b", "Brutalist"),
///     ]);
/// let request = gate.open("thread-1", config).unwrap();
///
/// let response = ApprovalResponse::approved(&request.id, Some("opt-b".into()));
/// match gate.resolve(&request, &response).unwrap() {
///     RoundOutcome::Approved { selected } => {
///         assert_eq!(selected.unwrap().id, "opt-b");
///     }
///     other => panic!("unexpected outcome: {other:?}"),
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct ApprovalGate {
    ids: IdGenerator,
}

impl ApprovalGate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: IdGenerator::new(),
        }
    }

    /// Open a new round for `thread_id`.
    ///
    /// Selection kinds are validated to carry at least one option; a
    /// competition where every candidate failed must be routed to `fail`
    /// by the caller instead of opening an empty round.
    pub fn open(
        &self,
        thread_id: &str,
        config: ApprovalConfig,
    ) -> Result<ApprovalRequest, ApprovalError> {
        if config.kind.is_selection() && config.options.is_empty() {
            return Err(ApprovalError::EmptyOptions);
        }
        Ok(ApprovalRequest {
            id: self.ids.request_id(),
            thread_id: thread_id.to_string(),
            config,
            requested_at: Utc::now(),
            status: ApprovalStatus::Pending,
        })
    }

    /// Whether the round's deadline has passed at `now`.
    #[must_use]
    pub fn deadline_expired(request: &ApprovalRequest, now: DateTime<Utc>) -> bool {
        request
            .config
            .deadline
            .is_some_and(|deadline| now > deadline)
    }

    /// Resolve a pending round with an externally delivered response.
    ///
    /// Deadline expiry wins over the response content: a late answer
    /// yields [`RoundOutcome::TimedOut`] and leaves escalation to the
    /// router.
    pub fn resolve(
        &self,
        request: &ApprovalRequest,
        response: &ApprovalResponse,
    ) -> Result<RoundOutcome, ApprovalError> {
        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyResolved {
                request_id: request.id.clone(),
                status: request.status,
            });
        }
        if response.request_id != request.id {
            return Err(ApprovalError::RequestMismatch {
                request_id: request.id.clone(),
                response_id: response.request_id.clone(),
            });
        }
        if Self::deadline_expired(request, response.responded_at) {
            return Ok(RoundOutcome::TimedOut);
        }

        match &response.decision {
            ApprovalDecision::Approved { selected_option } => {
                let selected = match selected_option {
                    Some(option_id) => Some(
                        request
                            .config
                            .options
                            .iter()
                            .find(|o| &o.id == option_id)
                            .cloned()
                            .ok_or_else(|| ApprovalError::UnknownOption {
                                option_id: option_id.clone(),
                            })?,
                    ),
                    None => None,
                };
                Ok(RoundOutcome::Approved { selected })
            }
            ApprovalDecision::Rejected { feedback } => {
                if request.config.kind.is_selection() && !request.config.allow_reject_all {
                    return Err(ApprovalError::RejectAllForbidden);
                }
                Ok(RoundOutcome::Rejected {
                    feedback: feedback.clone(),
                    rejected_option_ids: request
                        .config
                        .options
                        .iter()
                        .map(|o| o.id.clone())
                        .collect(),
                })
            }
            ApprovalDecision::Deferred => Ok(RoundOutcome::Deferred),
        }
    }
}
