//! External collaborator seams: worker execution and output validation.
//!
//! The orchestration core never produces content itself. Dispatch nodes
//! hand a [`WorkerRequest`] to a [`WorkerExecutor`] — an opaque
//! capability provided by the embedding application — and receive a
//! [`WorkerOutput`] or a typed error. Output acceptance consults a
//! [`Validator`] (the guardrail pipeline), also external.
//!
//! Both traits must be safe to call concurrently for independent
//! requests; timeouts are the executor's responsibility and surface as a
//! failed result, never as a hung fan-out.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::RoutingHints;

/// One worker invocation, fully described.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub thread_id: String,
    /// Worker role, e.g. `architect`, `designer`, `backend`, `reviewer`.
    pub role: String,
    /// The task text the worker should act on.
    pub task: String,
    /// Style variant for competition fan-outs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Resolved context handed through from the routing decision.
    #[serde(default)]
    pub context: Value,
}

/// A produced artifact referenced from a worker output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    /// Artifact kind, e.g. `design`, `code`, `review`.
    pub kind: String,
    pub content: Value,
}

/// Result of one worker call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub success: bool,
    pub output: Value,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Signals for the router (needs approval, suggested next roles, ...).
    #[serde(default)]
    pub routing_hints: RoutingHints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutput {
    /// A successful output around `output` with no artifacts or hints.
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            artifacts: Vec::new(),
            routing_hints: RoutingHints::default(),
            error: None,
        }
    }

    /// A reported (non-thrown) failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            artifacts: Vec::new(),
            routing_hints: RoutingHints::default(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_hints(mut self, hints: RoutingHints) -> Self {
        self.routing_hints = hints;
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Errors a worker call can raise.
///
/// A thrown error and a reported failure (`success: false`) are treated
/// identically by the dispatch coordinator: both become an unsuccessful
/// [`ParallelResult`](crate::dispatch::ParallelResult) without touching
/// sibling calls.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkerError {
    #[error("no worker available for role {role}")]
    #[diagnostic(
        code(loomflow::worker::unavailable),
        help("Register an executor that handles this role.")
    )]
    Unavailable { role: String },

    #[error("worker {role} failed: {message}")]
    #[diagnostic(code(loomflow::worker::failed))]
    Failed { role: String, message: String },

    #[error("worker {role} timed out after {elapsed_ms}ms")]
    #[diagnostic(code(loomflow::worker::timeout))]
    Timeout { role: String, elapsed_ms: u64 },
}

/// The opaque worker capability.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    /// Execute `request` and return its output or a typed error.
    ///
    /// Must be safe to call concurrently for independent requests.
    async fn execute(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError>;
}

/// Result of consulting the guardrail pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(default)]
    pub violations: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn passed() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn rejected(violations: Vec<String>) -> Self {
        Self {
            valid: false,
            violations,
            warnings: Vec::new(),
        }
    }
}

/// The pluggable content validator consulted before accepting output.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, output: &Value, kind: &str, context: &Value) -> Validation;
}

/// Validator that accepts everything; the default when no guardrail
/// pipeline is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllValidator;

#[async_trait]
impl Validator for AcceptAllValidator {
    async fn validate(&self, _output: &Value, _kind: &str, _context: &Value) -> Validation {
        Validation::passed()
    }
}
