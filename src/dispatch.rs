//! Dispatch coordination: bounded-concurrency fan-out with failure
//! isolation.
//!
//! A fan-out of N targets always yields exactly N [`ParallelResult`]s.
//! Each worker call is wrapped individually: a thrown [`WorkerError`], a
//! reported failure, or a guardrail rejection becomes an unsuccessful
//! result and never cancels or short-circuits sibling calls. A
//! single-target dispatch is the degenerate case of the same path.
//!
//! Concurrency is bounded by a semaphore; excess targets queue behind it.
//! Mid-flight cancellation is not modeled — a fan-out completes for every
//! target before the coordinator returns, and worker-side timeouts
//! surface as failed results.

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::decision::DispatchTarget;
use crate::events::{Event, EventScope, EventSender};
use crate::ids::IdGenerator;
use crate::state::RoutingHints;
use crate::worker::{Artifact, Validator, WorkerExecutor, WorkerRequest};

/// Result of one concurrently dispatched worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParallelResult {
    /// Role (agent) that ran.
    pub agent_id: String,
    pub execution_id: String,
    pub success: bool,
    pub output: Value,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Fan-out group; `None` for single-target dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Style variant the target carried, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub routing_hints: RoutingHints,
}

/// One dispatch order: the task text, resolved context, and targets.
#[derive(Clone, Debug)]
pub struct DispatchJob {
    pub thread_id: String,
    pub task: String,
    pub context: Value,
}

/// Fans a decision out to one or many workers.
///
/// Construct one per engine with the executor and validator seams and a
/// parallelism bound; the coordinator is cheap to clone-free share behind
/// the engine.
pub struct DispatchCoordinator {
    executor: Arc<dyn WorkerExecutor>,
    validator: Arc<dyn Validator>,
    semaphore: Arc<Semaphore>,
    max_parallel: usize,
    ids: IdGenerator,
    events: EventSender,
}

impl DispatchCoordinator {
    pub fn new(
        executor: Arc<dyn WorkerExecutor>,
        validator: Arc<dyn Validator>,
        max_parallel: usize,
        events: EventSender,
    ) -> Self {
        let bound = max_parallel.max(1);
        Self {
            executor,
            validator,
            semaphore: Arc::new(Semaphore::new(bound)),
            max_parallel: bound,
            ids: IdGenerator::new(),
            events,
        }
    }

    /// Upper bound on concurrently running workers.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run every target of `job`, concurrently up to the bound.
    ///
    /// Returns exactly one result per target, in target order. Partial
    /// success (K of N succeed) is a valid outcome surfaced to the
    /// caller, not an error.
    pub async fn dispatch(
        &self,
        job: &DispatchJob,
        targets: &[DispatchTarget],
    ) -> Vec<ParallelResult> {
        if targets.is_empty() {
            return Vec::new();
        }
        let group_id = (targets.len() > 1).then(|| self.ids.group_id());
        let _ = self.events.send(Event::new(
            EventScope::Dispatch,
            format!(
                "dispatching {} target(s) for thread {}",
                targets.len(),
                job.thread_id
            ),
        ));

        let mut in_flight = FuturesUnordered::new();
        for (index, target) in targets.iter().cloned().enumerate() {
            let semaphore = self.semaphore.clone();
            let executor = self.executor.clone();
            let validator = self.validator.clone();
            let execution_id = self.ids.execution_id();
            let group_id = group_id.clone();
            let thread_id = job.thread_id.clone();
            let task = job.task.clone();
            let context = job.context.clone();

            in_flight.push(async move {
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("dispatch semaphore closed");
                let result = run_target(
                    executor,
                    validator,
                    execution_id,
                    group_id,
                    thread_id,
                    task,
                    context,
                    target,
                )
                .await;
                drop(permit);
                (index, result)
            });
        }

        let mut indexed: Vec<(usize, ParallelResult)> = Vec::with_capacity(targets.len());
        while let Some(entry) = in_flight.next().await {
            indexed.push(entry);
        }
        indexed.sort_by_key(|(index, _)| *index);

        let succeeded = indexed.iter().filter(|(_, r)| r.success).count();
        let _ = self.events.send(Event::new(
            EventScope::Dispatch,
            format!(
                "fan-out settled for thread {}: {}/{} succeeded",
                job.thread_id,
                succeeded,
                targets.len()
            ),
        ));

        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_target(
    executor: Arc<dyn WorkerExecutor>,
    validator: Arc<dyn Validator>,
    execution_id: String,
    group_id: Option<String>,
    thread_id: String,
    task: String,
    context: Value,
    target: DispatchTarget,
) -> ParallelResult {
    let started = Instant::now();
    let request = WorkerRequest {
        thread_id,
        role: target.role.clone(),
        task,
        style: target.style.clone(),
        context,
    };
    let request_context = request.context.clone();

    let mut result = match executor.execute(request).await {
        Ok(output) => ParallelResult {
            agent_id: target.role.clone(),
            execution_id,
            success: output.success,
            output: output.output,
            artifacts: output.artifacts,
            error: output.error,
            duration_ms: 0,
            group_id,
            style: target.style.clone(),
            routing_hints: output.routing_hints,
        },
        Err(error) => ParallelResult {
            agent_id: target.role.clone(),
            execution_id,
            success: false,
            output: Value::Null,
            artifacts: Vec::new(),
            error: Some(error.to_string()),
            duration_ms: 0,
            group_id,
            style: target.style.clone(),
            routing_hints: RoutingHints::default(),
        },
    };

    // Guardrail check only on accepted output; a rejection downgrades the
    // result without touching siblings.
    if result.success {
        let validation = validator
            .validate(&result.output, &target.role, &request_context)
            .await;
        if !validation.valid {
            result.success = false;
            result.error = Some(format!(
                "guardrail rejected output: {}",
                validation.violations.join("; ")
            ));
        } else if !validation.warnings.is_empty() {
            tracing::debug!(
                role = %target.role,
                warnings = ?validation.warnings,
                "guardrail warnings on accepted output"
            );
        }
    }

    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}
