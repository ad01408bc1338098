#![allow(dead_code)]

//! Shared fixtures: scripted executors, validators, and engine wiring.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use loomflow::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, CheckpointSummary};
use loomflow::config::EngineConfig;
use loomflow::engine::{WorkflowEngine, WorkflowInput};
use loomflow::state::RoutingHints;
use loomflow::worker::{
    Validation, Validator, WorkerError, WorkerOutput, WorkerRequest, WorkerExecutor,
};

enum Script {
    Ok(WorkerOutput),
    Err(String),
}

impl Script {
    fn produce(&self, role: &str) -> Result<WorkerOutput, WorkerError> {
        match self {
            Script::Ok(output) => Ok(output.clone()),
            Script::Err(message) => Err(WorkerError::Failed {
                role: role.to_string(),
                message: message.clone(),
            }),
        }
    }
}

/// Deterministic executor that serves scripted responses by role, or by
/// `role:style` for competition targets. The last response of a queue is
/// sticky so repeated rounds (retries, rejection re-runs) stay
/// deterministic.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, key: &str, output: WorkerOutput) -> Self {
        self.push(key, Script::Ok(output));
        self
    }

    pub fn script_err(self, key: &str, message: &str) -> Self {
        self.push(key, Script::Err(message.to_string()));
        self
    }

    fn push(&self, key: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(script);
    }
}

#[async_trait]
impl WorkerExecutor for ScriptedExecutor {
    async fn execute(&self, request: WorkerRequest) -> Result<WorkerOutput, WorkerError> {
        let styled_key = request
            .style
            .as_ref()
            .map(|style| format!("{}:{}", request.role, style));
        let mut scripts = self.scripts.lock().unwrap();

        let key = styled_key
            .filter(|k| scripts.contains_key(k))
            .unwrap_or_else(|| request.role.clone());
        let Some(queue) = scripts.get_mut(&key) else {
            return Err(WorkerError::Unavailable {
                role: request.role.clone(),
            });
        };
        if queue.len() > 1 {
            queue
                .pop_front()
                .expect("non-empty queue")
                .produce(&request.role)
        } else {
            queue
                .front()
                .expect("non-empty queue")
                .produce(&request.role)
        }
    }
}

/// Validator that rejects any output containing `forbidden`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForbiddenWordValidator;

#[async_trait]
impl Validator for ForbiddenWordValidator {
    async fn validate(&self, output: &Value, _kind: &str, _context: &Value) -> Validation {
        if output.to_string().contains("forbidden") {
            Validation::rejected(vec!["contains a forbidden term".to_string()])
        } else {
            Validation::passed()
        }
    }
}

/// Store decorator that fails every write; reads delegate.
pub struct FailingStore;

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn save(&self, _checkpoint: Checkpoint) -> Result<String, CheckpointError> {
        Err(CheckpointError::Backend {
            message: "disk full".to_string(),
        })
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        Err(CheckpointError::NotFound {
            checkpoint_id: checkpoint_id.to_string(),
        })
    }

    async fn load_latest(&self, _thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(None)
    }

    async fn list_by_thread(
        &self,
        _thread_id: &str,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        Ok(Vec::new())
    }
}

/// An analysis output planning `roles` in order.
pub fn analysis_output(roles: &[&str]) -> WorkerOutput {
    WorkerOutput::ok(json!({
        "summary": "decomposed plan",
        "complexity": "medium",
        "planned_roles": roles,
    }))
}

/// An analysis output where `competition_role` runs as a style
/// competition over `styles`.
pub fn analysis_with_competition(
    roles: &[&str],
    competition_role: &str,
    styles: &[&str],
) -> WorkerOutput {
    WorkerOutput::ok(json!({
        "summary": "decomposed plan with a style competition",
        "planned_roles": roles,
        "competitions": { competition_role: styles },
    }))
}

pub fn ok_output(text: &str) -> WorkerOutput {
    WorkerOutput::ok(json!({ "result": text }))
}

pub fn ok_output_with_hints(text: &str, hints: RoutingHints) -> WorkerOutput {
    WorkerOutput::ok(json!({ "result": text })).with_hints(hints)
}

pub fn engine(executor: ScriptedExecutor) -> WorkflowEngine {
    WorkflowEngine::builder()
        .executor(Arc::new(executor))
        .build()
        .expect("engine builds")
}

pub fn engine_with(
    executor: ScriptedExecutor,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
) -> WorkflowEngine {
    WorkflowEngine::builder()
        .executor(Arc::new(executor))
        .store(store)
        .config(config)
        .build()
        .expect("engine builds")
}

pub fn input(prompt: &str) -> WorkflowInput {
    WorkflowInput::new(prompt)
        .task_id("task-1")
        .tenant_id("tenant-1")
        .project_id("project-1")
}
