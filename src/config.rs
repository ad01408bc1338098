//! Engine configuration.
//!
//! All knobs live on one explicitly constructed [`EngineConfig`] that is
//! handed to the engine builder — configuration is injected, never read
//! from global mutable state. Only the SQLite database name falls back to
//! the environment (`LOOMFLOW_SQLITE_URL`, then `SQLITE_DB_NAME`, loaded
//! through `dotenvy`), matching how deployments point a fleet of
//! processes at one checkpoint database.

use crate::checkpoint::TriggerConfig;
use crate::machine::WorkflowNode;

/// Tunables for one [`WorkflowEngine`](crate::engine::WorkflowEngine).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Retry budget per thread; exceeding it is terminal.
    pub max_retries: u32,
    /// Rejection-loop cap; reaching it forces escalation.
    pub max_style_iterations: u32,
    /// Concurrency bound for one fan-out; excess targets queue.
    pub max_parallel_agents: usize,
    /// Nodes after which execution pauses and returns to the caller, in
    /// addition to the always-suspending approval node.
    pub interrupt_after: Vec<WorkflowNode>,
    /// Checkpoint trigger toggles.
    pub triggers: TriggerConfig,
    /// SQLite database name for the durable store; resolved from the
    /// environment when not set explicitly.
    pub sqlite_db_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_style_iterations: 5,
            max_parallel_agents: 16,
            interrupt_after: Vec::new(),
            triggers: TriggerConfig::default(),
            sqlite_db_name: resolve_sqlite_db_name(None),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_max_style_iterations(mut self, max_style_iterations: u32) -> Self {
        self.max_style_iterations = max_style_iterations;
        self
    }

    #[must_use]
    pub fn with_max_parallel_agents(mut self, max_parallel_agents: usize) -> Self {
        self.max_parallel_agents = max_parallel_agents.max(1);
        self
    }

    #[must_use]
    pub fn with_interrupt_after(mut self, nodes: Vec<WorkflowNode>) -> Self {
        self.interrupt_after = nodes;
        self
    }

    #[must_use]
    pub fn with_triggers(mut self, triggers: TriggerConfig) -> Self {
        self.triggers = triggers;
        self
    }

    #[must_use]
    pub fn with_sqlite_db_name(mut self, name: impl Into<String>) -> Self {
        self.sqlite_db_name = Some(name.into());
        self
    }

    /// Connection URL for the durable store, e.g. `sqlite://loomflow.db`.
    #[must_use]
    pub fn sqlite_url(&self) -> String {
        if let Ok(url) = std::env::var("LOOMFLOW_SQLITE_URL") {
            return url;
        }
        let name = self
            .sqlite_db_name
            .clone()
            .unwrap_or_else(|| "loomflow.db".to_string());
        format!("sqlite://{name}")
    }
}

fn resolve_sqlite_db_name(provided: Option<String>) -> Option<String> {
    if provided.is_some() {
        return provided;
    }
    dotenvy::dotenv().ok();
    Some(std::env::var("SQLITE_DB_NAME").unwrap_or_else(|_| "loomflow.db".to_string()))
}
