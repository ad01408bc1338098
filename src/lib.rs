//! # Loomflow: Resumable Multi-Agent Workflow Orchestration
//!
//! Loomflow coordinates multi-step, multi-agent task pipelines: a prompt
//! is decomposed, routed through specialized workers (architects,
//! designers, builders, reviewers), occasionally paused for human
//! approval, and survives process restarts without losing progress.
//!
//! ## Core Concepts
//!
//! - **State machine**: a fixed node graph (`analyze -> route -> execute /
//!   parallel_dispatch -> approve -> complete / fail`) with pure
//!   conditional edges and side-effecting handlers driven by the engine
//! - **Thinking router**: a read-then-decide function producing structured
//!   [`OrchestratorDecision`](decision::OrchestratorDecision)s from
//!   accumulated state, audited in an append-only thinking history
//! - **Bounded fan-out**: concurrent dispatch with per-target failure
//!   isolation — N targets always produce exactly N results
//! - **Approval gates**: suspension points with option sets, deadlines,
//!   and a bounded rejection loop
//! - **Checkpoints**: compressed, integrity-hashed snapshots taken around
//!   risky transitions so a crash or rejection rolls back to a known-good
//!   point
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loomflow::approval::ApprovalResponse;
//! use loomflow::engine::{InvokeOptions, WorkflowEngine, WorkflowInput};
//! # async fn example(executor: Arc<dyn loomflow::worker::WorkerExecutor>)
//! # -> Result<(), loomflow::engine::EngineError> {
//!
//! let engine = WorkflowEngine::builder().executor(executor).build()?;
//!
//! // Start a thread; it runs until completion or an approval gate.
//! let run = engine
//!     .invoke(
//!         WorkflowInput::new("Build a landing page with three style options"),
//!         InvokeOptions::thread("thread-1"),
//!     )
//!     .await?;
//!
//! // A suspended thread resumes from its checkpoint — in this process
//! // or any other one pointed at the same store.
//! if let Some(request) = run.pending_approval() {
//!     let response = ApprovalResponse::approved(&request.id, None);
//!     let resumed = engine.resume("thread-1", response).await?;
//!     println!("finished with status {}", resumed.state.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`state`] - Workflow state, outputs, and the thinking history
//! - [`decision`] - Decision model and its lenient boundary parser
//! - [`machine`] - The node graph and its pure transition functions
//! - [`engine`] - The driver: invoke, resume, stepwise advance
//! - [`router`] - Decision policies and cap enforcement
//! - [`dispatch`] - Bounded concurrent fan-out
//! - [`approval`] - Approval rounds and the rejection loop
//! - [`checkpoint`] - Snapshot persistence, stores, and triggers
//! - [`worker`] - Executor and validator seams (external collaborators)
//! - [`events`] - Observability bus with pluggable sinks

pub mod approval;
pub mod checkpoint;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod ids;
pub mod machine;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod worker;
