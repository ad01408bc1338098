//! The workflow engine: the top-level driver of the state machine.
//!
//! [`WorkflowEngine`] drives the fixed node graph defined in
//! [`machine`](crate::machine) to a terminal node or a suspension point.
//! All collaborators (worker executor, validator, decision policy,
//! checkpoint store, event sender) are injected through the builder at
//! construction time; the engine holds no global state and no sessions
//! map — a suspended thread lives entirely in its latest checkpoint, so
//! any process with the store can resume it.
//!
//! # Suspension as a persisted continuation
//!
//! Suspending writes a checkpoint and returns a [`WorkflowRun`] whose
//! outcome says what the thread is waiting for. Resumption is a normal
//! call — [`WorkflowEngine::resume`] — that loads the checkpoint, injects
//! the approval response, and re-enters the machine at the suspended
//! node.

pub mod recovery;
pub mod runner;

pub use recovery::{RecoveryError, RecoveryPhase};
pub use runner::{
    ANALYST_ROLE, EngineError, InvokeOptions, RunOutcome, StepAdvance, Suspension, WaitingFor,
    WorkflowEngine, WorkflowEngineBuilder, WorkflowInput, WorkflowRun,
};
