//! Identifier helpers for workflow threads, checkpoints, and executions.
//!
//! All identifiers are plain strings with a short type prefix so they stay
//! readable in logs and database rows. Generation is UUIDv4-backed; callers
//! that bring their own identifiers (e.g. a thread id minted by an API
//! layer) can pass them straight through — nothing in the crate inspects
//! the format beyond non-emptiness.

use uuid::Uuid;

/// Generates prefixed unique identifiers for the orchestration core.
///
/// # Examples
///
/// ```
/// use loomflow::ids::IdGenerator;
///
/// let ids = IdGenerator::new();
/// let thread = ids.thread_id();
/// assert!(thread.starts_with("thread-"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Identity of one workflow run; used as the checkpoint partition key.
    #[must_use]
    pub fn thread_id(&self) -> String {
        format!("thread-{}", Uuid::new_v4())
    }

    /// Identity of one stored checkpoint.
    #[must_use]
    pub fn checkpoint_id(&self) -> String {
        format!("ckpt-{}", Uuid::new_v4())
    }

    /// Identity of one worker invocation inside a fan-out.
    #[must_use]
    pub fn execution_id(&self) -> String {
        format!("exec-{}", Uuid::new_v4())
    }

    /// Identity of one approval round.
    #[must_use]
    pub fn request_id(&self) -> String {
        format!("appr-{}", Uuid::new_v4())
    }

    /// Identity of one fan-out group.
    #[must_use]
    pub fn group_id(&self) -> String {
        format!("group-{}", Uuid::new_v4())
    }
}
