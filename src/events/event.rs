//! Event shapes emitted by the orchestration core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cloneable sending half handed to components at construction time.
pub type EventSender = flume::Sender<Event>;

/// Which part of the core produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    Engine,
    Router,
    Dispatch,
    Approval,
    Checkpoint,
    Diagnostic,
}

impl std::fmt::Display for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Engine => "engine",
            Self::Router => "router",
            Self::Dispatch => "dispatch",
            Self::Approval => "approval",
            Self::Checkpoint => "checkpoint",
            Self::Diagnostic => "diagnostic",
        };
        f.write_str(label)
    }
}

/// One observable orchestration event.
///
/// Events are advisory: losing one never affects workflow correctness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub scope: EventScope,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn new(scope: EventScope, message: impl Into<String>) -> Self {
        Self {
            scope,
            message: message.into(),
            thread_id: None,
            step: None,
            at: Utc::now(),
        }
    }

    /// Event attributed to a specific thread and step.
    pub fn for_thread(
        scope: EventScope,
        thread_id: impl Into<String>,
        step: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            message: message.into(),
            thread_id: Some(thread_id.into()),
            step: Some(step),
            at: Utc::now(),
        }
    }

    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self::new(EventScope::Diagnostic, message)
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.thread_id, self.step) {
            (Some(thread), Some(step)) => {
                write!(
                    f,
                    "[{}] thread={} step={} {}",
                    self.scope, thread, step, self.message
                )
            }
            (Some(thread), None) => {
                write!(f, "[{}] thread={} {}", self.scope, thread, self.message)
            }
            _ => write!(f, "[{}] {}", self.scope, self.message),
        }
    }
}
