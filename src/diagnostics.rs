//! Verbose diagnostics for the dispatcher.
//!
//! Events are only produced when the config has `verbose` set. Sinks observe
//! them and return nothing, so they cannot influence a send.

use std::fmt;
use std::sync::Mutex;

use tracing::info;

use crate::plan::UnitState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    RequestStarted {
        index: usize,
        total: usize,
        url: String,
        destination: String,
        attachment: Option<String>,
        message_len: usize,
    },
    ResponseReceived {
        index: usize,
        status: u16,
        body: String,
    },
    RequestFailed {
        index: usize,
        error: String,
    },
    /// A planned request that was skipped after an earlier failure.
    Aborted { index: usize },
    /// Final state of every unit, emitted once per send.
    Finished { states: Vec<UnitState> },
}

impl DiagnosticEvent {
    /// Unit the event is about; `None` for [`Finished`](Self::Finished).
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::RequestStarted { index, .. }
            | Self::ResponseReceived { index, .. }
            | Self::RequestFailed { index, .. }
            | Self::Aborted { index } => Some(*index),
            Self::Finished { .. } => None,
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestStarted {
                index,
                total,
                url,
                destination,
                attachment,
                message_len,
            } => write!(
                f,
                "POST {url} [{}/{total}] {destination} file={} message_len={message_len}",
                index + 1,
                attachment.as_deref().unwrap_or("-"),
            ),
            Self::ResponseReceived { index, status, body } => {
                write!(f, "response [{}] status={status} body={body}", index + 1)
            }
            Self::RequestFailed { index, error } => {
                write!(f, "request [{}] failed: {error}", index + 1)
            }
            Self::Aborted { index } => write!(f, "request [{}] not sent", index + 1),
            Self::Finished { states } => write!(f, "finished {states:?}"),
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &DiagnosticEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &DiagnosticEvent) {
        match event.index() {
            Some(index) => info!(index, "{event}"),
            None => info!("{event}"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: &DiagnosticEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
