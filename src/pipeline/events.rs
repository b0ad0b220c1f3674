//! Events emitted while a batch runs.
//!
//! Ordering: for each file, `FileStarted` comes first, every `Progress`
//! event for it precedes its `FileCompleted`, and files are reported in scan
//! order.

use super::report::FileResult;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Scanning,
    ProbingAndEncoding,
    Completed,
    Cancelled,
    Error,
}

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Success,
    Failed { reason: String },
    Cancelled,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every file was processed; some may have failed.
    Completed,
    /// The source tree held no supported files.
    NothingToDo,
    /// Stopped on request.
    Cancelled,
    /// Stopped by a failure outside per-file processing.
    Error { message: String },
}

impl RunStatus {
    /// The terminal [`RunState`] for this status.
    pub fn state(&self) -> RunState {
        match self {
            RunStatus::Completed | RunStatus::NothingToDo => RunState::Completed,
            RunStatus::Cancelled => RunState::Cancelled,
            RunStatus::Error { .. } => RunState::Error,
        }
    }

    /// Process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Completed | RunStatus::NothingToDo => 0,
            RunStatus::Error { .. } => 1,
            RunStatus::Cancelled => 130,
        }
    }
}

/// A single notification from a running batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    StateChanged { state: RunState },
    RunStarted { run_id: Uuid, total: usize },
    FileStarted { index: usize, source_path: PathBuf },
    /// `overall` is `(completed + file_fraction) / total`.
    Progress {
        index: usize,
        file_fraction: f64,
        overall: f64,
    },
    FileCompleted { result: FileResult },
    RunFinished { status: RunStatus },
}

/// Sender half handed to a batch run.
///
/// Sending never blocks and never fails the run; events are dropped when
/// the receiver is gone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl EventSink {
    /// Create a sink feeding `tx`.
    pub fn new(tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create a sink that discards every event.
    pub fn noop() -> Self {
        Self { tx: None }
    }

    /// Create a connected sink and receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub(crate) fn send(&self, event: BatchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
