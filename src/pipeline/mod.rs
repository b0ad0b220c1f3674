//! Batch conversion pipeline.
//!
//! [`BatchPipeline`] drives a run through
//! `Idle -> Scanning -> ProbingAndEncoding -> {Completed | Cancelled | Error}`,
//! processing files strictly one at a time.

mod events;
mod report;
mod run;

pub use events::{BatchEvent, EventSink, FileOutcome, RunState, RunStatus};
pub use report::{BatchReport, FileAction, FileResult};
pub use run::{BatchPipeline, BatchRequest, PlanEntry};

use crate::scanner::ScanError;

/// Errors raised by the pipeline.
///
/// [`BatchPipeline::run`] only returns an error for a request that fails
/// validation. Inside a run these classify why a single file did not
/// succeed and end up as the reason of a failed [`FileResult`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scan failed: {0}")]
    ScanFailed(#[from] ScanError),

    #[error("probe failed: {0}")]
    ProbeFailed(#[source] audiobook_av::Error),

    #[error("encode failed: {0}")]
    EncodeFailed(#[source] audiobook_av::Error),

    #[error("copy failed: {0}")]
    CopyFailed(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}
