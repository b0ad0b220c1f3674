//! Audio stream probing.
//!
//! [`MediaProbe`] is the seam the batch pipeline depends on; [`FfprobeProber`]
//! is the implementation that shells out to ffprobe.

mod ffprobe;
mod types;

pub use ffprobe::{parse_ffprobe_json, FfprobeProber};
pub use types::{AudioProbe, ReportedBitrate};

use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Trait for extracting audio attributes from a file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe the first audio stream of the file at `path`.
    ///
    /// Implementations must stop promptly, killing any child process, once
    /// `cancel` fires.
    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<AudioProbe>;
}
