//! AAC/M4B encoding through ffmpeg.
//!
//! [`Encoder`] is the seam the batch pipeline depends on; [`FfmpegEncoder`]
//! runs ffmpeg, streams its statistics lines into progress fractions and
//! verifies the output before reporting success.

mod params;
mod progress;

pub use params::{EncodeParams, OutputChannels};
pub use progress::{is_progress_line, parse_time, progress_fraction};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Hang guard for a single encode.
const ENCODE_TIMEOUT: Duration = Duration::from_secs(86400);

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    /// The file that was written.
    pub output_path: PathBuf,
    /// Size of the written file in bytes.
    pub output_bytes: u64,
    /// Wall time spent in the encoder.
    pub elapsed: Duration,
}

/// Trait for re-encoding one source file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Human-readable name identifying this encoder implementation.
    fn name(&self) -> &'static str;

    /// Encode `source` into `params.output_path`.
    ///
    /// `duration` is the probed source duration, used to turn encoder
    /// positions into fractions passed to `on_progress`. When `cancel` fires
    /// the encoder process is killed and [`Error::Cancelled`] returned.
    /// Success means the process exited 0 and left a non-empty output file;
    /// a partial output is never removed.
    async fn encode(
        &self,
        source: &Path,
        params: &EncodeParams,
        duration: Option<Duration>,
        on_progress: &mut (dyn FnMut(f64) + Send),
        cancel: &CancellationToken,
    ) -> Result<EncodeSummary>;
}

/// Check that an encoder left a non-empty file at `path`.
///
/// # Errors
///
/// [`Error::OutputMissing`] if nothing exists at `path`,
/// [`Error::OutputEmpty`] if the file has zero length.
pub async fn verify_output(path: &Path) -> Result<u64> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::OutputMissing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };

    if !metadata.is_file() {
        return Err(Error::OutputMissing {
            path: path.to_path_buf(),
        });
    }

    if metadata.len() == 0 {
        return Err(Error::OutputEmpty {
            path: path.to_path_buf(),
        });
    }

    Ok(metadata.len())
}

/// [`Encoder`] backed by the ffmpeg executable and its native AAC encoder.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl FfmpegEncoder {
    /// Create an encoder using the ffmpeg found in `tools`.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: ENCODE_TIMEOUT,
        }
    }

    /// Override the per-file timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        source: &Path,
        params: &EncodeParams,
        duration: Option<Duration>,
        on_progress: &mut (dyn FnMut(f64) + Send),
        cancel: &CancellationToken,
    ) -> Result<EncodeSummary> {
        let ffmpeg = self.tools.require("ffmpeg")?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Encoding {:?} -> {:?} ({}, {}, {:?}, {} {}-pass)",
            source,
            params.output_path,
            params.bitrate,
            params.sample_rate,
            params.channels,
            params.bitrate_control,
            params.passes,
        );

        let started = Instant::now();

        ToolCommand::new(ffmpeg.path.clone())
            .args(params.ffmpeg_args(source))
            .timeout(self.timeout)
            .execute_with_stderr_callback(
                |line| {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(target: "audiobook_av::ffmpeg", "{}", line);

                    if let Some(fraction) = progress_fraction(line, duration) {
                        on_progress(fraction);
                    }
                },
                Some(cancel),
            )
            .await?;

        let output_bytes = verify_output(&params.output_path).await?;

        Ok(EncodeSummary {
            output_path: params.output_path.clone(),
            output_bytes,
            elapsed: started.elapsed(),
        })
    }
}
