//! FFprobe-based audio probing.

use super::types::{AudioProbe, ReportedBitrate};
use super::MediaProbe;
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Probing a single file should never take this long.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Arguments selecting the first audio stream and the fields we read.
const PROBE_ARGS: &[&str] = &[
    "-v",
    "error",
    "-select_streams",
    "a:0",
    "-show_entries",
    "stream=codec_name,bit_rate,channels,sample_rate:format=duration",
    "-of",
    "json",
];

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    channels: Option<u32>,
    // Outer None: field absent. Some(None): explicit null.
    #[serde(default, deserialize_with = "present_or_null")]
    bit_rate: Option<Option<NumberOrText>>,
    sample_rate: Option<NumberOrText>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<NumberOrText>,
}

/// ffprobe writes most numbers as JSON strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Float(f64),
    Text(String),
}

impl NumberOrText {
    fn as_u64(&self, field: &str) -> Result<Option<u64>> {
        match self {
            NumberOrText::Number(n) => Ok(Some(*n)),
            NumberOrText::Float(f) if f.is_finite() && *f >= 0.0 => Ok(Some(f.round() as u64)),
            NumberOrText::Text(s) if s.trim() == "N/A" => Ok(None),
            NumberOrText::Text(s) => s.trim().parse().map(Some).map_err(|_| {
                Error::parse_error("ffprobe", format!("{field} is not a number: {s:?}"))
            }),
            NumberOrText::Float(f) => Err(Error::parse_error(
                "ffprobe",
                format!("{field} is not a valid number: {f}"),
            )),
        }
    }

    fn as_secs(&self) -> Option<Duration> {
        let secs = match self {
            NumberOrText::Number(n) => *n as f64,
            NumberOrText::Float(f) => *f,
            NumberOrText::Text(s) => s.trim().parse().ok()?,
        };
        Duration::try_from_secs_f64(secs).ok()
    }
}

fn present_or_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parse ffprobe JSON output into an [`AudioProbe`].
///
/// # Errors
///
/// Returns [`Error::ParseError`] if the output is empty, has no audio
/// stream, or carries a non-numeric `bit_rate`/`sample_rate`, and
/// [`Error::Json`] if it is not valid JSON.
pub fn parse_ffprobe_json(json: &str) -> Result<AudioProbe> {
    if json.trim().is_empty() {
        return Err(Error::parse_error("ffprobe", "empty output"));
    }

    let output: FfprobeOutput = serde_json::from_str(json)?;

    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::parse_error("ffprobe", "no audio stream"))?;

    let bitrate = match stream.bit_rate {
        None => ReportedBitrate::Absent,
        Some(None) => ReportedBitrate::Null,
        Some(Some(value)) => match value.as_u64("bit_rate")? {
            Some(bps) => ReportedBitrate::Bps(bps),
            None => ReportedBitrate::Null,
        },
    };

    let sample_rate = match stream.sample_rate {
        Some(value) => value
            .as_u64("sample_rate")?
            .map(|hz| {
                u32::try_from(hz).map_err(|_| {
                    Error::parse_error("ffprobe", format!("sample_rate out of range: {hz}"))
                })
            })
            .transpose()?,
        None => None,
    };

    let duration = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.as_secs());

    Ok(AudioProbe {
        codec: stream.codec_name,
        channels: stream.channels,
        bitrate,
        sample_rate,
        duration,
    })
}

/// [`MediaProbe`] backed by the ffprobe executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a prober using the ffprobe found in `tools`.
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Override the per-file timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaProbe for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<AudioProbe> {
        if !path.exists() {
            return Err(Error::file_not_found(path));
        }

        let tool = self.tools.require("ffprobe")?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Probing {:?} with {:?}", path, tool.path);

        let output = ToolCommand::new(tool.path.clone())
            .args(PROBE_ARGS.iter().copied())
            .arg(path.as_os_str())
            .timeout(self.timeout)
            .execute_cancellable(cancel)
            .await?;

        parse_ffprobe_json(&output.stdout)
    }
}
