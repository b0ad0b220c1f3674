//! Probe result types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Bitrate as reported by the prober.
///
/// A missing field and an explicit `null` are both "unknown", but are kept
/// apart so callers can log what the prober actually said. A reported zero is
/// a value, not an unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedBitrate {
    /// The prober output had no `bit_rate` field.
    #[default]
    Absent,
    /// The field was present but `null`.
    Null,
    /// A reported value in bits per second, possibly zero.
    Bps(u64),
}

impl ReportedBitrate {
    /// The bitrate if one was reported.
    pub fn known(&self) -> Option<u64> {
        match self {
            ReportedBitrate::Bps(bps) => Some(*bps),
            ReportedBitrate::Absent | ReportedBitrate::Null => None,
        }
    }
}

impl fmt::Display for ReportedBitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedBitrate::Absent | ReportedBitrate::Null => write!(f, "unknown"),
            ReportedBitrate::Bps(bps) => write!(f, "{bps} bps"),
        }
    }
}

/// Attributes of the first audio stream of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProbe {
    /// Codec name (e.g. "mp3", "aac", "flac").
    pub codec: Option<String>,
    /// Channel count, if reported.
    pub channels: Option<u32>,
    /// Stream bitrate.
    pub bitrate: ReportedBitrate,
    /// Sample rate in Hz, if reported.
    pub sample_rate: Option<u32>,
    /// Container duration, used for encoder progress.
    #[serde(with = "duration_secs", default)]
    pub duration: Option<Duration>,
}

impl AudioProbe {
    /// Whether the stream is known to have exactly one channel.
    pub fn is_mono(&self) -> bool {
        self.channels == Some(1)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|d| d.as_secs_f64()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.and_then(|s| Duration::try_from_secs_f64(s).ok()))
    }
}
