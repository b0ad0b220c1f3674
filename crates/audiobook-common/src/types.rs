//! Core value types shared by the configuration, policy and encoder layers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output channel layout requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Single channel, downmixed from the first two source channels.
    #[default]
    Mono,
    /// Two channels, no downmix.
    Stereo,
}

impl ChannelMode {
    /// Number of output channels for this mode.
    pub fn channel_count(&self) -> u32 {
        match self {
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Mono => write!(f, "Mono"),
            ChannelMode::Stereo => write!(f, "Stereo"),
        }
    }
}

impl FromStr for ChannelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mono" => Ok(Self::Mono),
            "stereo" => Ok(Self::Stereo),
            _ => Err(Error::InvalidChannelMode(s.to_string())),
        }
    }
}

/// Bitrate control mode for the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateControl {
    /// Average bitrate.
    #[default]
    Abr,
    /// Constant bitrate.
    Cbr,
}

impl fmt::Display for BitrateControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitrateControl::Abr => write!(f, "ABR"),
            BitrateControl::Cbr => write!(f, "CBR"),
        }
    }
}

impl FromStr for BitrateControl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abr" => Ok(Self::Abr),
            "cbr" => Ok(Self::Cbr),
            _ => Err(Error::InvalidBitrateControl(s.to_string())),
        }
    }
}

/// A bitrate in bits per second.
///
/// Text form is kilobits with a `k` suffix (`"48k"`). Parsing accepts
/// `"48k"`, `"48K"`, `"48"` (kbps, values below 1000) and `"48000"` (bps).
/// In configuration files either an integer (bps) or a string may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "NumberOrText", into = "String")]
pub struct Bitrate(u32);

impl Bitrate {
    /// Create a bitrate from bits per second.
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    /// Create a bitrate from kilobits per second.
    pub const fn from_kbps(kbps: u32) -> Self {
        Self(kbps * 1000)
    }

    /// Bits per second.
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Whole kilobits per second (truncating).
    pub const fn kbps(&self) -> u32 {
        self.0 / 1000
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kbps())
    }
}

impl FromStr for Bitrate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim().to_lowercase();
        if input.is_empty() {
            return Err(Error::invalid_bitrate(s));
        }

        if let Some(kbps) = input.strip_suffix('k') {
            let kbps: u32 = kbps
                .trim()
                .parse()
                .map_err(|_| Error::invalid_bitrate(s))?;
            return kbps
                .checked_mul(1000)
                .map(Self)
                .ok_or_else(|| Error::invalid_bitrate(s));
        }

        let value: u32 = input.parse().map_err(|_| Error::invalid_bitrate(s))?;
        if value < 1000 {
            Ok(Self(value * 1000))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Bitrate> for String {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.to_string()
    }
}

impl TryFrom<NumberOrText> for Bitrate {
    type Error = Error;

    fn try_from(value: NumberOrText) -> Result<Self> {
        match value {
            NumberOrText::Number(bps) => Ok(Self(bps)),
            NumberOrText::Text(text) => text.parse(),
        }
    }
}

/// A sample rate in Hz.
///
/// Text form is `"22050 Hz"`. Parsing accepts the number with or without the
/// `Hz` suffix, in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "NumberOrText", into = "u32")]
pub struct SampleRate(u32);

impl SampleRate {
    /// Create a sample rate from Hz.
    pub const fn from_hz(hz: u32) -> Self {
        Self(hz)
    }

    /// Hz value.
    pub const fn hz(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl FromStr for SampleRate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim().to_lowercase();
        let number = input.strip_suffix("hz").unwrap_or(&input).trim();
        number
            .parse()
            .map(Self)
            .map_err(|_| Error::invalid_sample_rate(s))
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.0
    }
}

impl TryFrom<NumberOrText> for SampleRate {
    type Error = Error;

    fn try_from(value: NumberOrText) -> Result<Self> {
        match value {
            NumberOrText::Number(hz) => Ok(Self(hz)),
            NumberOrText::Text(text) => text.parse(),
        }
    }
}

/// Config values that may be written as a bare number or as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u32),
    Text(String),
}
