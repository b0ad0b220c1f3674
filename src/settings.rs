//! Resolution of configuration into the immutable settings used by a run.

use crate::config::{Config, EncodingConfig};
use audiobook_common::{Bitrate, BitrateControl, ChannelMode, SampleRate};
use serde::Serialize;
use std::ops::RangeInclusive;

/// Accepted target bitrates, in bits per second.
pub const BITRATE_RANGE: RangeInclusive<u32> = 32_000..=192_000;

/// Accepted target sample rates, in Hz.
pub const SAMPLE_RATES: [u32; 3] = [22_050, 44_100, 48_000];

/// Invalid encoding settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("bitrate {0} is outside 32k..=192k")]
    BitrateOutOfRange(Bitrate),

    #[error("sample rate {0} is not one of 22050, 44100 or 48000 Hz")]
    UnsupportedSampleRate(SampleRate),

    #[error("passes must be 1 or 2, got {0}")]
    InvalidPasses(u8),
}

/// Settings snapshot for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingSettings {
    pub bitrate: Bitrate,
    pub sample_rate: SampleRate,
    pub channel_mode: ChannelMode,
    pub mono_copy_threshold: Bitrate,
    pub bitrate_control: BitrateControl,
    pub passes: u8,
    pub dont_convert_mono_to_stereo: bool,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self::from_encoding(&EncodingConfig::default())
    }
}

impl EncodingSettings {
    fn from_encoding(encoding: &EncodingConfig) -> Self {
        Self {
            bitrate: encoding.bitrate,
            sample_rate: encoding.sample_rate,
            channel_mode: encoding.channel,
            mono_copy_threshold: encoding.mono_copy_threshold,
            bitrate_control: encoding.bitrate_control,
            passes: encoding.passes,
            dont_convert_mono_to_stereo: encoding.dont_convert_mono_to_stereo,
        }
    }

    /// Build the run settings from a loaded configuration.
    ///
    /// The override table matching the configured channel mode, when
    /// enabled, replaces bitrate, sample rate, threshold, bitrate control
    /// and passes. The other table is ignored. CBR always runs one pass.
    pub fn resolve(config: &Config) -> Result<Self, SettingsError> {
        let mut settings = Self::from_encoding(&config.encoding);

        if let Some(table) = config.overrides.active_for(settings.channel_mode) {
            tracing::debug!(
                "Applying {} override settings",
                settings.channel_mode.to_string().to_lowercase()
            );
            settings.bitrate = table.bitrate;
            settings.sample_rate = table.sample_rate;
            settings.mono_copy_threshold = table.mono_copy_threshold;
            settings.bitrate_control = table.bitrate_control;
            settings.passes = table.passes;
        }

        settings.normalize()
    }

    /// Validate the settings and apply the CBR single-pass rule.
    pub fn normalize(mut self) -> Result<Self, SettingsError> {
        validate_bitrate(self.bitrate)?;
        validate_sample_rate(self.sample_rate)?;
        validate_passes(self.passes)?;

        if self.bitrate_control == BitrateControl::Cbr && self.passes != 1 {
            tracing::debug!("CBR selected, using a single pass");
            self.passes = 1;
        }

        if self.mono_copy_threshold < self.bitrate {
            tracing::warn!(
                "Mono copy threshold ({}) is below the target bitrate ({}); \
                 mono files between the two will be re-encoded at a higher bitrate",
                self.mono_copy_threshold,
                self.bitrate
            );
        }

        Ok(self)
    }
}

pub fn validate_bitrate(bitrate: Bitrate) -> Result<(), SettingsError> {
    if BITRATE_RANGE.contains(&bitrate.bps()) {
        Ok(())
    } else {
        Err(SettingsError::BitrateOutOfRange(bitrate))
    }
}

pub fn validate_sample_rate(rate: SampleRate) -> Result<(), SettingsError> {
    if SAMPLE_RATES.contains(&rate.hz()) {
        Ok(())
    } else {
        Err(SettingsError::UnsupportedSampleRate(rate))
    }
}

pub fn validate_passes(passes: u8) -> Result<(), SettingsError> {
    match passes {
        1 | 2 => Ok(()),
        other => Err(SettingsError::InvalidPasses(other)),
    }
}
