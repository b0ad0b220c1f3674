use audiobook_av::ToolPaths;
use audiobook_common::{Bitrate, BitrateControl, ChannelMode, SampleRate};
use serde::{Deserialize, Serialize};

/// Default name of the output folder, also excluded from scans.
pub const DEFAULT_OUTPUT_FOLDER: &str = "Compressed_Audiobooks";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub overrides: OverridesConfig,

    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EncodingConfig {
    /// Target bitrate ("48k" or bits per second)
    #[serde(default = "default_bitrate")]
    pub bitrate: Bitrate,

    /// Target sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: SampleRate,

    #[serde(default)]
    pub channel: ChannelMode,

    /// Mono sources at or below this bitrate are copied as-is
    #[serde(default = "default_mono_copy_threshold")]
    pub mono_copy_threshold: Bitrate,

    #[serde(default)]
    pub bitrate_control: BitrateControl,

    /// 1 or 2; forced to 1 with CBR
    #[serde(default = "default_passes")]
    pub passes: u8,

    /// Keep mono sources single-channel when the output mode is stereo
    #[serde(default)]
    pub dont_convert_mono_to_stereo: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            sample_rate: default_sample_rate(),
            channel: ChannelMode::default(),
            mono_copy_threshold: default_mono_copy_threshold(),
            bitrate_control: BitrateControl::default(),
            passes: default_passes(),
            dont_convert_mono_to_stereo: false,
        }
    }
}

/// Per-channel-mode settings that replace `[encoding]` when enabled.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OverridesConfig {
    #[serde(default)]
    pub mono: Option<OverrideConfig>,

    #[serde(default)]
    pub stereo: Option<OverrideConfig>,
}

impl OverridesConfig {
    /// The override table for `mode`, if present and enabled.
    pub fn active_for(&self, mode: ChannelMode) -> Option<&OverrideConfig> {
        let table = match mode {
            ChannelMode::Mono => self.mono.as_ref(),
            ChannelMode::Stereo => self.stereo.as_ref(),
        };
        table.filter(|t| t.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OverrideConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_bitrate")]
    pub bitrate: Bitrate,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: SampleRate,

    #[serde(default = "default_mono_copy_threshold")]
    pub mono_copy_threshold: Bitrate,

    #[serde(default)]
    pub bitrate_control: BitrateControl,

    #[serde(default = "default_passes")]
    pub passes: u8,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bitrate: default_bitrate(),
            sample_rate: default_sample_rate(),
            mono_copy_threshold: default_mono_copy_threshold(),
            bitrate_control: BitrateControl::default(),
            passes: default_passes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Name of the folder created under the output root. Source paths
    /// containing a folder of this name are never scanned.
    #[serde(default = "default_output_folder")]
    pub folder_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder_name: default_output_folder(),
        }
    }
}

fn default_bitrate() -> Bitrate {
    Bitrate::from_bps(48_000)
}

fn default_sample_rate() -> SampleRate {
    SampleRate::from_hz(22_050)
}

fn default_mono_copy_threshold() -> Bitrate {
    Bitrate::from_bps(64_000)
}

fn default_passes() -> u8 {
    1
}

fn default_output_folder() -> String {
    DEFAULT_OUTPUT_FOLDER.to_string()
}
