//! Encoder parameters and the ffmpeg argument list built from them.

use audiobook_common::{Bitrate, BitrateControl, SampleRate};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Equal-weight downmix of the first two input channels.
const MONO_DOWNMIX_FILTER: &str = "pan=mono|c0=0.5*c0+0.5*c1";

/// How the encoder produces output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannels {
    /// One channel, downmixed from the first two source channels.
    MonoDownmix,
    /// One channel taken as-is from a mono source.
    Mono,
    /// Two channels, no filter.
    Stereo,
}

impl OutputChannels {
    /// Number of channels written.
    pub fn count(&self) -> u32 {
        match self {
            OutputChannels::MonoDownmix | OutputChannels::Mono => 1,
            OutputChannels::Stereo => 2,
        }
    }

    /// The `-ac` arguments.
    pub fn channel_args(&self) -> [String; 2] {
        ["-ac".to_string(), self.count().to_string()]
    }

    /// The `-af` arguments, empty when no filter is needed.
    pub fn filter_args(&self) -> Vec<String> {
        match self {
            OutputChannels::MonoDownmix => {
                vec!["-af".to_string(), MONO_DOWNMIX_FILTER.to_string()]
            }
            OutputChannels::Mono | OutputChannels::Stereo => Vec::new(),
        }
    }
}

/// Everything needed to re-encode one file to AAC in an M4B container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeParams {
    /// Target audio bitrate.
    pub bitrate: Bitrate,
    /// Target sample rate.
    pub sample_rate: SampleRate,
    /// Output channel handling.
    pub channels: OutputChannels,
    /// Requested bitrate control (informational for the native AAC encoder).
    pub bitrate_control: BitrateControl,
    /// Requested pass count (informational for the native AAC encoder).
    pub passes: u8,
    /// Destination file.
    pub output_path: PathBuf,
}

impl EncodeParams {
    /// Build the full ffmpeg argument list for encoding `source`.
    ///
    /// Video is dropped, metadata and chapters are copied from the source,
    /// the index is moved to the front (`+faststart`) and an existing
    /// destination is overwritten.
    pub fn ffmpeg_args(&self, source: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(24);

        args.push("-i".into());
        args.push(source.as_os_str().to_os_string());
        args.push("-vn".into());
        args.extend(["-c:a", "aac"].map(OsString::from));
        args.push("-b:a".into());
        args.push(self.bitrate.to_string().into());
        args.push("-ar".into());
        args.push(self.sample_rate.hz().to_string().into());
        args.extend(self.channels.channel_args().map(OsString::from));
        args.extend(self.channels.filter_args().into_iter().map(OsString::from));
        args.extend(["-map_metadata", "0", "-map_chapters", "0"].map(OsString::from));
        args.extend(["-movflags", "+faststart"].map(OsString::from));
        args.push("-y".into());
        args.extend(["-v", "info"].map(OsString::from));
        args.push(self.output_path.as_os_str().to_os_string());

        args
    }
}
