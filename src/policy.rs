//! Copy-or-encode decision for a probed file.
//!
//! A mono source whose reported bitrate is non-zero and at or below the
//! mono copy threshold is copied unchanged. Everything else is re-encoded to
//! AAC in an M4B container with the run's settings. An unknown bitrate and a
//! reported bitrate of zero both count as "not eligible for copy".

use crate::scanner::AudioFileRecord;
use crate::settings::EncodingSettings;
use audiobook_av::{AudioProbe, EncodeParams, OutputChannels};
use audiobook_common::paths::sanitize_filename;
use audiobook_common::ChannelMode;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Extension of encoded output files.
pub const ENCODED_EXTENSION: &str = "m4b";

/// What to do with one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConversionDecision {
    /// Copy the source unchanged to `dest`.
    Copy { dest: PathBuf },
    /// Re-encode with these parameters.
    Encode(EncodeParams),
}

impl ConversionDecision {
    /// The file this decision writes.
    pub fn output_path(&self) -> &Path {
        match self {
            ConversionDecision::Copy { dest } => dest,
            ConversionDecision::Encode(params) => &params.output_path,
        }
    }
}

/// Whether a probed stream may be copied instead of re-encoded.
pub fn is_copy_eligible(probe: &AudioProbe, settings: &EncodingSettings) -> bool {
    probe.is_mono()
        && probe
            .bitrate
            .known()
            .is_some_and(|bps| bps != 0 && bps <= u64::from(settings.mono_copy_threshold.bps()))
}

/// Output channel handling for a probed stream.
///
/// A known mono source is never run through the two-channel downmix
/// filter, which would reference a channel that does not exist.
pub fn output_channels(probe: &AudioProbe, settings: &EncodingSettings) -> OutputChannels {
    match settings.channel_mode {
        ChannelMode::Mono if probe.is_mono() => OutputChannels::Mono,
        ChannelMode::Mono => OutputChannels::MonoDownmix,
        ChannelMode::Stereo if settings.dont_convert_mono_to_stereo && probe.is_mono() => {
            OutputChannels::Mono
        }
        ChannelMode::Stereo => OutputChannels::Stereo,
    }
}

/// `output_root / relative_dir / sanitize(stem).extension`.
pub fn resolve_output_path(
    output_root: &Path,
    relative_path: &Path,
    extension: Option<&str>,
) -> PathBuf {
    let stem = relative_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    let mut name = sanitize_filename(&stem);
    if let Some(ext) = extension.filter(|e| !e.is_empty()) {
        name.push('.');
        name.push_str(ext);
    }

    let mut path = output_root.to_path_buf();
    if let Some(dir) = relative_path.parent() {
        path.push(dir);
    }
    path.push(name);
    path
}

/// Decide what to do with `record` under `settings`, writing below
/// `output_root`.
///
/// A record that was never probed is treated as having unknown attributes
/// and is encoded.
pub fn decide(
    record: &AudioFileRecord,
    settings: &EncodingSettings,
    output_root: &Path,
) -> ConversionDecision {
    let unknown = AudioProbe {
        codec: None,
        channels: None,
        bitrate: Default::default(),
        sample_rate: None,
        duration: None,
    };
    let probe = record.probe.as_ref().unwrap_or(&unknown);

    if is_copy_eligible(probe, settings) {
        let extension = record
            .relative_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());
        return ConversionDecision::Copy {
            dest: resolve_output_path(output_root, &record.relative_path, extension.as_deref()),
        };
    }

    ConversionDecision::Encode(EncodeParams {
        bitrate: settings.bitrate,
        sample_rate: settings.sample_rate,
        channels: output_channels(probe, settings),
        bitrate_control: settings.bitrate_control,
        passes: settings.passes,
        output_path: resolve_output_path(
            output_root,
            &record.relative_path,
            Some(ENCODED_EXTENSION),
        ),
    })
}
