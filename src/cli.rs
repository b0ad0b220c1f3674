use audiobook_common::{Bitrate, BitrateControl, ChannelMode, SampleRate};
use audiobook_compressor::config::Config;
use audiobook_compressor::settings::{EncodingSettings, SettingsError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audiobook-compressor")]
#[command(author, version, about = "Bulk re-encoding of audiobook libraries to AAC/M4B")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every audio file under a source directory
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        encoding: EncodingArgs,

        /// Write a JSON report of the run to this file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show what a run would do without writing anything
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        encoding: EncodingArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe an audio file and display its first audio stream
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Source directory to scan
    #[arg(required = true)]
    pub source: PathBuf,

    /// Output directory (default: <SOURCE>/<output folder name>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Per-run overrides of the configured encoding settings.
#[derive(Args, Debug, Clone, Default)]
pub struct EncodingArgs {
    /// Target bitrate, e.g. 48k or 64000
    #[arg(short, long)]
    pub bitrate: Option<Bitrate>,

    /// Target sample rate: 22050, 44100 or 48000
    #[arg(long)]
    pub sample_rate: Option<SampleRate>,

    /// Output channel mode: mono or stereo
    #[arg(long)]
    pub channel: Option<ChannelMode>,

    /// Mono sources at or below this bitrate are copied
    #[arg(long)]
    pub threshold: Option<Bitrate>,

    /// Bitrate control: abr or cbr
    #[arg(long)]
    pub bitrate_control: Option<BitrateControl>,

    /// Number of passes (1 or 2)
    #[arg(long)]
    pub passes: Option<u8>,

    /// Keep mono sources single-channel when converting to stereo
    #[arg(long)]
    pub keep_mono: bool,
}

impl EncodingArgs {
    /// Resolve run settings from `config` with these flags applied.
    ///
    /// `--channel` picks the channel mode before override tables are
    /// consulted; the other flags win over whatever the config resolved to.
    pub fn resolve(&self, config: &Config) -> Result<EncodingSettings, SettingsError> {
        let mut config = config.clone();
        if let Some(channel) = self.channel {
            config.encoding.channel = channel;
        }

        let mut settings = EncodingSettings::resolve(&config)?;
        if let Some(bitrate) = self.bitrate {
            settings.bitrate = bitrate;
        }
        if let Some(rate) = self.sample_rate {
            settings.sample_rate = rate;
        }
        if let Some(threshold) = self.threshold {
            settings.mono_copy_threshold = threshold;
        }
        if let Some(control) = self.bitrate_control {
            settings.bitrate_control = control;
        }
        if let Some(passes) = self.passes {
            settings.passes = passes;
        }
        if self.keep_mono {
            settings.dont_convert_mono_to_stereo = true;
        }

        settings.normalize()
    }
}
