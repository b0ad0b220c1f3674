//! # audiobook-av
//!
//! External tool plumbing for audiobook-compressor.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg and ffprobe, with
//!   configured paths taking precedence over `PATH`.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   cancellation and streamed stderr.
//! - **Probing** ([`MediaProbe`], [`FfprobeProber`]) -- first audio stream
//!   attributes with a typed, tri-state bitrate.
//! - **Encoding** ([`Encoder`], [`FfmpegEncoder`]) -- AAC/M4B encoding with
//!   progress fractions and output verification.
//!
//! Enable the `tracing` feature to get log output from this crate.

pub mod command;
pub mod encode;
pub mod error;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use encode::{EncodeParams, EncodeSummary, Encoder, FfmpegEncoder, OutputChannels};
pub use error::{Error, Result};
pub use probe::{AudioProbe, FfprobeProber, MediaProbe, ReportedBitrate};
pub use tools::{ToolConfig, ToolInfo, ToolPaths, ToolRegistry};
