//! Audiobook-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across audiobook-compressor:
//!
//! - **Core Types**: channel modes, bitrate control modes, and the
//!   [`Bitrate`] / [`SampleRate`] value types with their text forms
//! - **Path Utilities**: supported audio extensions and output filename
//!   sanitization
//! - **Error Handling**: parse errors for the value types
//!
//! # Examples
//!
//! ```
//! use audiobook_common::{Bitrate, ChannelMode};
//! use audiobook_common::paths::{is_audio_file, sanitize_filename};
//! use std::path::Path;
//!
//! let bitrate: Bitrate = "48k".parse().unwrap();
//! assert_eq!(bitrate.bps(), 48_000);
//! assert_eq!(bitrate.to_string(), "48k");
//!
//! assert_eq!("mono".parse::<ChannelMode>().unwrap(), ChannelMode::Mono);
//! assert!(is_audio_file(Path::new("chapter01.mp3")));
//! assert_eq!(sanitize_filename("Part 1: The Start"), "Part 1- The Start");
//! ```

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
