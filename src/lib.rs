//! Audiobook Compressor - bulk re-encoding of audiobook libraries
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod pipeline;
pub mod policy;
pub mod scanner;
pub mod settings;
