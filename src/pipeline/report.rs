//! Per-file results and the aggregate run report.

use super::events::{FileOutcome, RunStatus};
use crate::settings::EncodingSettings;
use anyhow::{Context, Result};
use audiobook_av::ReportedBitrate;
use audiobook_common::Bitrate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What was done with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Copy,
    Encode,
}

/// Outcome of one file, with the bitrate information known at the time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub index: usize,
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
    /// `None` when the file failed before a decision was made.
    pub action: Option<FileAction>,
    pub output_path: Option<PathBuf>,
    /// Bitrate reported by the prober.
    pub source_bitrate: Option<ReportedBitrate>,
    /// Bitrate the file was encoded at.
    pub target_bitrate: Option<Bitrate>,
    pub output_bytes: Option<u64>,
    pub elapsed_ms: u64,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub settings: EncodingSettings,
    /// Files found by the scan.
    pub total: usize,
    pub status: RunStatus,
    /// Results in scan order. Files never started after a cancellation
    /// are absent.
    pub files: Vec<FileResult>,
}

impl BatchReport {
    pub fn successes(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
            .count()
    }

    /// Files not processed: never started, or interrupted by cancellation.
    pub fn skipped(&self) -> usize {
        self.total - self.successes() - self.failures()
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {:?}", path))?;
        Ok(())
    }
}
