//! Sequential batch runner: scan, then probe, decide and copy or encode
//! each file in order.

use super::events::{BatchEvent, EventSink, FileOutcome, RunState, RunStatus};
use super::report::{BatchReport, FileAction, FileResult};
use super::PipelineError;
use crate::policy::{self, ConversionDecision};
use crate::scanner::{AudioFileRecord, DirectoryScanner};
use crate::settings::EncodingSettings;
use audiobook_av::{AudioProbe, Encoder, MediaProbe};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const COPY_CHUNK: usize = 256 * 1024;

/// Source and output roots for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
}

impl BatchRequest {
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Check both roots are given and the source exists.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.source_root.as_os_str().is_empty() {
            return Err(PipelineError::InvalidInput(
                "source directory not specified".into(),
            ));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(PipelineError::InvalidInput(
                "output directory not specified".into(),
            ));
        }
        if !self.source_root.is_dir() {
            return Err(PipelineError::InvalidInput(format!(
                "source directory does not exist: {}",
                self.source_root.display()
            )));
        }
        Ok(())
    }

    /// The output root as an absolute path.
    pub fn absolute_output_root(&self) -> Result<PathBuf, PipelineError> {
        std::path::absolute(&self.output_root).map_err(|e| {
            PipelineError::InvalidInput(format!(
                "cannot resolve output directory {}: {}",
                self.output_root.display(),
                e
            ))
        })
    }
}

/// One file of a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub record: AudioFileRecord,
    pub decision: Option<ConversionDecision>,
    /// Why no decision could be made.
    pub error: Option<String>,
}

/// Mutable state of a run in progress, owned by [`BatchPipeline::run`].
struct BatchRun {
    files: Vec<AudioFileRecord>,
    results: Vec<FileResult>,
}

impl BatchRun {
    fn total(&self) -> usize {
        self.files.len()
    }

    fn overall(&self, file_fraction: f64) -> f64 {
        if self.files.is_empty() {
            return 1.0;
        }
        ((self.results.len() as f64 + file_fraction.clamp(0.0, 1.0)) / self.total() as f64)
            .clamp(0.0, 1.0)
    }
}

/// What happened to a file that finished without error.
struct Processed {
    action: FileAction,
    output_path: PathBuf,
    output_bytes: u64,
}

/// Orchestrates scanner, prober, policy and encoder over a source tree.
pub struct BatchPipeline<P, E> {
    prober: P,
    encoder: E,
    settings: EncodingSettings,
    scanner: DirectoryScanner,
}

impl<P: MediaProbe, E: Encoder> BatchPipeline<P, E> {
    pub fn new(
        prober: P,
        encoder: E,
        settings: EncodingSettings,
        scanner: DirectoryScanner,
    ) -> Self {
        Self {
            prober,
            encoder,
            settings,
            scanner,
        }
    }

    pub fn settings(&self) -> &EncodingSettings {
        &self.settings
    }

    /// Run the batch.
    ///
    /// Only request validation fails the call; everything after that is
    /// reported through the returned [`BatchReport`] and `events`. Per-file
    /// failures are recorded and the run moves on to the next file. When
    /// `cancel` fires, the active child process is killed, the current file
    /// is recorded as cancelled and no further files are started.
    pub async fn run(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<BatchReport, PipelineError> {
        request.validate()?;
        let output_root = request.absolute_output_root()?;

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "batch_run",
            run_id = %run_id,
            prober = self.prober.name(),
            encoder = self.encoder.name()
        );

        let report = async {
            let started_at = Utc::now();
            info!("Starting batch: {:?} -> {:?}", request.source_root, output_root);
            debug!("Settings: {:?}", self.settings);

            let mut run = BatchRun {
                files: Vec::new(),
                results: Vec::new(),
            };
            let status = self
                .execute(request, &output_root, run_id, &mut run, cancel, events)
                .await;

            match &status {
                RunStatus::Error { message } => error!("Batch failed: {}", message),
                status => info!(
                    "Batch finished: {:?} ({} of {} files processed)",
                    status,
                    run.results.len(),
                    run.total()
                ),
            }

            events.send(BatchEvent::StateChanged {
                state: status.state(),
            });
            events.send(BatchEvent::RunFinished {
                status: status.clone(),
            });

            BatchReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                source_root: request.source_root.clone(),
                output_root: output_root.clone(),
                settings: self.settings.clone(),
                total: run.total(),
                status,
                files: run.results,
            }
        }
        .instrument(span)
        .await;

        Ok(report)
    }

    async fn execute(
        &self,
        request: &BatchRequest,
        output_root: &Path,
        run_id: Uuid,
        run: &mut BatchRun,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> RunStatus {
        events.send(BatchEvent::StateChanged {
            state: RunState::Scanning,
        });

        run.files = match self.scanner.scan(&request.source_root) {
            Ok(files) => files.collect(),
            Err(e) => {
                return RunStatus::Error {
                    message: e.to_string(),
                }
            }
        };

        if run.files.is_empty() {
            info!("No audio files found in {:?}", request.source_root);
            return RunStatus::NothingToDo;
        }

        events.send(BatchEvent::RunStarted {
            run_id,
            total: run.total(),
        });
        events.send(BatchEvent::StateChanged {
            state: RunState::ProbingAndEncoding,
        });

        for index in 0..run.total() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping before file {}", index + 1);
                return RunStatus::Cancelled;
            }

            let span = info_span!("file", index, path = ?run.files[index].relative_path);
            let result = self
                .process_file(index, run, output_root, cancel, events)
                .instrument(span)
                .await;

            let interrupted = result.outcome == FileOutcome::Cancelled;
            events.send(BatchEvent::FileCompleted {
                result: result.clone(),
            });
            run.results.push(result);

            if interrupted {
                return RunStatus::Cancelled;
            }
        }

        RunStatus::Completed
    }

    async fn process_file(
        &self,
        index: usize,
        run: &mut BatchRun,
        output_root: &Path,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> FileResult {
        let started = Instant::now();
        let source_path = run.files[index].source_path.clone();

        events.send(BatchEvent::FileStarted {
            index,
            source_path: source_path.clone(),
        });
        events.send(BatchEvent::Progress {
            index,
            file_fraction: 0.0,
            overall: run.overall(0.0),
        });

        let mut decision_made: Option<ConversionDecision> = None;
        let outcome = self
            .handle_file(index, run, output_root, cancel, events, &mut decision_made)
            .await;

        let record = &run.files[index];
        let (outcome, output_bytes) = match outcome {
            Ok(processed) => {
                events.send(BatchEvent::Progress {
                    index,
                    file_fraction: 1.0,
                    overall: run.overall(1.0),
                });
                info!(
                    "{:?} {:?} -> {:?} ({} bytes)",
                    processed.action, record.relative_path, processed.output_path, processed.output_bytes
                );
                (FileOutcome::Success, Some(processed.output_bytes))
            }
            Err(PipelineError::Cancelled) => {
                info!("Cancelled while processing {:?}", record.relative_path);
                (FileOutcome::Cancelled, None)
            }
            Err(e) => {
                warn!("Failed to process {:?}: {}", record.relative_path, e);
                (
                    FileOutcome::Failed {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
        };

        let (action, output_path, target_bitrate) = match &decision_made {
            Some(ConversionDecision::Copy { dest }) => {
                (Some(FileAction::Copy), Some(dest.clone()), None)
            }
            Some(ConversionDecision::Encode(params)) => (
                Some(FileAction::Encode),
                Some(params.output_path.clone()),
                Some(params.bitrate),
            ),
            None => (None, None, None),
        };

        FileResult {
            index,
            source_path,
            relative_path: record.relative_path.clone(),
            outcome,
            action,
            output_path,
            source_bitrate: record.probe.as_ref().map(|p| p.bitrate),
            target_bitrate,
            output_bytes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn handle_file(
        &self,
        index: usize,
        run: &mut BatchRun,
        output_root: &Path,
        cancel: &CancellationToken,
        events: &EventSink,
        decision_made: &mut Option<ConversionDecision>,
    ) -> Result<Processed, PipelineError> {
        let source = run.files[index].source_path.clone();

        let probe = probe_file(&self.prober, &source, cancel).await?;
        debug!(
            "Probed: codec={:?} channels={:?} bitrate={} sample_rate={:?}",
            probe.codec, probe.channels, probe.bitrate, probe.sample_rate
        );
        let duration = probe.duration;
        run.files[index].probe = Some(probe);

        let decision = policy::decide(&run.files[index], &self.settings, output_root);
        *decision_made = Some(decision.clone());

        let dest = decision.output_path().to_path_buf();
        let to_pipeline_error = |e: std::io::Error| match &decision {
            ConversionDecision::Copy { .. } => PipelineError::CopyFailed(e),
            ConversionDecision::Encode(_) => PipelineError::EncodeFailed(e.into()),
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(to_pipeline_error)?;
        }
        if dest == source || is_same_file(&source, &dest).await {
            return Err(PipelineError::InvalidInput(format!(
                "output would overwrite its source: {}",
                source.display()
            )));
        }

        match decision {
            ConversionDecision::Copy { dest } => {
                debug!("Mono within copy threshold, copying to {:?}", dest);
                let mut on_progress = |fraction: f64| {
                    events.send(BatchEvent::Progress {
                        index,
                        file_fraction: fraction,
                        overall: run.overall(fraction),
                    });
                };
                let output_bytes = copy_file(&source, &dest, &mut on_progress, cancel).await?;
                Ok(Processed {
                    action: FileAction::Copy,
                    output_path: dest,
                    output_bytes,
                })
            }
            ConversionDecision::Encode(params) => {
                debug!("Re-encoding to {:?}", params.output_path);

                let total_fraction = |fraction: f64| run.overall(fraction);
                let mut on_progress = |fraction: f64| {
                    events.send(BatchEvent::Progress {
                        index,
                        file_fraction: fraction,
                        overall: total_fraction(fraction),
                    });
                };

                let summary = self
                    .encoder
                    .encode(&source, &params, duration, &mut on_progress, cancel)
                    .await
                    .map_err(|e| {
                        if e.is_cancelled() {
                            PipelineError::Cancelled
                        } else {
                            PipelineError::EncodeFailed(e)
                        }
                    })?;

                Ok(Processed {
                    action: FileAction::Encode,
                    output_path: summary.output_path,
                    output_bytes: summary.output_bytes,
                })
            }
        }
    }

    /// Scan, probe and decide without writing anything.
    pub async fn plan(
        &self,
        request: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlanEntry>, PipelineError> {
        request.validate()?;
        let output_root = request.absolute_output_root()?;

        let mut entries = Vec::new();
        for mut record in self.scanner.scan(&request.source_root)? {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let entry = match probe_file(&self.prober, &record.source_path, cancel).await {
                Ok(probe) => {
                    record.probe = Some(probe);
                    let decision = policy::decide(&record, &self.settings, &output_root);
                    PlanEntry {
                        record,
                        decision: Some(decision),
                        error: None,
                    }
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => PlanEntry {
                    record,
                    decision: None,
                    error: Some(e.to_string()),
                },
            };
            entries.push(entry);
        }

        Ok(entries)
    }
}

async fn probe_file<P: MediaProbe>(
    prober: &P,
    source: &Path,
    cancel: &CancellationToken,
) -> Result<AudioProbe, PipelineError> {
    prober.probe(source, cancel).await.map_err(|e| {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::ProbeFailed(e)
        }
    })
}

/// Whether `dest` exists and resolves to the same file as `source`.
async fn is_same_file(source: &Path, dest: &Path) -> bool {
    match (
        tokio::fs::canonicalize(source).await,
        tokio::fs::canonicalize(dest).await,
    ) {
        (Ok(source), Ok(dest)) => source == dest,
        _ => false,
    }
}

/// Copy `source` to `dest` in chunks, stopping between chunks when `cancel`
/// fires. Both handles are closed before returning.
async fn copy_file(
    source: &Path,
    dest: &Path,
    on_progress: &mut (dyn FnMut(f64) + Send),
    cancel: &CancellationToken,
) -> Result<u64, PipelineError> {
    let mut reader = File::open(source).await.map_err(PipelineError::CopyFailed)?;
    let metadata = reader.metadata().await.map_err(PipelineError::CopyFailed)?;
    let total = metadata.len();
    let mut writer = File::create(dest).await.map_err(PipelineError::CopyFailed)?;

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            // Wait for any in-flight write before the handle is dropped.
            let _ = writer.flush().await;
            return Err(PipelineError::Cancelled);
        }

        let n = reader.read(&mut buf).await.map_err(PipelineError::CopyFailed)?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(PipelineError::CopyFailed)?;
        copied += n as u64;

        if total > 0 {
            on_progress((copied as f64 / total as f64).min(1.0));
        }
    }

    writer.flush().await.map_err(PipelineError::CopyFailed)?;
    writer
        .set_permissions(metadata.permissions())
        .await
        .map_err(PipelineError::CopyFailed)?;

    Ok(copied)
}
