//! Pipeline integration tests
//!
//! Batch runs over temporary source trees with in-process stand-ins for the
//! prober and encoder. The final test uses real ffmpeg/ffprobe and skips
//! itself when they are not installed.

use assert_matches::assert_matches;
use async_trait::async_trait;
use audiobook_av::{
    AudioProbe, EncodeParams, EncodeSummary, Encoder, MediaProbe, ReportedBitrate,
};
use audiobook_compressor::pipeline::{
    BatchEvent, BatchPipeline, BatchRequest, EventSink, FileAction, FileOutcome, PipelineError,
    RunState, RunStatus,
};
use audiobook_compressor::policy::ConversionDecision;
use audiobook_compressor::scanner::DirectoryScanner;
use audiobook_compressor::settings::EncodingSettings;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

/// Probe results keyed by file name; unknown names fail to probe.
struct FakeProber {
    results: HashMap<String, AudioProbe>,
}

impl FakeProber {
    fn new(entries: &[(&str, Option<u32>, ReportedBitrate)]) -> Self {
        let results = entries
            .iter()
            .map(|(name, channels, bitrate)| {
                (
                    name.to_string(),
                    AudioProbe {
                        codec: Some("mp3".to_string()),
                        channels: *channels,
                        bitrate: *bitrate,
                        sample_rate: Some(44_100),
                        duration: Some(Duration::from_secs(60)),
                    },
                )
            })
            .collect();
        Self { results }
    }
}

#[async_trait]
impl MediaProbe for FakeProber {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(
        &self,
        path: &Path,
        _cancel: &CancellationToken,
    ) -> audiobook_av::Result<AudioProbe> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.results
            .get(&name)
            .cloned()
            .ok_or_else(|| audiobook_av::Error::tool_failed("ffprobe", "exit status: 1"))
    }
}

/// How the fake encoder treats a given source file.
#[derive(Clone, Copy)]
enum Behaviour {
    Write,
    WriteEmpty,
    WriteNothing,
    /// Request cancellation, then wait to be killed.
    CancelAndHang,
}

#[derive(Default)]
struct EncoderLog {
    encoded: Mutex<Vec<PathBuf>>,
    killed: AtomicBool,
}

struct FakeEncoder {
    behaviour: HashMap<String, Behaviour>,
    log: Arc<EncoderLog>,
    trigger: CancellationToken,
}

impl FakeEncoder {
    fn new(log: Arc<EncoderLog>) -> Self {
        Self {
            behaviour: HashMap::new(),
            log,
            trigger: CancellationToken::new(),
        }
    }

    fn with(mut self, name: &str, behaviour: Behaviour) -> Self {
        self.behaviour.insert(name.to_string(), behaviour);
        self
    }

    fn cancelling(mut self, trigger: CancellationToken) -> Self {
        self.trigger = trigger;
        self
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn encode(
        &self,
        source: &Path,
        params: &EncodeParams,
        _duration: Option<Duration>,
        on_progress: &mut (dyn FnMut(f64) + Send),
        cancel: &CancellationToken,
    ) -> audiobook_av::Result<EncodeSummary> {
        let name = source.file_name().unwrap().to_string_lossy().to_string();
        self.log.encoded.lock().unwrap().push(source.to_path_buf());

        on_progress(0.5);

        match self.behaviour.get(&name).copied().unwrap_or(Behaviour::Write) {
            Behaviour::Write => std::fs::write(&params.output_path, b"encoded audio")?,
            Behaviour::WriteEmpty => std::fs::write(&params.output_path, b"")?,
            Behaviour::WriteNothing => {}
            Behaviour::CancelAndHang => {
                self.trigger.cancel();
                cancel.cancelled().await;
                self.log.killed.store(true, Ordering::SeqCst);
                return Err(audiobook_av::Error::Cancelled);
            }
        }

        on_progress(1.0);
        let output_bytes = audiobook_av::encode::verify_output(&params.output_path).await?;
        Ok(EncodeSummary {
            output_path: params.output_path.clone(),
            output_bytes,
            elapsed: Duration::from_millis(1),
        })
    }
}

fn pipeline(prober: FakeProber, encoder: FakeEncoder) -> BatchPipeline<FakeProber, FakeEncoder> {
    BatchPipeline::new(
        prober,
        encoder,
        EncodingSettings::default(),
        DirectoryScanner::new("Compressed_Audiobooks"),
    )
}

fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn states(events: &[BatchEvent]) -> Vec<RunState> {
    events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::StateChanged { state } => Some(*state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_invalid_input_fails_fast() {
    let dir = tempdir().unwrap();
    let log = Arc::new(EncoderLog::default());
    let pipeline = pipeline(FakeProber::new(&[]), FakeEncoder::new(log.clone()));
    let cancel = CancellationToken::new();

    for request in [
        BatchRequest::new("", dir.path().join("out")),
        BatchRequest::new(dir.path(), ""),
        BatchRequest::new(dir.path().join("missing"), dir.path().join("out")),
    ] {
        let (events, rx) = EventSink::channel();
        let result = pipeline.run(&request, &cancel, &events).await;
        assert_matches!(result, Err(PipelineError::InvalidInput(_)));
        drop(events);
        assert!(drain(rx).is_empty());
    }

    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_empty_source_is_nothing_to_do() {
    let dir = tempdir().unwrap();
    write(dir.path(), "notes.txt", b"not audio");

    let log = Arc::new(EncoderLog::default());
    let pipeline = pipeline(FakeProber::new(&[]), FakeEncoder::new(log.clone()));
    let (events, rx) = EventSink::channel();

    let report = pipeline
        .run(
            &BatchRequest::new(dir.path(), dir.path().join("out")),
            &CancellationToken::new(),
            &events,
        )
        .await
        .unwrap();
    drop(events);

    assert_eq!(report.status, RunStatus::NothingToDo);
    assert_eq!(report.total, 0);
    assert!(report.files.is_empty());

    let events = drain(rx);
    assert_eq!(states(&events), vec![RunState::Scanning, RunState::Completed]);
    assert_matches!(
        events.last(),
        Some(BatchEvent::RunFinished {
            status: RunStatus::NothingToDo
        })
    );
}

#[tokio::test]
async fn test_mixed_batch_continues_after_failures() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("books");
    let output = source.join("Compressed_Audiobooks");
    write(&source, "a_copy.mp3", b"mono source bytes");
    write(&source, "b_encode.flac", b"stereo source");
    write(&source, "c_unprobeable.mp3", b"garbage");
    write(&source, "d_empty.mp3", b"stereo");
    write(&source, "e_missing.mp3", b"stereo");
    // Earlier output must not be picked up again.
    write(&output, "old.m4b", b"previous output");

    let prober = FakeProber::new(&[
        ("a_copy.mp3", Some(1), ReportedBitrate::Bps(56_000)),
        ("b_encode.flac", Some(2), ReportedBitrate::Absent),
        ("d_empty.mp3", Some(2), ReportedBitrate::Bps(128_000)),
        ("e_missing.mp3", Some(2), ReportedBitrate::Bps(128_000)),
    ]);
    let log = Arc::new(EncoderLog::default());
    let encoder = FakeEncoder::new(log.clone())
        .with("d_empty.mp3", Behaviour::WriteEmpty)
        .with("e_missing.mp3", Behaviour::WriteNothing);

    let (events, rx) = EventSink::channel();
    let report = pipeline(prober, encoder)
        .run(
            &BatchRequest::new(&source, &output),
            &CancellationToken::new(),
            &events,
        )
        .await
        .unwrap();
    drop(events);

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.total, 5);
    assert_eq!(report.files.len(), 5);
    assert_eq!(report.successes(), 2);
    assert_eq!(report.failures(), 3);
    assert_eq!(report.skipped(), 0);

    let a = &report.files[0];
    assert_eq!(a.outcome, FileOutcome::Success);
    assert_eq!(a.action, Some(FileAction::Copy));
    assert_eq!(a.source_bitrate, Some(ReportedBitrate::Bps(56_000)));
    assert_eq!(
        std::fs::read(output.join("a_copy.mp3")).unwrap(),
        b"mono source bytes"
    );

    let b = &report.files[1];
    assert_eq!(b.outcome, FileOutcome::Success);
    assert_eq!(b.action, Some(FileAction::Encode));
    assert_eq!(b.output_path, Some(output.join("b_encode.m4b")));
    assert_eq!(b.target_bitrate.map(|r| r.bps()), Some(48_000));
    assert!(output.join("b_encode.m4b").exists());

    assert_matches!(&report.files[2].outcome, FileOutcome::Failed { reason } => {
        assert!(reason.starts_with("probe failed"), "{reason}");
    });
    assert_eq!(report.files[2].action, None);

    assert_matches!(&report.files[3].outcome, FileOutcome::Failed { reason } => {
        assert!(reason.contains("empty"), "{reason}");
    });
    // Partial output stays in place.
    assert!(output.join("d_empty.m4b").exists());

    assert_matches!(&report.files[4].outcome, FileOutcome::Failed { reason } => {
        assert!(reason.contains("missing"), "{reason}");
    });

    // Copies never reach the encoder.
    let encoded = log.encoded.lock().unwrap().clone();
    assert_eq!(encoded.len(), 3);
    assert!(encoded.iter().all(|p| !p.ends_with("a_copy.mp3")));

    let events = drain(rx);
    assert_eq!(
        states(&events),
        vec![
            RunState::Scanning,
            RunState::ProbingAndEncoding,
            RunState::Completed
        ]
    );
    assert_matches!(events.iter().find(|e| matches!(e, BatchEvent::RunStarted { .. })),
        Some(BatchEvent::RunStarted { total: 5, .. }));
}

#[tokio::test]
async fn test_event_ordering_and_progress() {
    let dir = tempdir().unwrap();
    for name in ["1.mp3", "2.mp3", "3.mp3"] {
        write(dir.path(), name, b"stereo");
    }
    let prober = FakeProber::new(&[
        ("1.mp3", Some(2), ReportedBitrate::Bps(128_000)),
        ("2.mp3", Some(2), ReportedBitrate::Bps(128_000)),
        ("3.mp3", Some(2), ReportedBitrate::Bps(128_000)),
    ]);
    let log = Arc::new(EncoderLog::default());

    let (events, rx) = EventSink::channel();
    pipeline(prober, FakeEncoder::new(log))
        .run(
            &BatchRequest::new(dir.path(), dir.path().join("out")),
            &CancellationToken::new(),
            &events,
        )
        .await
        .unwrap();
    drop(events);

    let mut current: Option<usize> = None;
    let mut completed = Vec::new();
    let mut last_overall = 0.0;
    for event in drain(rx) {
        match event {
            BatchEvent::FileStarted { index, .. } => {
                assert_eq!(current, None);
                current = Some(index);
            }
            BatchEvent::Progress { index, overall, file_fraction } => {
                assert_eq!(current, Some(index), "progress outside its file");
                assert!((0.0..=1.0).contains(&file_fraction));
                assert!(overall >= last_overall, "overall went backwards");
                assert!(overall <= 1.0);
                last_overall = overall;
            }
            BatchEvent::FileCompleted { result } => {
                assert_eq!(current, Some(result.index));
                current = None;
                completed.push(result.index);
            }
            _ => {}
        }
    }

    assert_eq!(completed, vec![0, 1, 2]);
    assert_eq!(last_overall, 1.0);
}

#[tokio::test]
async fn test_zero_bitrate_mono_is_encoded() {
    let dir = tempdir().unwrap();
    write(dir.path(), "zero.mp3", b"mono");
    let prober = FakeProber::new(&[("zero.mp3", Some(1), ReportedBitrate::Bps(0))]);
    let log = Arc::new(EncoderLog::default());

    let report = pipeline(prober, FakeEncoder::new(log.clone()))
        .run(
            &BatchRequest::new(dir.path(), dir.path().join("out")),
            &CancellationToken::new(),
            &EventSink::noop(),
        )
        .await
        .unwrap();

    assert_eq!(report.files[0].action, Some(FileAction::Encode));
    assert_eq!(log.encoded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_mid_run() {
    let dir = tempdir().unwrap();
    for name in ["a.mp3", "b.mp3", "c.mp3"] {
        write(dir.path(), name, b"stereo");
    }
    let prober = FakeProber::new(&[
        ("a.mp3", Some(2), ReportedBitrate::Bps(128_000)),
        ("b.mp3", Some(2), ReportedBitrate::Bps(128_000)),
        ("c.mp3", Some(2), ReportedBitrate::Bps(128_000)),
    ]);
    let cancel = CancellationToken::new();
    let log = Arc::new(EncoderLog::default());
    let encoder = FakeEncoder::new(log.clone())
        .with("b.mp3", Behaviour::CancelAndHang)
        .cancelling(cancel.clone());

    let (events, rx) = EventSink::channel();
    let report = pipeline(prober, encoder)
        .run(
            &BatchRequest::new(dir.path(), dir.path().join("out")),
            &cancel,
            &events,
        )
        .await
        .unwrap();
    drop(events);

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].outcome, FileOutcome::Success);
    assert_eq!(report.files[1].outcome, FileOutcome::Cancelled);
    assert_eq!(report.skipped(), 2);
    assert!(log.killed.load(Ordering::SeqCst));

    // c.mp3 was never started.
    assert_eq!(log.encoded.lock().unwrap().len(), 2);
    assert!(!dir.path().join("out/c.m4b").exists());

    let events = drain(rx);
    assert_eq!(states(&events).last(), Some(&RunState::Cancelled));
    let successes_after_cancel = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::FileCompleted { result } if result.index >= 1 => Some(&result.outcome),
            _ => None,
        })
        .filter(|o| o.is_success())
        .count();
    assert_eq!(successes_after_cancel, 0);
}

#[tokio::test]
async fn test_cancelled_before_first_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.mp3", b"stereo");
    let prober = FakeProber::new(&[("a.mp3", Some(2), ReportedBitrate::Bps(128_000))]);
    let log = Arc::new(EncoderLog::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline(prober, FakeEncoder::new(log.clone()))
        .run(
            &BatchRequest::new(dir.path(), dir.path().join("out")),
            &cancel,
            &EventSink::noop(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.total, 1);
    assert!(report.files.is_empty());
    assert!(log.encoded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_writes_nothing() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Book/01.mp3", b"mono");
    write(dir.path(), "Book/02.mp3", b"stereo");
    write(dir.path(), "Book/03.mp3", b"broken");
    let prober = FakeProber::new(&[
        ("01.mp3", Some(1), ReportedBitrate::Bps(48_000)),
        ("02.mp3", Some(2), ReportedBitrate::Bps(128_000)),
    ]);
    let log = Arc::new(EncoderLog::default());
    let output = dir.path().join("out");

    let entries = pipeline(prober, FakeEncoder::new(log.clone()))
        .plan(
            &BatchRequest::new(dir.path(), &output),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert_matches!(&entries[0].decision, Some(ConversionDecision::Copy { dest }) => {
        assert_eq!(dest, &output.join("Book/01.mp3"));
    });
    assert_matches!(&entries[1].decision, Some(ConversionDecision::Encode(params)) => {
        assert_eq!(params.output_path, output.join("Book/02.m4b"));
    });
    assert!(entries[2].decision.is_none());
    assert!(entries[2].error.is_some());

    assert!(!output.exists());
    assert!(log.encoded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_output_aliasing_source_never_overwrites() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("books");
    let original = b"mono chapter, 56 kbps...";
    write(&source, "a.mp3", original);
    write(&source, "b.m4b", b"stereo m4b");

    for output in [source.join("sub").join(".."), source.join(".")] {
        let prober = FakeProber::new(&[
            ("a.mp3", Some(1), ReportedBitrate::Bps(56_000)),
            ("b.m4b", Some(2), ReportedBitrate::Bps(128_000)),
        ]);
        let log = Arc::new(EncoderLog::default());

        let report = pipeline(prober, FakeEncoder::new(log.clone()))
            .run(
                &BatchRequest::new(&source, &output),
                &CancellationToken::new(),
                &EventSink::noop(),
            )
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.failures(), 2, "{output:?}: {:?}", report.files);
        for file in &report.files {
            assert_matches!(&file.outcome, FileOutcome::Failed { reason } => {
                assert!(reason.contains("overwrite its source"), "{reason}");
            });
        }
        assert!(log.encoded.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(source.join("a.mp3")).unwrap(), original);
        assert_eq!(std::fs::read(source.join("b.m4b")).unwrap(), b"stereo m4b");
    }
}

#[tokio::test]
async fn test_cancellation_during_copy_stops_writing() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("books");
    let data = vec![7u8; 16 * 1024 * 1024];
    write(&source, "big.mp3", &data);
    let prober = FakeProber::new(&[("big.mp3", Some(1), ReportedBitrate::Bps(32_000))]);
    let log = Arc::new(EncoderLog::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let (events, mut rx) = EventSink::channel();
    let watcher = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let BatchEvent::Progress { file_fraction, .. } = event {
                if file_fraction > 0.0 && file_fraction < 1.0 {
                    trigger.cancel();
                }
            }
        }
    });

    let output = dir.path().join("out");
    let report = pipeline(prober, FakeEncoder::new(log))
        .run(&BatchRequest::new(&source, &output), &cancel, &events)
        .await
        .unwrap();
    drop(events);
    watcher.await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].outcome, FileOutcome::Cancelled);
    assert_eq!(report.files[0].action, Some(FileAction::Copy));

    // Nothing keeps writing once the run has returned.
    let dest = output.join("big.mp3");
    let written = std::fs::metadata(&dest).unwrap().len();
    assert!(written < data.len() as u64);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), written);
}

// ---------------------------------------------------------------------------
// Real tools
// ---------------------------------------------------------------------------

fn tools_available() -> bool {
    which::which("ffmpeg").is_ok() && which::which("ffprobe").is_ok()
}

/// Generate a short tone; `None` if this ffmpeg build cannot.
fn generate(path: &Path, args: &[&str]) -> Option<()> {
    let status = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i", "sine=frequency=440:duration=2"])
        .args(args)
        .arg(path)
        .status()
        .ok()?;
    status.success().then_some(())
}

#[tokio::test]
async fn test_end_to_end_with_ffmpeg() {
    if !tools_available() {
        eprintln!("Skipping: ffmpeg/ffprobe not installed");
        return;
    }

    let dir = tempdir().unwrap();
    let source = dir.path().join("lectures");
    std::fs::create_dir_all(&source).unwrap();
    let lecture1 = source.join("lecture1.mp3");
    let lecture2 = source.join("lecture2.flac");

    if generate(&lecture1, &["-ac", "1", "-c:a", "libmp3lame", "-b:a", "56k"]).is_none()
        || generate(&lecture2, &["-ac", "2", "-c:a", "flac"]).is_none()
    {
        eprintln!("Skipping: ffmpeg cannot generate test sources");
        return;
    }

    let tools = Arc::new(audiobook_av::ToolRegistry::discover(
        &audiobook_av::ToolPaths::default(),
    ));
    let prober = audiobook_av::FfprobeProber::new(tools.clone());
    let probe = prober
        .probe(&lecture1, &CancellationToken::new())
        .await
        .unwrap();
    if probe.bitrate.known() != Some(56_000) {
        eprintln!("Skipping: unexpected source bitrate {:?}", probe.bitrate);
        return;
    }

    let output = source.join("Compressed_Audiobooks");
    let pipeline = BatchPipeline::new(
        prober,
        audiobook_av::FfmpegEncoder::new(tools.clone()),
        EncodingSettings::default(),
        DirectoryScanner::new("Compressed_Audiobooks"),
    );
    let report = pipeline
        .run(
            &BatchRequest::new(&source, &output),
            &CancellationToken::new(),
            &EventSink::noop(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successes(), 2, "{:?}", report.files);

    assert_eq!(report.files[0].action, Some(FileAction::Copy));
    assert_eq!(
        std::fs::read(output.join("lecture1.mp3")).unwrap(),
        std::fs::read(&lecture1).unwrap()
    );

    assert_eq!(report.files[1].action, Some(FileAction::Encode));
    let encoded = output.join("lecture2.m4b");
    let probe = audiobook_av::FfprobeProber::new(tools)
        .probe(&encoded, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(probe.codec.as_deref(), Some("aac"));
    assert_eq!(probe.channels, Some(1));
    assert_eq!(probe.sample_rate, Some(22_050));
}
