mod cli;

use audiobook_av::{FfmpegEncoder, FfprobeProber, MediaProbe, ToolRegistry};
use audiobook_compressor::{
    config,
    pipeline::{BatchEvent, BatchPipeline, BatchReport, BatchRequest, EventSink, FileOutcome},
    policy::ConversionDecision,
    scanner::DirectoryScanner,
    settings::EncodingSettings,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, EncodingArgs, TargetArgs};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "audiobook_compressor=debug,audiobook_av=debug".to_string()
        } else {
            "audiobook_compressor=info,audiobook_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            target,
            encoding,
            report,
            no_progress,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let code = rt.block_on(run_batch(
                &target,
                &encoding,
                cli.config.as_deref(),
                report.as_deref(),
                !no_progress,
            ))?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Plan {
            target,
            encoding,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(plan_batch(&target, &encoding, cli.config.as_deref(), json))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("audiobook-compressor {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Everything a run or plan needs, built from config and flags.
struct Prepared {
    pipeline: BatchPipeline<FfprobeProber, FfmpegEncoder>,
    request: BatchRequest,
}

fn prepare(
    target: &TargetArgs,
    encoding: &EncodingArgs,
    config_path: Option<&Path>,
) -> Result<Prepared> {
    let config = config::load_config_or_default(config_path)?;
    let settings = encoding
        .resolve(&config)
        .context("Invalid encoding settings")?;

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    if !tools.all_available() {
        tracing::warn!(
            "ffmpeg or ffprobe not found, files will fail; run `audiobook-compressor check-tools`"
        );
    }

    let output_root = target
        .output
        .clone()
        .unwrap_or_else(|| target.source.join(&config.output.folder_name));

    let pipeline = BatchPipeline::new(
        FfprobeProber::new(tools.clone()),
        FfmpegEncoder::new(tools),
        settings,
        DirectoryScanner::new(config.output.folder_name.clone()),
    );

    Ok(Prepared {
        pipeline,
        request: BatchRequest::new(target.source.clone(), output_root),
    })
}

async fn run_batch(
    target: &TargetArgs,
    encoding: &EncodingArgs,
    config_path: Option<&Path>,
    report_path: Option<&Path>,
    show_progress: bool,
) -> Result<i32> {
    let Prepared { pipeline, request } = prepare(target, encoding, config_path)?;
    print_settings(pipeline.settings());
    println!("Source: {}", request.source_root.display());
    println!("Output: {}\n", request.output_root.display());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling...");
            ctrl_c.cancel();
        }
    });

    let (events, rx) = EventSink::channel();
    let progress = tokio::spawn(show_events(rx, show_progress));

    let result = pipeline.run(&request, &cancel, &events).await;
    drop(events);
    if let Err(e) = progress.await {
        tracing::debug!("Progress display task failed: {}", e);
    }

    let report = result?;
    print_summary(&report);

    if let Some(path) = report_path {
        report.write_json(path)?;
        println!("Report written to {}", path.display());
    }

    Ok(report.status.exit_code())
}

async fn show_events(mut rx: UnboundedReceiver<BatchEvent>, show_progress: bool) {
    let bar = if show_progress {
        ProgressBar::new(1000)
    } else {
        ProgressBar::hidden()
    };
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
    {
        Ok(style) => bar.set_style(style.progress_chars("█▓░")),
        Err(e) => tracing::debug!("Progress template rejected: {}", e),
    }

    let mut total = 0;
    while let Some(event) = rx.recv().await {
        match event {
            BatchEvent::RunStarted { total: n, .. } => total = n,
            BatchEvent::FileStarted { index, source_path } => {
                let name = source_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                bar.set_message(format!("{}/{} {}", index + 1, total, name));
            }
            BatchEvent::Progress { overall, .. } => {
                bar.set_position((overall * 1000.0).round() as u64);
            }
            BatchEvent::FileCompleted { result } => {
                let line = match &result.outcome {
                    FileOutcome::Success => format!("✓ {}", result.relative_path.display()),
                    FileOutcome::Failed { reason } => {
                        format!("✗ {}: {}", result.relative_path.display(), reason)
                    }
                    FileOutcome::Cancelled => {
                        format!("- {} (cancelled)", result.relative_path.display())
                    }
                };
                if show_progress {
                    bar.println(line);
                } else {
                    println!("{}", line);
                }
            }
            BatchEvent::StateChanged { state } => tracing::debug!("Run state: {:?}", state),
            BatchEvent::RunFinished { .. } => {}
        }
    }

    bar.finish_and_clear();
}

fn print_settings(settings: &EncodingSettings) {
    println!(
        "Settings: {} {} {}, {} x{}, mono copy threshold {}",
        settings.bitrate,
        settings.sample_rate,
        settings.channel_mode,
        settings.bitrate_control,
        settings.passes,
        settings.mono_copy_threshold
    );
}

fn print_summary(report: &BatchReport) {
    println!();
    println!("Status: {:?}", report.status);
    println!(
        "Succeeded: {}  Failed: {}  Skipped: {}  Total: {}",
        report.successes(),
        report.failures(),
        report.skipped(),
        report.total
    );
    println!(
        "Elapsed: {}s",
        (report.finished_at - report.started_at).num_seconds()
    );
}

async fn plan_batch(
    target: &TargetArgs,
    encoding: &EncodingArgs,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let Prepared { pipeline, request } = prepare(target, encoding, config_path)?;
    let entries = pipeline.plan(&request, &CancellationToken::new()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    print_settings(pipeline.settings());
    println!("Output: {}\n", request.output_root.display());

    if entries.is_empty() {
        println!("No audio files found. Nothing to do.");
        return Ok(());
    }

    for entry in &entries {
        let source = entry.record.relative_path.display();
        match (&entry.decision, &entry.error) {
            (Some(ConversionDecision::Copy { dest }), _) => {
                println!("COPY    {} -> {}", source, dest.display());
            }
            (Some(ConversionDecision::Encode(params)), _) => {
                println!(
                    "ENCODE  {} -> {} ({}, {}, {} ch)",
                    source,
                    params.output_path.display(),
                    params.bitrate,
                    params.sample_rate,
                    params.channels.count()
                );
            }
            (None, error) => {
                println!("FAIL    {}: {}", source, error.as_deref().unwrap_or("unknown error"));
            }
        }
    }

    Ok(())
}

async fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let prober = FfprobeProber::new(Arc::new(ToolRegistry::discover(&config.tools)));
    let probe = prober.probe(file, &CancellationToken::new()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Codec: {}", probe.codec.as_deref().unwrap_or("unknown"));
    match probe.channels {
        Some(channels) => println!("Channels: {}", channels),
        None => println!("Channels: unknown"),
    }
    println!("Bitrate: {}", probe.bitrate);
    match probe.sample_rate {
        Some(rate) => println!("Sample rate: {} Hz", rate),
        None => println!("Sample rate: unknown"),
    }
    if let Some(duration) = probe.duration {
        let secs = duration.as_secs();
        let mins = secs / 60;
        let hours = mins / 60;
        println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg or set [tools] paths in the config.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    let settings = EncodingSettings::resolve(&config)?;
    print_settings(&settings);
    println!("  Output folder: {}", config.output.folder_name);
    for (name, path) in [
        ("ffmpeg", config.tools.ffmpeg_path.as_ref()),
        ("ffprobe", config.tools.ffprobe_path.as_ref()),
    ] {
        let shown = path.map(PathBuf::as_path).map(Path::display);
        match shown {
            Some(p) => println!("  {}: {}", name, p),
            None => println!("  {}: from PATH", name),
        }
    }

    Ok(())
}
