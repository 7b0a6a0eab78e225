//! AAC Normalizer - batch conversion of audio streams to AAC via ffmpeg.
//!
//! Files are converted one at a time. While ffmpeg runs, its progress
//! reports, the growing output file and the wall clock are combined into a
//! per-file and queue-wide progress estimate.

pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod media;
pub mod notify;
pub mod queue;
pub mod validation;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, ConvertArgs};
use crate::config::AppConfig;
use crate::media::{FfprobeProber, InputScanner, MediaProber};
use crate::notify::ConsoleReporter;
use crate::queue::QueueController;
use crate::validation::SystemCapabilities;

/// Exit code used when the run was interrupted with Ctrl+C.
const INTERRUPTED_EXIT_CODE: u8 = 130;

/// Runs the application with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let config = config::load(cli.config.as_deref())?;

    let level = cli
        .verbosity_level()
        .unwrap_or(config.global.log_level.as_str());
    setup_logging(level, cli.json_logs)?;

    match cli.command {
        Commands::Convert(args) => convert(args, config).await,
        Commands::ConfigValidate => validate_config(&config),
        Commands::ConfigShow => show_config(&config),
        Commands::Probe { file } => probe_file(&file, &config),
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides `level`.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Converts every input and reports the outcome.
async fn convert(args: ConvertArgs, mut config: AppConfig) -> Result<ExitCode> {
    args.apply_to(&mut config);

    let capabilities = SystemCapabilities::detect(&config.global.ffmpeg_path, &config.global.ffprobe_path)
        .context("Failed to query ffmpeg")?;
    info!(encoders = capabilities.available_encoders.len(), "Detected ffmpeg capabilities");
    config::ensure_valid(&config, &capabilities)?;

    let files = InputScanner::new(&config.input)?.expand(&args.inputs)?;
    let input_check = validation::paths::validate_inputs(&files, &config.output.directory);
    if !input_check.is_valid() {
        eprintln!("{}", validation::report::format_report(&input_check));
        anyhow::bail!("Refusing to write into an input directory");
    }

    if files.is_empty() {
        warn!("No input files found");
        return Ok(ExitCode::SUCCESS);
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let prober: Arc<dyn MediaProber> = Arc::new(FfprobeProber::new(config.global.ffprobe_path.clone()));
    let mut controller = QueueController::new(config, prober, events_tx);
    for file in files {
        controller.enqueue(file);
    }

    let handle = controller.handle();
    let reporter = tokio::spawn(ConsoleReporter::new().run(events_rx));

    let queue = controller.run();
    tokio::pin!(queue);

    let mut interrupted = false;
    let summary = loop {
        tokio::select! {
            summary = &mut queue => break summary,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Cannot listen for Ctrl+C");
                    break (&mut queue).await;
                }
                if interrupted {
                    warn!("Second interrupt, exiting immediately");
                    return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE));
                }
                interrupted = true;
                info!("Interrupt received, cancelling the active job (press Ctrl+C again to exit immediately)");
                handle.cancel();
            }
        }
    };

    reporter.await.context("Console reporter stopped unexpectedly")?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        info!(path = %path.display(), "Wrote queue report");
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else if interrupted {
        ExitCode::from(INTERRUPTED_EXIT_CODE)
    } else {
        ExitCode::SUCCESS
    })
}

/// Validates the configuration and prints a report.
fn validate_config(config: &AppConfig) -> Result<ExitCode> {
    let capabilities = SystemCapabilities::detect(&config.global.ffmpeg_path, &config.global.ffprobe_path)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Could not query ffmpeg, encoder checks will fail");
            SystemCapabilities::default()
        });

    let result = validation::validate_config(config, &capabilities);
    println!("{}", validation::report::format_report(&result));

    if result.is_valid() {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(error::ConfigError::ValidationFailed {
            error_count: result.error_count(),
        }
        .into())
    }
}

/// Displays the effective configuration.
fn show_config(config: &AppConfig) -> Result<ExitCode> {
    let yaml = serde_yaml::to_string(config)?;
    println!("{}", yaml);
    Ok(ExitCode::SUCCESS)
}

/// Prints duration and audio streams of a single file.
fn probe_file(file: &Path, config: &AppConfig) -> Result<ExitCode> {
    let prober = FfprobeProber::new(config.global.ffprobe_path.clone());
    let summary = prober
        .probe(file)
        .with_context(|| format!("Failed to probe '{}'", file.display()))?;

    println!("File:     {}", file.display());
    match summary.duration_secs {
        Some(secs) => println!("Duration: {} ({:.3}s)", notify::console::format_eta(secs), secs),
        None => println!("Duration: unknown"),
    }
    println!("Audio streams: {}", summary.audio_stream_count());
    for stream in &summary.audio_streams {
        println!(
            "  #{} {} {}ch {}Hz",
            stream.index,
            stream.codec.as_deref().unwrap_or("unknown"),
            stream.channels.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
            stream.sample_rate.map(|r| r.to_string()).unwrap_or_else(|| "?".to_string()),
        );
    }

    Ok(ExitCode::SUCCESS)
}
