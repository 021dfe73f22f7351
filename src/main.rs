//! vidscribe - batch video transcription with burned-in subtitles
//!
//! Resolves the input to one or more videos, then for each one extracts the
//! audio with ffmpeg, transcribes it with Gemini, writes an SRT file and burns
//! it into a copy of the video.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vidscribe::cancel::CancelSignal;
use vidscribe::cli::Args;
use vidscribe::config::Config;
use vidscribe::media::MediaProcessorFactory;
use vidscribe::setup::SetupManager;
use vidscribe::transcribe::TranscriberFactory;
use vidscribe::workflow::Workflow;

/// Some videos failed in directory mode.
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match setup_logging(args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    info!("Starting vidscribe");

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    apply_overrides(&mut config, &args)?;

    let media = MediaProcessorFactory::create_processor(config.media.clone());
    let credentials = SetupManager::new(&config).initialize(media.as_ref()).await?;
    let transcriber =
        TranscriberFactory::create_default(config.transcriber.clone(), credentials.api_key)?;

    let cancel = CancelSignal::new();
    spawn_interrupt_handler(cancel.clone());

    info!("Transcribing {} with the {} model", args.input.display(), args.model);
    let workflow = Workflow::new(config, media, transcriber).show_progress(!args.verbose);
    let report = workflow.run(&args.input, args.model, cancel).await?;

    if !report.directory_mode {
        if let Some(output) = report.result.outputs.first() {
            println!("Wrote {}", output.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", report.summary());
    for failure in &report.result.failures {
        println!("  failed: {}", failure);
    }

    if report.result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}

/// Command line flags win over the config file
fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(output_dir) = &args.output_dir {
        config.batch.output_dir = Some(output_dir.clone());
    }
    if let Some(jobs) = args.jobs {
        config.batch.max_concurrent = jobs;
    }
    config.validate()?;
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancelSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping remaining videos...");
            cancel.cancel("interrupted");
        }
    });
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".vidscribe").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "vidscribe.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("vidscribe.log").display()
    );

    Ok(guard)
}
