//! # aec-offline - Main Application Entry Point
//!
//! Offline acoustic echo cancellation runner. Takes a far-end (loudspeaker)
//! recording and a near-end (microphone) recording and writes the cleaned
//! near-end signal to a new WAV file.
//!
//! ```text
//! aec-offline <farend.wav> <nearend.wav> <out.wav> [--debug]
//! ```
//!
//! ## Application Architecture:
//! - **audio**: WAV container codec, frame scheduler and run session
//! - **engine**: processing engine contract, call-order adapter and built-in engine
//! - **diagnostics**: `--debug` dump of raw audio, per-frame statistics and metrics
//! - **pipeline**: the driver that ties everything together
//! - **config**: defaults, `aec-offline.toml` and `AEC_*` environment variables
//! - **error**: error types and exit codes
//!
//! ## Exit Codes:
//! - `0`: success, or `--help` / `--version`
//! - `1`: usage error, unreadable input, invalid header or any other failure
//!
//! ## Rust Concepts:
//! - **Modules**: `mod` declarations pull the other source files into the crate
//! - **anyhow::Result**: errors from every layer meet here with added context
//! - **Downcasting**: `downcast_ref` recovers the `PipelineError` behind an `anyhow::Error`
//! - **Derive macros**: `#[derive(Parser)]` generates the argument parser from `Args`

mod audio;       // Container codec and framing (audio/ directory)
mod config;      // Configuration management (config.rs)
mod diagnostics; // Debug dump (diagnostics.rs)
mod engine;      // Processing engine (engine/ directory)
mod error;       // Error handling types (error.rs)
mod pipeline;    // Pipeline driver (pipeline.rs)

use anyhow::{Context, Result};         // Error handling with context at the binary boundary
use clap::error::ErrorKind;            // Tells help/version output apart from real parse errors
use clap::Parser;                      // Derive-based argument parsing
use crate::config::AppConfig;          // Layered configuration
use crate::engine::BuiltinEngine;      // Engine shipped with the binary
use crate::error::PipelineError;       // Typed pipeline errors and their exit codes
use crate::pipeline::RunRequest;       // What one run processes
use std::path::PathBuf;
use tracing::{error, info};            // Structured logging
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Offline two-stream acoustic echo cancellation.
#[derive(Debug, Parser)]
#[command(name = "aec-offline", version, about)]
struct Args {
    /// Far-end (loudspeaker / reference) WAV file
    farend: PathBuf,

    /// Near-end (microphone) WAV file
    nearend: PathBuf,

    /// Output WAV file for the processed near-end signal
    output: PathBuf,

    /// Dump raw audio, per-frame statistics and engine metrics next to the output
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap renders help, version and usage errors itself
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        }
    };

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {:#}", e);
    }

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(failure_exit_code(&e));
    }
}

/// Exit code for a command line clap refused to parse.
///
/// `--help` and `--version` come back from clap as errors but are successful runs.
fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => PipelineError::Usage(err.to_string()).exit_code(),
    }
}

/// Exit code for a failed run; errors that are not a `PipelineError` exit 1 too.
fn failure_exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>()
        .map_or(1, PipelineError::exit_code)
}

/// Load configuration, then process the two inputs with the built-in engine.
fn run(args: Args) -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting aec-offline v{}", env!("CARGO_PKG_VERSION"));
    let request = RunRequest {
        farend: args.farend,
        nearend: args.nearend,
        output: args.output,
        debug: args.debug,
    };

    let summary = pipeline::run(&request, &config, BuiltinEngine::new())?;
    if let Some(dir) = &summary.dump_dir {
        info!("Debug data written to {}", dir.display());
    }
    info!(
        "Processed {} frames, {} samples per channel -> {}",
        summary.frames,
        summary.samples,
        summary.output.display()
    );
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g. "aec_offline=debug")
/// - If not set, defaults to "aec_offline=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aec_offline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
