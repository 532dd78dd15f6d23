//! Binary entry point for clinical-brain.
//!
//! Serves the analysis endpoint or runs single pipeline stages from the
//! command line.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use clinical_brain::observability::{self, ObservabilityConfig};
use clinical_brain::services::chunk_transcription;
use clinical_brain::{AnalysisRequest, BrainConfig, ClinicalBrainService};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Clinical Brain - cost-optimized clinical transcription analysis.
#[derive(Parser)]
#[command(name = "clinical-brain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CLINICAL_BRAIN_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the full pipeline on a transcription and print the response JSON.
    Analyze {
        #[command(flatten)]
        input: TranscriptionArgs,

        /// Force a model tier.
        #[arg(short, long)]
        force_model: Option<String>,
    },

    /// Print the model selection for a transcription without calling any model.
    Select {
        #[command(flatten)]
        input: TranscriptionArgs,

        /// Force a model tier.
        #[arg(short, long)]
        force_model: Option<String>,
    },

    /// Print the assembled prompt(s) for a transcription.
    Prompt {
        #[command(flatten)]
        input: TranscriptionArgs,

        /// Split the transcription into chunks of at most this many characters.
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

/// Transcription input shared by the pipeline commands.
#[derive(Args)]
struct TranscriptionArgs {
    /// Transcription file, or `-` for stdin.
    #[arg(default_value = "-")]
    file: String,

    /// Clinical specialty.
    #[arg(short, long)]
    specialty: Option<String>,

    /// Session type (initial or followup).
    #[arg(long)]
    session_type: Option<String>,
}

impl TranscriptionArgs {
    fn into_request(self) -> Result<AnalysisRequest> {
        let transcription = read_transcription(&self.file)?;
        Ok(AnalysisRequest {
            transcription,
            specialty: self.specialty,
            session_type: self.session_type,
            ..AnalysisRequest::default()
        })
    }
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match BrainConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init(ObservabilityConfig::from_settings(
        Some(&config.logging),
        Some(&config.metrics),
        cli.verbose,
    )) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: BrainConfig) -> Result<()> {
    match command {
        Commands::Serve { host, port } => cmd_serve(config, host, port),
        Commands::Analyze { input, force_model } => cmd_analyze(&config, input, force_model),
        Commands::Select { input, force_model } => cmd_select(&config, input, force_model),
        Commands::Prompt { input, chunk_size } => cmd_prompt(&config, input, chunk_size),
    }
}

fn cmd_serve(mut config: BrainConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    // The blocking HTTP client must be built outside the async runtime.
    let service = Arc::new(ClinicalBrainService::from_config(&config)?);
    let addr = config.bind_address();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create async runtime")?;

    runtime.block_on(clinical_brain::server::serve(
        service,
        &addr,
        config.server.max_body_bytes,
    ))?;
    Ok(())
}

fn cmd_analyze(
    config: &BrainConfig,
    input: TranscriptionArgs,
    force_model: Option<String>,
) -> Result<()> {
    let request = AnalysisRequest {
        force_model,
        ..input.into_request()?
    };
    let service = ClinicalBrainService::from_config(config)?;
    let response = service.analyze(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_select(
    config: &BrainConfig,
    input: TranscriptionArgs,
    force_model: Option<String>,
) -> Result<()> {
    let request = AnalysisRequest {
        force_model,
        ..input.into_request()?
    };
    let service = ClinicalBrainService::from_config(config)?;
    let selection = service.select(&request)?;
    println!("{}", serde_json::to_string_pretty(&selection)?);
    Ok(())
}

fn cmd_prompt(
    config: &BrainConfig,
    input: TranscriptionArgs,
    chunk_size: Option<usize>,
) -> Result<()> {
    let request = input.into_request()?;
    let service = ClinicalBrainService::from_config(config)?;

    let Some(max_chars) = chunk_size.filter(|size| *size > 0) else {
        println!("{}", service.prompt_for(&request)?);
        return Ok(());
    };

    let chunks = chunk_transcription(&request.transcription, max_chars);
    let total = u32::try_from(chunks.len()).context("too many chunks")?;
    for (index, chunk) in (1..=total).zip(&chunks) {
        let chunk_request = AnalysisRequest {
            transcription: (*chunk).to_string(),
            chunk_index: Some(index),
            total_chunks: Some(total),
            ..request.clone()
        };
        if index > 1 {
            println!();
        }
        println!("===== {index}/{total} =====");
        println!("{}", service.prompt_for(&chunk_request)?);
    }
    Ok(())
}

fn read_transcription(file: &str) -> Result<String> {
    if file == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read transcription from stdin")?;
        return Ok(buffer);
    }

    std::fs::read_to_string(Path::new(file))
        .with_context(|| format!("failed to read transcription from {file}"))
}
