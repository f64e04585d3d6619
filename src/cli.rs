//! Command-line interface for parlance
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Transcribe recordings through a chain of speech-to-text backends
#[derive(Parser, Debug)]
#[command(name = "parlance", version, about = "Audio transcription with backend fallback")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a timeout string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be positive".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe an audio file and print the transcript as JSON
    Transcribe {
        /// Audio file (wav, mp3, webm)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Media type override (default: from file extension)
        #[arg(long, value_name = "TYPE")]
        mime: Option<String>,

        /// Per-backend timeout override. Examples: 20s, 2m, 1m30s
        #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
        timeout: Option<Duration>,

        /// Backend to try, in order; repeat to build a chain (remote, subprocess, in-process)
        #[arg(long = "backend", value_name = "ID")]
        backends: Vec<String>,

        /// Print the full report including every backend attempt
        #[arg(long)]
        report: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Manage local Whisper models
    Models {
        /// Action to perform
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Print the effective configuration as TOML (secrets redacted)
    Config,
}

/// Model management actions
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// List available models
    List,
    /// Download and install a model
    Install {
        /// Model name (e.g., base.en, small.en, tiny)
        name: String,
    },
}
