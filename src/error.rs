//! Error types for parlance.

use crate::pipeline::attempt::BackendAttempt;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParlanceError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Input errors
    #[error("Audio upload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported audio type: {mime}")]
    UnsupportedMediaType { mime: String },

    #[error("Failed to decode audio: {message}")]
    Decode { message: String },

    // Backend errors
    #[error("Backend {backend} unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error("Backend {backend} timed out after {elapsed_ms} ms{}", stderr_suffix(.stderr))]
    Timeout {
        backend: String,
        elapsed_ms: u64,
        /// Anything a killed subprocess wrote to stderr before the deadline.
        stderr: String,
    },

    #[error("Backend {backend} returned unusable output: {message}")]
    BadOutput { backend: String, message: String },

    // Subprocess errors
    #[error("Executable not found: {program}")]
    ToolNotFound { program: String },

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    // Pipeline exhaustion
    #[error("All transcription backends failed ({} attempts){}", .attempts.len(), summarize(.attempts))]
    AllBackendsFailed { attempts: Vec<BackendAttempt> },

    // Model management
    #[error("Model download failed: {message}")]
    ModelDownload { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ParlanceError>;

/// Coarse classification used by the fallback orchestrator and the route layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unusable input audio. Terminal.
    Decode,
    /// Rejected before decoding (size, MIME type). Terminal.
    InvalidInput,
    /// Backend not reachable or not installed.
    Unavailable,
    /// Backend exceeded its wall-clock budget.
    Timeout,
    /// Backend produced empty or unparsable output.
    BadOutput,
    /// Every backend in the chain failed.
    AllBackendsFailed,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Decode => "decode",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadOutput => "bad_output",
            ErrorKind::AllBackendsFailed => "all_backends_failed",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

impl ParlanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParlanceError::ConfigFileNotFound { .. }
            | ParlanceError::ConfigParse { .. }
            | ParlanceError::ConfigInvalidValue { .. }
            | ParlanceError::Config(_) => ErrorKind::Config,
            ParlanceError::PayloadTooLarge { .. } | ParlanceError::UnsupportedMediaType { .. } => {
                ErrorKind::InvalidInput
            }
            ParlanceError::Decode { .. } => ErrorKind::Decode,
            ParlanceError::Unavailable { .. }
            | ParlanceError::ToolNotFound { .. }
            | ParlanceError::Spawn { .. }
            | ParlanceError::ModelDownload { .. } => ErrorKind::Unavailable,
            ParlanceError::Timeout { .. } => ErrorKind::Timeout,
            ParlanceError::BadOutput { .. } | ParlanceError::ProcessFailed { .. } => {
                ErrorKind::BadOutput
            }
            ParlanceError::AllBackendsFailed { .. } => ErrorKind::AllBackendsFailed,
            ParlanceError::Io(_) | ParlanceError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether the whole pipeline must stop rather than try the next backend.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Decode | ErrorKind::InvalidInput | ErrorKind::AllBackendsFailed
        )
    }

    /// HTTP status the route layer should answer with.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Decode | ErrorKind::InvalidInput => 400,
            _ => 500,
        }
    }

    /// Attempt log carried by `AllBackendsFailed`, empty otherwise.
    pub fn attempts(&self) -> &[BackendAttempt] {
        match self {
            ParlanceError::AllBackendsFailed { attempts } => attempts,
            _ => &[],
        }
    }

    pub(crate) fn unavailable(backend: &str, message: impl Into<String>) -> Self {
        ParlanceError::Unavailable {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(backend: &str, elapsed_ms: u64) -> Self {
        ParlanceError::Timeout {
            backend: backend.to_string(),
            elapsed_ms,
            stderr: String::new(),
        }
    }

    pub(crate) fn bad_output(backend: &str, message: impl Into<String>) -> Self {
        ParlanceError::BadOutput {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}

/// Serializable failure object handed to the route layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<BackendAttempt>,
}

impl From<&ParlanceError> for ErrorBody {
    fn from(err: &ParlanceError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
            attempts: err.attempts().to_vec(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

fn summarize(attempts: &[BackendAttempt]) -> String {
    if attempts.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = attempts.iter().map(|a| a.to_string()).collect();
    format!(": {}", parts.join("; "))
}
