//! parlance - audio transcription pipeline for interview practice
//!
//! Normalizes an uploaded recording and transcribes it through a priority-ordered
//! chain of backends (remote API, local subprocess model, in-process model),
//! unifying every backend's output into one canonical transcript.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod stt;
pub mod sys;

// Core types (asset → normalize → transcribe → assemble)
pub use audio::asset::{AudioAsset, MimeType};
pub use audio::normalize::{PcmBuffer, SignalNormalizer};
pub use stt::assembler::TranscriptAssembler;
pub use stt::backend::{BackendInput, BackendKind, InputFormat, TranscriptionBackend};
pub use stt::transcript::{Transcript, TranscriptSegment};

// Pipeline
pub use pipeline::attempt::{AttemptOutcome, BackendAttempt};
pub use pipeline::builder::build_orchestrator;
pub use pipeline::orchestrator::{FallbackOrchestrator, TranscriptionReport};

// Subprocess plumbing
pub use process::runner::{CommandSpec, ProcessOutput, SubprocessRunner};

// Error handling
pub use error::{ErrorBody, ErrorKind, ParlanceError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
