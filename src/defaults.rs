//! Default configuration constants for parlance.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Target audio sample rate in Hz.
///
/// 16kHz is what every supported speech model expects.
pub const SAMPLE_RATE: u32 = 16000;

/// Target channel count. Normalized audio is always mono.
pub const CHANNELS: u16 = 1;

/// Maximum accepted upload size in bytes (25 MB).
///
/// Larger uploads are rejected before any decode work begins.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// MIME types accepted for upload.
///
/// `audio/x-wav` and `audio/wave` are aliases some browsers send for WAV.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mp3",
    "audio/mpeg",
    "audio/webm",
];

/// Timeout for the remote transcription API.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wall-clock budget for a local model-inference subprocess.
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Budget for in-process inference, including a first-use model load.
pub const IN_PROCESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Extra time the orchestrator grants on top of a backend's own timeout
/// before abandoning the attempt.
pub const ATTEMPT_GRACE: Duration = Duration::from_secs(2);

/// Estimated speaking duration per word, used when a backend omits segment end times.
///
/// Roughly 120 words per minute, a calm interview pace.
pub const SECONDS_PER_WORD: f64 = 0.5;

/// Default remote transcription endpoint (OpenAI-compatible).
pub const REMOTE_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Default remote transcription model.
pub const REMOTE_MODEL: &str = "whisper-1";

/// Default local inference executable (whisper.cpp CLI).
pub const SUBPROCESS_COMMAND: &str = "whisper-cli";

/// Default Whisper model name for local backends.
pub const DEFAULT_MODEL: &str = "base.en";

/// Default language code for transcription.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Backend priority order: remote first for fidelity, local for availability.
pub const BACKEND_ORDER: &[&str] = &["remote", "subprocess", "in-process"];

/// Report the GPU backend compiled into this build.
///
/// Only matters for the in-process Whisper model; returns "CPU" otherwise.
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else {
        "CPU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_backend_matches_compiled_feature() {
        let expected = if cfg!(feature = "cuda") {
            "CUDA"
        } else if cfg!(feature = "vulkan") {
            "Vulkan"
        } else {
            "CPU"
        };
        assert_eq!(gpu_backend(), expected);
    }

    #[test]
    fn max_upload_is_25_mib() {
        assert_eq!(MAX_UPLOAD_BYTES, 26_214_400);
    }

    #[test]
    fn backend_order_starts_with_remote() {
        assert_eq!(BACKEND_ORDER.first(), Some(&"remote"));
        assert_eq!(BACKEND_ORDER.len(), 3);
    }
}
