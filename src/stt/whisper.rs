//! Whisper model for the in-process backend, via whisper-rs.
//!
//! # Feature Gate
//!
//! Real inference requires the `whisper` feature (and cmake at build time):
//!
//! ```bash
//! cargo build --features whisper
//! ```
//!
//! Without it, [`WhisperModelLoader::load`] reports the backend as unavailable
//! so the orchestrator moves on.

use crate::defaults;
use crate::error::{ParlanceError, Result};
use crate::stt::in_process::{InferenceModel, ModelLoader};
use async_trait::async_trait;

#[cfg(feature = "whisper")]
use std::path::Path;
#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper loader.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperConfig {
    /// Catalog model name or path to a ggml model file
    pub model: String,
    /// Language code (e.g., "en", "es"), or "auto" to detect
    pub language: String,
    /// Number of threads for inference (None = whisper.cpp default)
    pub threads: Option<usize>,
    /// Download catalog models that are not installed yet
    pub auto_download: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            auto_download: false,
        }
    }
}

/// Loads a [`WhisperModel`] on first use.
#[derive(Debug, Clone)]
pub struct WhisperModelLoader {
    config: WhisperConfig,
}

impl WhisperModelLoader {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[async_trait]
impl ModelLoader for WhisperModelLoader {
    fn describe(&self) -> String {
        format!("whisper:{}", self.config.model)
    }

    async fn load(&self) -> Result<Box<dyn InferenceModel>> {
        load_whisper(&self.config).await
    }
}

#[cfg(feature = "whisper")]
async fn load_whisper(config: &WhisperConfig) -> Result<Box<dyn InferenceModel>> {
    let path = crate::models::download::ensure_model(&config.model, config.auto_download).await?;
    let config = config.clone();
    let model = tokio::task::spawn_blocking(move || WhisperModel::load(&path, &config))
        .await
        .map_err(|e| ParlanceError::Other(format!("model load task failed: {e}")))??;
    Ok(Box::new(model))
}

#[cfg(not(feature = "whisper"))]
async fn load_whisper(_config: &WhisperConfig) -> Result<Box<dyn InferenceModel>> {
    Err(ParlanceError::unavailable(
        "in-process",
        concat!(
            "Whisper feature not enabled. This binary was built without in-process speech recognition.\n",
            "To fix: cargo build --release --features whisper (requires cmake)"
        ),
    ))
}

/// A loaded whisper.cpp context.
#[cfg(feature = "whisper")]
pub struct WhisperModel {
    context: WhisperContext,
    name: String,
    language: String,
    threads: Option<usize>,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperModel")
            .field("name", &self.name)
            .field("language", &self.language)
            .field("threads", &self.threads)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperModel {
    /// Load a ggml model file. Blocking; can take seconds for large models.
    pub fn load(path: &Path, config: &WhisperConfig) -> Result<Self> {
        // Install logging hooks to suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !path.is_file() {
            return Err(ParlanceError::unavailable(
                "in-process",
                format!("model file not found: {}", path.display()),
            ));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let path_str = path.to_str().ok_or_else(|| {
            ParlanceError::unavailable("in-process", "invalid UTF-8 in model path")
        })?;
        let context = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| {
                ParlanceError::unavailable("in-process", format!("failed to load Whisper model: {e}"))
            })?;

        Ok(Self {
            context,
            name,
            language: config.language.clone(),
            threads: config.threads,
        })
    }
}

#[cfg(feature = "whisper")]
impl InferenceModel for WhisperModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&mut self, samples: &[f32]) -> Result<serde_json::Value> {
        let fail = |message: String| ParlanceError::bad_output("in-process", message);

        let mut state = self
            .context
            .create_state()
            .map_err(|e| fail(format!("failed to create Whisper state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }
        // Disable printing to stdout/stderr
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| fail(format!("Whisper inference failed: {e}")))?;

        // Timestamps are in centiseconds.
        let mut text = String::new();
        let mut segments = Vec::new();
        for segment in state.as_iter() {
            let segment_text = segment.to_string();
            text.push_str(&segment_text);
            segments.push(serde_json::json!({
                "text": segment_text.trim(),
                "start": segment.start_timestamp() as f64 / 100.0,
                "end": segment.end_timestamp() as f64 / 100.0,
            }));
        }

        Ok(serde_json::json!({
            "text": text.trim(),
            "segments": segments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_config_default() {
        let config = WhisperConfig::default();
        assert_eq!(config.model, "base.en");
        assert_eq!(config.language, "en");
        assert_eq!(config.threads, None);
        assert!(!config.auto_download);
    }

    #[test]
    fn test_loader_describes_model() {
        let loader = WhisperModelLoader::new(WhisperConfig {
            model: "tiny.en".to_string(),
            ..WhisperConfig::default()
        });
        assert_eq!(loader.describe(), "whisper:tiny.en");
    }

    #[tokio::test]
    async fn test_load_missing_model_fails() {
        let loader = WhisperModelLoader::new(WhisperConfig {
            model: "/nonexistent/ggml-model.bin".to_string(),
            ..WhisperConfig::default()
        });
        let result = loader.load().await;
        assert!(result.is_err());
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(crate::error::ErrorKind::Unavailable)
        );
    }

    #[cfg(not(feature = "whisper"))]
    #[tokio::test]
    async fn test_stub_reports_feature_missing() {
        let loader = WhisperModelLoader::new(WhisperConfig::default());
        match loader.load().await {
            Err(ParlanceError::Unavailable { message, .. }) => {
                assert!(message.contains("Whisper feature not enabled"));
            }
            Err(other) => panic!("Expected Unavailable, got {other:?}"),
            Ok(_) => panic!("Stub loader must not succeed"),
        }
    }

    #[cfg(feature = "whisper")]
    #[test]
    fn test_invalid_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggml-base.bin");
        std::fs::write(&path, b"fake model data").unwrap();

        let result = WhisperModel::load(&path, &WhisperConfig::default());
        assert!(result.is_err(), "Should fail with invalid model file");
    }
}
