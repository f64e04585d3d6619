use crate::defaults;
use crate::error::{ParlanceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
    pub remote: RemoteConfig,
    pub subprocess: SubprocessConfig,
    pub in_process: InProcessConfig,
}

/// Input limits and normalization targets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub max_upload_bytes: usize,
    /// Used to synthesize segment end times a backend left out
    pub seconds_per_word: f64,
}

/// Backend chain configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Backend ids in priority order
    pub backends: Vec<String>,
    /// Extra time allowed past a backend's own timeout
    pub grace_ms: u64,
}

/// OpenAI-compatible transcription API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Language hint; "auto" or unset lets the service detect it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timeout_secs: u64,
}

/// External inference command (whisper.cpp CLI by default)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubprocessConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Catalog model name or path to a model file
    pub model: String,
    pub language: String,
    pub timeout_secs: u64,
}

/// Model loaded into this process (requires the `whisper` feature)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InProcessConfig {
    /// Catalog model name or path to a model file
    pub model: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    pub auto_download: bool,
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            seconds_per_word: defaults::SECONDS_PER_WORD,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backends: defaults::BACKEND_ORDER.iter().map(|s| s.to_string()).collect(),
            grace_ms: defaults::ATTEMPT_GRACE.as_millis() as u64,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::REMOTE_ENDPOINT.to_string(),
            api_key: None,
            model: defaults::REMOTE_MODEL.to_string(),
            language: None,
            timeout_secs: defaults::REMOTE_TIMEOUT.as_secs(),
        }
    }
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            command: defaults::SUBPROCESS_COMMAND.to_string(),
            args: crate::stt::subprocess::DEFAULT_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            timeout_secs: defaults::SUBPROCESS_TIMEOUT.as_secs(),
        }
    }
}

impl Default for InProcessConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
            auto_download: false,
            timeout_secs: defaults::IN_PROCESS_TIMEOUT.as_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SubprocessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl InProcessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PARLANCE_REMOTE_URL → remote.endpoint
    /// - PARLANCE_API_KEY → remote.api_key (OPENAI_API_KEY if no key is configured)
    /// - PARLANCE_MODEL → subprocess.model and in_process.model
    /// - PARLANCE_LANGUAGE → language of every backend
    /// - PARLANCE_BACKENDS → pipeline.backends (comma-separated)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("PARLANCE_REMOTE_URL")
            && !url.is_empty()
        {
            self.remote.endpoint = url;
        }

        if let Ok(key) = std::env::var("PARLANCE_API_KEY")
            && !key.is_empty()
        {
            self.remote.api_key = Some(key);
        } else if self.remote.api_key.is_none()
            && let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.is_empty()
        {
            self.remote.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("PARLANCE_MODEL")
            && !model.is_empty()
        {
            self.subprocess.model = model.clone();
            self.in_process.model = model;
        }

        if let Ok(language) = std::env::var("PARLANCE_LANGUAGE")
            && !language.is_empty()
        {
            self.remote.language = Some(language.clone());
            self.subprocess.language = language.clone();
            self.in_process.language = language;
        }

        if let Ok(backends) = std::env::var("PARLANCE_BACKENDS")
            && !backends.is_empty()
        {
            self.pipeline.backends = backends
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    /// Check values that would otherwise fail deep inside a request.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| ParlanceError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.channels != 1 {
            return Err(invalid("audio.channels", "only mono (1) is supported"));
        }
        if self.audio.max_upload_bytes == 0 {
            return Err(invalid("audio.max_upload_bytes", "must be positive"));
        }
        if !(self.audio.seconds_per_word > 0.0 && self.audio.seconds_per_word.is_finite()) {
            return Err(invalid("audio.seconds_per_word", "must be a positive number"));
        }

        for (key, secs) in [
            ("remote.timeout_secs", self.remote.timeout_secs),
            ("subprocess.timeout_secs", self.subprocess.timeout_secs),
            ("in_process.timeout_secs", self.in_process.timeout_secs),
        ] {
            if secs == 0 {
                return Err(invalid(key, "must be positive"));
            }
        }

        for (i, id) in self.pipeline.backends.iter().enumerate() {
            if !defaults::BACKEND_ORDER.contains(&id.as_str()) {
                return Err(invalid(
                    "pipeline.backends",
                    &format!(
                        "unknown backend '{id}' (expected one of: {})",
                        defaults::BACKEND_ORDER.join(", ")
                    ),
                ));
            }
            if self.pipeline.backends[..i].contains(id) {
                return Err(invalid(
                    "pipeline.backends",
                    &format!("backend '{id}' listed twice"),
                ));
            }
        }

        if self.subprocess.command.trim().is_empty() {
            return Err(invalid("subprocess.command", "must not be empty"));
        }

        Ok(())
    }

    /// Copy safe to print: secrets replaced.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.remote.api_key.is_some() {
            config.remote.api_key = Some("***".to_string());
        }
        config
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ParlanceError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/parlance/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("parlance")
            .join("config.toml")
    }
}
