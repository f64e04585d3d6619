//! OpenAI-compatible `/audio/transcriptions` backend.

use crate::audio::wav::encode_pcm_wav;
use crate::defaults;
use crate::error::{ParlanceError, Result};
use crate::stt::assembler::TranscriptAssembler;
use crate::stt::backend::{BackendInput, BackendKind, InputFormat, TranscriptionBackend};
use crate::stt::transcript::Transcript;
use async_trait::async_trait;
use reqwest::multipart;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteApiConfig {
    /// Full URL of the transcription endpoint.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// ISO-639-1 hint; `None` lets the service detect the language.
    pub language: Option<String>,
    pub timeout: Duration,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::REMOTE_ENDPOINT.to_string(),
            api_key: None,
            model: defaults::REMOTE_MODEL.to_string(),
            language: None,
            timeout: defaults::REMOTE_TIMEOUT,
        }
    }
}

pub struct RemoteApiBackend {
    id: String,
    config: RemoteApiConfig,
    client: reqwest::Client,
    assembler: TranscriptAssembler,
}

impl RemoteApiBackend {
    pub fn new(config: RemoteApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ParlanceError::unavailable("remote", format!("HTTP client: {e}")))?;

        Ok(Self {
            id: "remote".to_string(),
            config,
            client,
            assembler: TranscriptAssembler::default(),
        })
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_assembler(mut self, assembler: TranscriptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &RemoteApiConfig {
        &self.config
    }

    fn api_key(&self) -> Result<Option<&str>> {
        match self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Ok(Some(key)),
            // Hosted OpenAI always needs a key; self-hosted servers often don't.
            None if self.config.endpoint.contains("api.openai.com") => Err(
                ParlanceError::unavailable(&self.id, "no API key configured"),
            ),
            None => Ok(None),
        }
    }

    fn file_part(&self, input: BackendInput) -> Result<multipart::Part> {
        let (bytes, file_name, mime) = match input {
            BackendInput::Raw(asset) => (
                asset.bytes().to_vec(),
                asset.file_name().to_string(),
                asset.mime().as_str(),
            ),
            BackendInput::Pcm(pcm) => (encode_pcm_wav(&pcm)?, "audio.wav".to_string(), "audio/wav"),
        };

        multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| ParlanceError::unavailable(&self.id, format!("mime: {e}")))
    }

    fn map_send_error(&self, e: reqwest::Error, started: Instant) -> ParlanceError {
        if e.is_timeout() {
            ParlanceError::timeout(&self.id, started.elapsed().as_millis() as u64)
        } else {
            ParlanceError::unavailable(&self.id, format!("request: {e}"))
        }
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteApiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::RemoteApi
    }

    fn input_format(&self) -> InputFormat {
        InputFormat::RawBytes
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn transcribe(&self, input: BackendInput) -> Result<Transcript> {
        if self.config.endpoint.trim().is_empty() {
            return Err(ParlanceError::unavailable(&self.id, "no endpoint configured"));
        }
        let api_key = self.api_key()?;

        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .part("file", self.file_part(input)?);
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        tracing::debug!(
            endpoint = %self.config.endpoint,
            model = %self.config.model,
            "Sending audio to remote transcription API"
        );

        let started = Instant::now();
        let mut request = self.client.post(&self.config.endpoint).multipart(form);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(e, started))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e, started))?;

        if !status.is_success() {
            return Err(ParlanceError::bad_output(
                &self.id,
                format!("status {}: {}", status, body.trim()),
            ));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ParlanceError::bad_output(&self.id, format!("invalid JSON: {e}")))?;

        let transcript = self
            .assembler
            .assemble(&raw, BackendKind::RemoteApi)
            .map_err(|e| match e {
                ParlanceError::BadOutput { message, .. } => {
                    ParlanceError::bad_output(&self.id, message)
                }
                other => other,
            })?;

        tracing::info!(
            backend = %self.id,
            chars = transcript.text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Remote transcription completed"
        );

        Ok(transcript)
    }
}
