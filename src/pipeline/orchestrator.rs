//! Priority-ordered fallback across transcription backends.
//!
//! Backends are tried strictly in order. The first non-blank transcript
//! wins; every failure, timeout or blank result is recorded and the next
//! backend is tried. Undecodable input stops the chain immediately, since
//! no backend can do better with the same bytes.

use crate::audio::asset::{AudioAsset, check_size};
use crate::audio::normalize::{PcmBuffer, SignalNormalizer};
use crate::defaults::{ATTEMPT_GRACE, MAX_UPLOAD_BYTES};
use crate::error::{ErrorKind, ParlanceError, Result};
use crate::pipeline::attempt::{AttemptOutcome, BackendAttempt};
use crate::stt::backend::{BackendInput, InputFormat, TranscriptionBackend};
use crate::stt::transcript::Transcript;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A successful transcription plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionReport {
    pub transcript: Transcript,
    /// Id of the backend that produced the transcript.
    pub backend: String,
    /// Every attempt in order, ending with the successful one.
    pub attempts: Vec<BackendAttempt>,
}

pub struct FallbackOrchestrator {
    backends: Vec<Arc<dyn TranscriptionBackend>>,
    normalizer: SignalNormalizer,
    max_bytes: usize,
    grace: Duration,
}

impl FallbackOrchestrator {
    pub fn new(backends: Vec<Arc<dyn TranscriptionBackend>>, normalizer: SignalNormalizer) -> Self {
        Self {
            backends,
            normalizer,
            max_bytes: MAX_UPLOAD_BYTES,
            grace: ATTEMPT_GRACE,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Extra time allowed past each backend's own timeout.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id()).collect()
    }

    /// Transcribe `asset`, returning only the transcript.
    pub async fn transcribe_text(&self, asset: AudioAsset) -> Result<Transcript> {
        self.transcribe(asset).await.map(|report| report.transcript)
    }

    /// Run the fallback chain.
    ///
    /// # Errors
    /// - `PayloadTooLarge` before any backend runs
    /// - `Decode` as soon as a PCM backend needs audio that cannot be decoded
    /// - `AllBackendsFailed` with the attempt log when nothing succeeded
    pub async fn transcribe(&self, asset: AudioAsset) -> Result<TranscriptionReport> {
        check_size(asset.len(), self.max_bytes)?;

        let request_started = Instant::now();
        let mut pcm: Option<Arc<PcmBuffer>> = None;
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let input = match backend.input_format() {
                InputFormat::RawBytes => BackendInput::Raw(asset.clone()),
                InputFormat::Pcm => BackendInput::Pcm(self.pcm_for(&asset, &mut pcm).await?),
            };

            let started = Instant::now();
            let result = self.attempt(backend.as_ref(), input).await;
            let elapsed = started.elapsed();

            match result {
                Ok(transcript) if !transcript.is_blank() => {
                    attempts.push(BackendAttempt::new(
                        backend.id(),
                        backend.kind(),
                        AttemptOutcome::Success,
                        None,
                        elapsed,
                    ));
                    tracing::info!(
                        backend = backend.id(),
                        outcome = "success",
                        elapsed_ms = elapsed.as_millis() as u64,
                        attempts = attempts.len(),
                        total_ms = request_started.elapsed().as_millis() as u64,
                        "Transcription succeeded"
                    );
                    return Ok(TranscriptionReport {
                        transcript,
                        backend: backend.id().to_string(),
                        attempts,
                    });
                }
                Ok(_) => {
                    let attempt = BackendAttempt::new(
                        backend.id(),
                        backend.kind(),
                        AttemptOutcome::Failure(ErrorKind::BadOutput),
                        Some("empty transcript".to_string()),
                        elapsed,
                    );
                    log_failure(&attempt);
                    attempts.push(attempt);
                }
                Err(e) => {
                    let attempt = BackendAttempt::new(
                        backend.id(),
                        backend.kind(),
                        AttemptOutcome::from_error(&e),
                        Some(e.to_string()),
                        elapsed,
                    );
                    log_failure(&attempt);
                    attempts.push(attempt);
                }
            }
        }

        tracing::warn!(
            attempts = attempts.len(),
            total_ms = request_started.elapsed().as_millis() as u64,
            "All transcription backends failed"
        );
        Err(ParlanceError::AllBackendsFailed { attempts })
    }

    /// Normalize at most once per request.
    async fn pcm_for(
        &self,
        asset: &AudioAsset,
        cache: &mut Option<Arc<PcmBuffer>>,
    ) -> Result<Arc<PcmBuffer>> {
        if let Some(pcm) = cache {
            return Ok(Arc::clone(pcm));
        }

        let normalizer = self.normalizer;
        let asset = asset.clone();
        let pcm = tokio::task::spawn_blocking(move || normalizer.normalize(&asset))
            .await
            .map_err(|e| ParlanceError::Other(format!("normalization task failed: {e}")))??;

        tracing::debug!(
            samples = pcm.len(),
            duration_secs = pcm.duration_secs(),
            silent = pcm.is_silent(),
            "Audio normalized"
        );
        let pcm = Arc::new(pcm);
        *cache = Some(Arc::clone(&pcm));
        Ok(pcm)
    }

    /// One bounded, panic-isolated backend call.
    async fn attempt(
        &self,
        backend: &dyn TranscriptionBackend,
        input: BackendInput,
    ) -> Result<Transcript> {
        let budget = backend.timeout() + self.grace;
        let call = AssertUnwindSafe(backend.transcribe(input)).catch_unwind();

        match tokio::time::timeout(budget, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown panic");
                tracing::error!(backend = backend.id(), panic = message, "Backend panicked");
                Err(ParlanceError::bad_output(
                    backend.id(),
                    format!("backend panicked: {message}"),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    backend = backend.id(),
                    budget_ms = budget.as_millis() as u64,
                    "Backend call abandoned at deadline"
                );
                Err(ParlanceError::timeout(backend.id(), budget.as_millis() as u64))
            }
        }
    }
}

fn log_failure(attempt: &BackendAttempt) {
    tracing::warn!(
        backend = %attempt.backend,
        outcome = %attempt.outcome,
        elapsed_ms = attempt.elapsed_ms,
        detail = attempt.detail.as_deref().unwrap_or(""),
        "Transcription backend failed, trying next"
    );
}
