//! Speech model loaded into this process on first use.
//!
//! The model is loaded at most once per backend: concurrent first callers
//! wait on the same load, and a failed load leaves the slot empty so a later
//! request retries. Inference runs on the blocking pool, one call at a time.

use crate::defaults;
use crate::error::{ParlanceError, Result};
use crate::stt::assembler::TranscriptAssembler;
use crate::stt::backend::{BackendInput, BackendKind, InputFormat, TranscriptionBackend};
use crate::stt::transcript::Transcript;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// A loaded model that turns 16 kHz mono samples into raw JSON output.
pub trait InferenceModel: Send {
    fn name(&self) -> &str;

    /// Blocking inference. Called from the blocking pool.
    fn infer(&mut self, samples: &[f32]) -> Result<Value>;
}

/// Produces an [`InferenceModel`]. Called once per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<Box<dyn InferenceModel>>;
}

type SharedModel = Arc<Mutex<Box<dyn InferenceModel>>>;

/// Flags an inference whose caller stopped waiting, e.g. on an orchestrator
/// deadline. The blocking task cannot be cancelled and keeps the model locked.
struct AbandonGuard {
    backend: String,
    abandoned: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.store(true, Ordering::SeqCst);
            tracing::warn!(
                backend = %self.backend,
                "Caller abandoned in-process inference; model stays locked until it finishes"
            );
        }
    }
}

pub struct InProcessModelBackend {
    id: String,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<SharedModel>,
    timeout: Duration,
    assembler: TranscriptAssembler,
}

impl InProcessModelBackend {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            id: "in-process".to_string(),
            loader,
            model: OnceCell::new(),
            timeout: defaults::IN_PROCESS_TIMEOUT,
            assembler: TranscriptAssembler::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_assembler(mut self, assembler: TranscriptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn ensure_loaded(&self) -> Result<SharedModel> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let started = Instant::now();
                tracing::info!(backend = %self.id, model = %self.loader.describe(), "Loading model");
                let model = self.loader.load().await.map_err(|e| match e {
                    ParlanceError::Unavailable { .. } => e,
                    other => ParlanceError::unavailable(&self.id, other.to_string()),
                })?;
                tracing::info!(
                    backend = %self.id,
                    model = model.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                Ok::<_, ParlanceError>(Arc::new(Mutex::new(model)))
            })
            .await?;
        Ok(Arc::clone(model))
    }
}

#[async_trait]
impl TranscriptionBackend for InProcessModelBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalInProcess
    }

    fn input_format(&self) -> InputFormat {
        InputFormat::Pcm
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn transcribe(&self, input: BackendInput) -> Result<Transcript> {
        let pcm = match input {
            BackendInput::Pcm(pcm) => pcm,
            BackendInput::Raw(_) => {
                return Err(ParlanceError::unavailable(&self.id, "requires PCM input"));
            }
        };

        let model = self.ensure_loaded().await?;
        let id = self.id.clone();

        let started = Instant::now();
        let mut abandon = AbandonGuard {
            backend: self.id.clone(),
            abandoned: Arc::new(AtomicBool::new(false)),
            armed: true,
        };
        let abandoned = Arc::clone(&abandon.abandoned);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = model.lock().unwrap_or_else(|poisoned| {
                tracing::warn!(backend = %id, "Model lock poisoned by an earlier panic, continuing");
                poisoned.into_inner()
            });
            let waited = started.elapsed();
            if waited >= Duration::from_millis(100) {
                tracing::debug!(
                    backend = %id,
                    waited_ms = waited.as_millis() as u64,
                    "Waited for model lock"
                );
            }
            let result = guard.infer(pcm.samples());
            if abandoned.load(Ordering::SeqCst) {
                tracing::info!(
                    backend = %id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Abandoned inference finished, model released"
                );
            }
            result
        });
        let joined = task.await;
        abandon.armed = false;

        let raw = joined
        .map_err(|e| {
            let reason = if e.is_panic() {
                "inference panicked"
            } else {
                "inference task cancelled"
            };
            ParlanceError::bad_output(&self.id, reason)
        })?
        .map_err(|e| match e {
            ParlanceError::BadOutput { .. } | ParlanceError::Timeout { .. } => e,
            other => ParlanceError::bad_output(&self.id, other.to_string()),
        })?;

        let transcript = self
            .assembler
            .assemble(&raw, BackendKind::LocalInProcess)
            .map_err(|e| ParlanceError::bad_output(&self.id, e.to_string()))?;

        tracing::info!(
            backend = %self.id,
            chars = transcript.text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "In-process transcription completed"
        );
        Ok(transcript)
    }
}
