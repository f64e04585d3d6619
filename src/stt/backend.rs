//! The transcription backend seam and a scriptable mock.

use crate::audio::asset::AudioAsset;
use crate::audio::normalize::PcmBuffer;
use crate::error::{ErrorKind, ParlanceError, Result};
use crate::stt::transcript::Transcript;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which family a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    RemoteApi,
    LocalSubprocess,
    LocalInProcess,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::RemoteApi => "remote_api",
            BackendKind::LocalSubprocess => "local_subprocess",
            BackendKind::LocalInProcess => "local_in_process",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a backend wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// The uploaded container bytes, untouched.
    RawBytes,
    /// Normalized mono PCM.
    Pcm,
}

/// Audio handed to a backend. Cheap to clone.
#[derive(Debug, Clone)]
pub enum BackendInput {
    Raw(AudioAsset),
    Pcm(Arc<PcmBuffer>),
}

impl BackendInput {
    pub fn format(&self) -> InputFormat {
        match self {
            BackendInput::Raw(_) => InputFormat::RawBytes,
            BackendInput::Pcm(_) => InputFormat::Pcm,
        }
    }
}

/// Speech-to-text engine.
///
/// Implementations report failures as `Unavailable`, `Timeout` or
/// `BadOutput`; the orchestrator decides whether to try the next one.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Stable identifier used in logs and attempt records.
    fn id(&self) -> &str;

    fn kind(&self) -> BackendKind;

    fn input_format(&self) -> InputFormat;

    /// Wall-clock budget for one call.
    fn timeout(&self) -> Duration;

    async fn transcribe(&self, input: BackendInput) -> Result<Transcript>;
}

#[async_trait]
impl<T: TranscriptionBackend + ?Sized> TranscriptionBackend for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn input_format(&self) -> InputFormat {
        (**self).input_format()
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    async fn transcribe(&self, input: BackendInput) -> Result<Transcript> {
        (**self).transcribe(input).await
    }
}

/// One scripted response for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Text(String),
    Transcript(Transcript),
    Fail(ErrorKind, String),
    /// Sleep before answering with an empty transcript.
    Hang(Duration),
    Panic,
}

/// Mock backend for testing.
///
/// Replays scripted outcomes in order; once the script is exhausted the
/// last outcome repeats. Counts every call.
#[derive(Debug)]
pub struct MockBackend {
    id: String,
    kind: BackendKind,
    format: InputFormat,
    timeout: Duration,
    script: Mutex<VecDeque<MockOutcome>>,
    last: Mutex<Option<MockOutcome>>,
    calls: AtomicUsize,
}

impl MockBackend {
    /// Create a mock that answers "mock transcription".
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: BackendKind::LocalInProcess,
            format: InputFormat::RawBytes,
            timeout: Duration::from_secs(5),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Some(MockOutcome::Text("mock transcription".to_string()))),
            calls: AtomicUsize::new(0),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(self, text: &str) -> Self {
        self.then(MockOutcome::Text(text.to_string()))
    }

    /// Configure the mock to fail with the given classification
    pub fn with_failure(self, kind: ErrorKind, message: &str) -> Self {
        self.then(MockOutcome::Fail(kind, message.to_string()))
    }

    /// Append an outcome to the script.
    pub fn then(self, outcome: MockOutcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_input_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of times `transcribe` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Option<MockOutcome> {
        let next = self.script.lock().ok()?.pop_front();
        let mut last = self.last.lock().ok()?;
        if let Some(outcome) = next {
            *last = Some(outcome);
        }
        last.clone()
    }

    fn error(&self, kind: ErrorKind, message: String) -> ParlanceError {
        match kind {
            ErrorKind::Timeout => ParlanceError::timeout(&self.id, 0),
            ErrorKind::BadOutput => ParlanceError::bad_output(&self.id, message),
            ErrorKind::Decode => ParlanceError::Decode { message },
            ErrorKind::Unavailable => ParlanceError::unavailable(&self.id, message),
            _ => ParlanceError::Other(message),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn input_format(&self) -> InputFormat {
        self.format
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn transcribe(&self, _input: BackendInput) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome() {
            Some(MockOutcome::Text(text)) => Ok(Transcript::from_text(text)),
            Some(MockOutcome::Transcript(transcript)) => Ok(transcript),
            Some(MockOutcome::Fail(kind, message)) => Err(self.error(kind, message)),
            Some(MockOutcome::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Transcript::default())
            }
            Some(MockOutcome::Panic) => panic!("mock backend {} panicked", self.id),
            None => Err(ParlanceError::Other("mock script lock poisoned".to_string())),
        }
    }
}
