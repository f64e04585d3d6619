//! Per-backend attempt records.

use crate::error::{ErrorKind, ParlanceError};
use crate::stt::backend::BackendKind;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// How one backend attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure(ErrorKind),
    Timeout,
}

impl AttemptOutcome {
    pub fn from_error(err: &ParlanceError) -> Self {
        match err.kind() {
            ErrorKind::Timeout => AttemptOutcome::Timeout,
            kind => AttemptOutcome::Failure(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Failure(kind) => write!(f, "{kind}"),
            AttemptOutcome::Timeout => f.write_str("timeout"),
        }
    }
}

/// What happened when the orchestrator tried one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendAttempt {
    pub backend: String,
    pub kind: BackendKind,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl BackendAttempt {
    pub fn new(
        backend: &str,
        kind: BackendKind,
        outcome: AttemptOutcome,
        detail: Option<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            backend: backend.to_string(),
            kind,
            outcome,
            detail,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl fmt::Display for BackendAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.outcome)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_from_error() {
        let timeout = ParlanceError::timeout("remote", 30_000);
        assert_eq!(AttemptOutcome::from_error(&timeout), AttemptOutcome::Timeout);

        let down = ParlanceError::unavailable("remote", "refused");
        assert_eq!(
            AttemptOutcome::from_error(&down),
            AttemptOutcome::Failure(ErrorKind::Unavailable)
        );
    }

    #[test]
    fn display_includes_detail() {
        let attempt = BackendAttempt::new(
            "subprocess",
            BackendKind::LocalSubprocess,
            AttemptOutcome::Failure(ErrorKind::BadOutput),
            Some("empty transcript".to_string()),
            Duration::from_millis(1500),
        );
        assert_eq!(
            attempt.to_string(),
            "subprocess: bad_output (empty transcript)"
        );
        assert_eq!(attempt.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn serializes_outcome_as_tagged() {
        let attempt = BackendAttempt::new(
            "remote",
            BackendKind::RemoteApi,
            AttemptOutcome::Failure(ErrorKind::Unavailable),
            None,
            Duration::from_millis(12),
        );
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["backend"], "remote");
        assert_eq!(json["kind"], "remote_api");
        assert_eq!(json["outcome"]["status"], "failure");
        assert_eq!(json["outcome"]["kind"], "unavailable");
        assert_eq!(json["elapsed_ms"], 12);
        assert!(json.get("detail").is_none());

        let success = serde_json::to_value(AttemptOutcome::Success).unwrap();
        assert_eq!(success["status"], "success");
    }
}
