//! Canonical transcript shape shared by every backend.

use crate::error::{ParlanceError, Result};
use serde::{Deserialize, Serialize};

/// One timed span of recognized speech. Times are seconds from the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Serialized as `{"text": ..., "chunks": [{"text", "start", "end"}]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(rename = "chunks", default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Text-only transcript with no timing information.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: Vec::new(),
        }
    }

    /// Transcript whose text is the segment texts joined by single spaces.
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, segments }
    }

    /// True when the text is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ParlanceError::Other(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ParlanceError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_segments_as_chunks() {
        let transcript = Transcript::from_segments(vec![
            TranscriptSegment::new("hello", 0.0, 0.5),
            TranscriptSegment::new("world", 0.5, 1.0),
        ]);
        let json: serde_json::Value = serde_json::from_str(&transcript.to_json().unwrap()).unwrap();

        assert_eq!(json["text"], "hello world");
        assert_eq!(json["chunks"][1]["text"], "world");
        assert_eq!(json["chunks"][1]["start"], 0.5);
        assert!(json.get("segments").is_none());
    }

    #[test]
    fn from_text_has_no_segments() {
        let transcript = Transcript::from_text("just text");
        assert!(transcript.segments.is_empty());
        assert_eq!(
            transcript.to_json().unwrap(),
            r#"{"text":"just text","chunks":[]}"#
        );
    }

    #[test]
    fn blank_detection_trims_whitespace() {
        assert!(Transcript::from_text("  \n\t").is_blank());
        assert!(Transcript::default().is_blank());
        assert!(!Transcript::from_text(" a ").is_blank());
    }

    #[test]
    fn deserializes_without_chunks() {
        let transcript: Transcript = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(transcript, Transcript::from_text("hi"));
    }
}
