//! Turns backend-specific output into a canonical [`Transcript`].
//!
//! Backends disagree on field names (`text` vs `transcript`, `segments` vs
//! `chunks`, `start`/`end` vs `timestamp: [s, e]` vs whisper.cpp's
//! millisecond `offsets`). The assembler accepts all of them, synthesizes
//! missing end times from word count, and clips segments so timing never
//! runs backwards.

use crate::defaults::SECONDS_PER_WORD;
use crate::error::{ParlanceError, Result};
use crate::stt::backend::BackendKind;
use crate::stt::transcript::{Transcript, TranscriptSegment};
use serde_json::Value;

const TEXT_FIELDS: [&str; 3] = ["text", "transcript", "transcription"];
const SEGMENT_FIELDS: [&str; 3] = ["segments", "chunks", "transcription"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscriptAssembler {
    seconds_per_word: f64,
}

impl Default for TranscriptAssembler {
    fn default() -> Self {
        Self::new(SECONDS_PER_WORD)
    }
}

impl TranscriptAssembler {
    pub fn new(seconds_per_word: f64) -> Self {
        Self { seconds_per_word }
    }

    /// Canonicalize raw backend output.
    ///
    /// # Errors
    /// `BadOutput` if the value carries neither text nor segments.
    pub fn assemble(&self, raw: &Value, kind: BackendKind) -> Result<Transcript> {
        let (text, segments) = match raw {
            Value::String(text) => (Some(text.clone()), None),
            Value::Array(items) => (None, Some(items.as_slice())),
            Value::Object(map) => {
                let text = TEXT_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(Value::as_str))
                    .map(str::to_string);
                let segments = SEGMENT_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(Value::as_array))
                    .map(Vec::as_slice);
                (text, segments)
            }
            _ => (None, None),
        };

        let segments = segments.map(|items| self.collect_segments(items));

        let text = text.map(|t| t.trim().to_string());
        let transcript = match (text, segments) {
            (Some(text), Some(segments)) if text.is_empty() && !segments.is_empty() => {
                Transcript::from_segments(segments)
            }
            (Some(text), segments) => Transcript {
                text,
                segments: segments.unwrap_or_default(),
            },
            (None, Some(segments)) => Transcript::from_segments(segments),
            (None, None) => {
                return Err(ParlanceError::bad_output(
                    kind.as_str(),
                    format!("no text or segments in output: {}", preview(raw)),
                ));
            }
        };

        tracing::trace!(
            backend = %kind,
            chars = transcript.text.len(),
            segments = transcript.segments.len(),
            "Assembled transcript"
        );
        Ok(transcript)
    }

    /// Canonicalize plain text output.
    pub fn assemble_text(&self, text: &str) -> Transcript {
        Transcript::from_text(text.trim())
    }

    fn collect_segments(&self, items: &[Value]) -> Vec<TranscriptSegment> {
        let mut segments: Vec<TranscriptSegment> =
            items.iter().filter_map(|item| self.segment(item)).collect();

        // Vec::sort_by is stable, so equal starts keep emission order.
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut prev_end = 0.0_f64;
        for segment in &mut segments {
            segment.start = segment.start.max(prev_end);
            segment.end = segment.end.max(segment.start);
            prev_end = segment.end;
        }
        segments
    }

    fn segment(&self, item: &Value) -> Option<TranscriptSegment> {
        let text = item.get("text").and_then(Value::as_str)?.trim();
        if text.is_empty() {
            return None;
        }

        let start = segment_time(item, "start", 0, "from")
            .unwrap_or(0.0)
            .max(0.0);
        let end = segment_time(item, "end", 1, "to").unwrap_or_else(|| {
            let words = text.split_whitespace().count() as f64;
            start + words * self.seconds_per_word
        });

        Some(TranscriptSegment {
            text: text.to_string(),
            start,
            end,
        })
    }
}

/// `field` in seconds, else `timestamp[index]` in seconds, else `offsets.<offset>` in ms.
fn segment_time(item: &Value, field: &str, index: usize, offset: &str) -> Option<f64> {
    item.get(field)
        .and_then(Value::as_f64)
        .or_else(|| {
            item.get("timestamp")
                .and_then(Value::as_array)
                .and_then(|pair| pair.get(index))
                .and_then(Value::as_f64)
        })
        .or_else(|| {
            item.get("offsets")
                .and_then(|o| o.get(offset))
                .and_then(Value::as_f64)
                .map(|ms| ms / 1000.0)
        })
        .filter(|t| t.is_finite())
}

fn preview(raw: &Value) -> String {
    let mut s = raw.to_string();
    if s.len() > 200 {
        let mut cut = 200;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assemble(raw: Value) -> Transcript {
        TranscriptAssembler::default()
            .assemble(&raw, BackendKind::RemoteApi)
            .unwrap()
    }

    #[test]
    fn flat_text_has_no_segments() {
        let t = assemble(json!({"text": "  hello there "}));
        assert_eq!(t.text, "hello there");
        assert!(t.segments.is_empty());
    }

    #[test]
    fn empty_text_is_rebuilt_from_segments() {
        let t = assemble(json!({
            "text": "  ",
            "segments": [
                {"text": "hello there", "start": 0.0, "end": 1.0},
                {"text": "again", "start": 1.0, "end": 1.5}
            ]
        }));
        assert_eq!(t.text, "hello there again");
        assert_eq!(t.segments.len(), 2);
        assert!(!t.is_blank());
    }

    #[test]
    fn accepts_alternate_text_fields() {
        assert_eq!(assemble(json!({"transcript": "a"})).text, "a");
        assert_eq!(assemble(json!({"transcription": "b"})).text, "b");
        assert_eq!(assemble(json!("bare string")).text, "bare string");
    }

    #[test]
    fn chunks_with_timestamp_pairs() {
        let t = assemble(json!({
            "text": "one two",
            "chunks": [
                {"text": "one", "timestamp": [0.0, 1.5]},
                {"text": "two", "timestamp": [1.5, 3.0]}
            ]
        }));
        assert_eq!(t.segments.len(), 2);
        assert_eq!(t.segments[1].start, 1.5);
        assert_eq!(t.segments[1].end, 3.0);
    }

    #[test]
    fn whisper_cpp_offsets_in_milliseconds() {
        let t = assemble(json!({
            "transcription": [
                {"text": " Hello", "offsets": {"from": 0, "to": 1200}},
                {"text": " world.", "offsets": {"from": 1200, "to": 2500}}
            ]
        }));
        assert_eq!(t.text, "Hello world.");
        assert_eq!(t.segments[0].end, 1.2);
        assert_eq!(t.segments[1].start, 1.2);
        assert_eq!(t.segments[1].end, 2.5);
    }

    #[test]
    fn missing_end_is_synthesized_from_word_count() {
        let t = assemble(json!({
            "segments": [
                {"text": "three short words", "start": 2.0, "end": null},
                {"text": "last", "timestamp": [4.0, null]}
            ]
        }));
        assert_eq!(t.segments[0].end, 3.5);
        assert_eq!(t.segments[1].end, 4.5);
    }

    #[test]
    fn custom_seconds_per_word() {
        let t = TranscriptAssembler::new(1.0)
            .assemble(
                &json!({"segments": [{"text": "a b", "start": 0.0}]}),
                BackendKind::LocalSubprocess,
            )
            .unwrap();
        assert_eq!(t.segments[0].end, 2.0);
    }

    #[test]
    fn overlapping_segments_are_clipped_monotonic() {
        let t = assemble(json!({
            "segments": [
                {"text": "first", "start": 0.0, "end": 2.0},
                {"text": "second", "start": 1.0, "end": 1.5},
                {"text": "third", "start": 1.8, "end": 3.0}
            ]
        }));
        let segs = &t.segments;
        assert_eq!(segs[1].start, 2.0);
        assert_eq!(segs[1].end, 2.0);
        assert_eq!(segs[2].start, 2.0);
        assert_eq!(segs[2].end, 3.0);
        for pair in segs.windows(2) {
            assert!(pair[1].start >= pair[0].end);
        }
        for s in segs {
            assert!(s.start >= 0.0 && s.end >= s.start);
        }
    }

    #[test]
    fn out_of_order_segments_are_sorted() {
        let t = assemble(json!({
            "segments": [
                {"text": "b", "start": 5.0, "end": 6.0},
                {"text": "a", "start": 1.0, "end": 2.0}
            ]
        }));
        assert_eq!(t.segments[0].text, "a");
        assert_eq!(t.text, "a b");
    }

    #[test]
    fn empty_segments_are_dropped() {
        let t = assemble(json!({
            "segments": [
                {"text": "  ", "start": 0.0, "end": 1.0},
                {"text": "kept", "start": 1.0, "end": 2.0},
                {"start": 2.0, "end": 3.0}
            ]
        }));
        assert_eq!(t.segments.len(), 1);
        assert_eq!(t.segments[0].text, "kept");
    }

    #[test]
    fn empty_text_and_no_segments_is_blank_not_error() {
        let t = assemble(json!({"text": "", "chunks": []}));
        assert!(t.is_blank());
    }

    #[test]
    fn neither_text_nor_segments_is_bad_output() {
        let result = TranscriptAssembler::default()
            .assemble(&json!({"status": "ok"}), BackendKind::RemoteApi);
        match result {
            Err(ParlanceError::BadOutput { backend, message }) => {
                assert_eq!(backend, "remote_api");
                assert!(message.contains("status"));
            }
            other => panic!("Expected BadOutput, got {other:?}"),
        }
        assert!(
            TranscriptAssembler::default()
                .assemble(&json!(42), BackendKind::RemoteApi)
                .is_err()
        );
    }

    #[test]
    fn assemble_text_trims() {
        let t = TranscriptAssembler::default().assemble_text("  hi \n");
        assert_eq!(t, Transcript::from_text("hi"));
    }
}
