//! Fallback transcription pipeline.
//!
//! An uploaded asset is size-checked, normalized on demand, and handed to each
//! configured backend in priority order until one returns a non-blank transcript.

pub mod attempt;
pub mod builder;
pub mod orchestrator;

pub use attempt::{AttemptOutcome, BackendAttempt};
pub use builder::build_orchestrator;
pub use orchestrator::{FallbackOrchestrator, TranscriptionReport};
