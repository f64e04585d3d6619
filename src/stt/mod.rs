//! Speech-to-text backends and transcript canonicalization.

pub mod assembler;
pub mod backend;
pub mod in_process;
pub mod remote;
pub mod subprocess;
pub mod transcript;
pub mod whisper;
