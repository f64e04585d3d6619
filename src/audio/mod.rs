//! Audio intake: upload validation, decoding, normalization and WAV encoding.

pub mod asset;
pub mod decode;
pub mod normalize;
pub mod wav;
