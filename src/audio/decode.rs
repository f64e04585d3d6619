//! Container/codec decoding into per-channel f32 samples.
//!
//! Uses symphonia's probe so WAV, MP3 and WebM (Matroska) inputs share one path.

use crate::error::{ParlanceError, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// One sample vector per source channel, all of equal length.
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

fn decode_error(message: impl Into<String>) -> ParlanceError {
    ParlanceError::Decode {
        message: message.into(),
    }
}

/// Decode a compressed or container audio buffer.
///
/// `extension` is passed to the format probe as a hint; detection still
/// works on content alone.
///
/// # Errors
/// Returns `ParlanceError::Decode` when the container cannot be parsed,
/// has no audio track, or yields no samples.
pub fn decode(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(decode_error("audio buffer is empty"));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(format!("unrecognized container: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio track found"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(format!("unsupported codec: {e}")))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(format!("packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(decode_error(format!("decode: {e}"))),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }
        if sample_rate.is_none() {
            sample_rate = Some(spec.rate);
        }

        let channel_count = spec.channels.count();
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }

        let mut buffer = SampleBuffer::<f32>::new(frames as u64, spec);
        buffer.copy_planar_ref(decoded);
        for (channel, plane) in channels
            .iter_mut()
            .zip(buffer.samples().chunks(frames))
        {
            channel.extend_from_slice(plane);
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| decode_error("unknown sample rate"))?;
    if sample_rate == 0 {
        return Err(decode_error("sample rate is zero"));
    }
    if channels.first().is_none_or(Vec::is_empty) {
        return Err(decode_error("no audio samples decoded"));
    }

    tracing::debug!(
        channels = channels.len(),
        frames = channels[0].len(),
        sample_rate,
        "Decoded audio"
    );

    Ok(DecodedAudio {
        channels,
        sample_rate,
    })
}
