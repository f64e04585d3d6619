//! WAV encoding for backends that take a file on disk or an upload body.

use crate::audio::normalize::PcmBuffer;
use crate::error::{ParlanceError, Result};
use std::io::Cursor;
use std::path::Path;

fn wav_error(e: hound::Error) -> ParlanceError {
    ParlanceError::Other(format!("Failed to write WAV: {}", e))
}

fn pcm_spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encode interleaved 16-bit samples as an in-memory WAV file.
pub fn encode_wav_i16(sample_rate: u32, channels: u16, samples: &[i16]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, pcm_spec(channels, sample_rate)).map_err(wav_error)?;
    for &s in samples {
        writer.write_sample(s).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(cursor.into_inner())
}

/// Encode a normalized buffer as 16-bit mono WAV.
pub fn encode_pcm_wav(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let samples: Vec<i16> = pcm.samples().iter().copied().map(to_i16).collect();
    encode_wav_i16(pcm.sample_rate(), pcm.channels(), &samples)
}

/// Write a normalized buffer to `path` as 16-bit mono WAV.
pub fn write_pcm_wav(path: &Path, pcm: &PcmBuffer) -> Result<()> {
    let mut writer =
        hound::WavWriter::create(path, pcm_spec(pcm.channels(), pcm.sample_rate()))
            .map_err(wav_error)?;
    for &s in pcm.samples() {
        writer.write_sample(to_i16(s)).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_back(bytes: Vec<u8>) -> (hound::WavSpec, Vec<i16>) {
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        let samples = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn encode_wav_i16_preserves_samples() {
        let input = vec![100i16, -200, 300, i16::MIN, i16::MAX];
        let bytes = encode_wav_i16(22050, 1, &input).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");

        let (spec, samples) = read_back(bytes);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.channels, 1);
        assert_eq!(samples, input);
    }

    #[test]
    fn encode_pcm_wav_scales_and_clamps() {
        let pcm = PcmBuffer::new(vec![0.0, 1.0, -1.0, 0.5, 2.0], 16000);
        let (spec, samples) = read_back(encode_pcm_wav(&pcm).unwrap());

        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], i16::MAX);
        assert_eq!(samples[2], -i16::MAX);
        assert_eq!(samples[3], i16::MAX / 2);
        assert_eq!(samples[4], i16::MAX);
    }

    #[test]
    fn write_pcm_wav_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.wav");
        let pcm = PcmBuffer::new(vec![0.25; 1600], 16000);

        write_pcm_wav(&path, &pcm).unwrap();

        let (spec, samples) = read_back(std::fs::read(&path).unwrap());
        assert_eq!(spec.channels, 1);
        assert_eq!(samples.len(), 1600);
    }

    #[test]
    fn empty_buffer_still_produces_valid_header() {
        let bytes = encode_wav_i16(16000, 1, &[]).unwrap();
        let (_, samples) = read_back(bytes);
        assert!(samples.is_empty());
    }
}
