//! Signal normalization: decode, downmix, peak-normalize and resample.
//!
//! Every backend that needs raw samples receives the same canonical form:
//! mono f32 at the target rate with peak amplitude exactly 1.0 (or silence).

use crate::audio::asset::AudioAsset;
use crate::audio::decode::{DecodedAudio, decode};
use crate::defaults::{CHANNELS, SAMPLE_RATE};
use crate::error::{ParlanceError, Result};

/// Canonical PCM: mono f32 samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl PcmBuffer {
    /// Wrap mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Maximum absolute sample value.
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }

    pub fn is_silent(&self) -> bool {
        self.peak() == 0.0
    }
}

/// Converts uploads into [`PcmBuffer`]s at a fixed rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalNormalizer {
    target_rate: u32,
    target_channels: u16,
}

impl Default for SignalNormalizer {
    fn default() -> Self {
        Self {
            target_rate: SAMPLE_RATE,
            target_channels: CHANNELS,
        }
    }
}

impl SignalNormalizer {
    /// Create a normalizer.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` if the rate is zero or the channel count is not 1.
    pub fn new(target_rate: u32, target_channels: u16) -> Result<Self> {
        if target_rate == 0 {
            return Err(ParlanceError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if target_channels != 1 {
            return Err(ParlanceError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: format!("only mono output is supported, got {target_channels}"),
            });
        }
        Ok(Self {
            target_rate,
            target_channels,
        })
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn target_channels(&self) -> u16 {
        self.target_channels
    }

    /// Decode and normalize an upload.
    ///
    /// # Errors
    /// Returns `ParlanceError::Decode` if the container cannot be parsed or is empty.
    pub fn normalize(&self, asset: &AudioAsset) -> Result<PcmBuffer> {
        let decoded = decode(asset.bytes(), Some(asset.mime().extension()))?;
        self.normalize_decoded(decoded)
    }

    /// Normalize already-decoded audio.
    pub fn normalize_decoded(&self, decoded: DecodedAudio) -> Result<PcmBuffer> {
        let source_rate = decoded.sample_rate;
        let mut mono = downmix_first_channel(decoded.channels);
        if mono.is_empty() {
            return Err(ParlanceError::Decode {
                message: "no audio samples decoded".to_string(),
            });
        }

        peak_normalize(&mut mono);
        let mut samples = resample_nearest(&mono, source_rate, self.target_rate);
        // Decimation can drop the peak sample; rescale so the peak is 1.0 again.
        // Output is then `normalized[2i] * k`, not `normalized[2i]`, for 2:1 input
        // whose peak sat on an odd index.
        peak_normalize(&mut samples);

        tracing::debug!(
            source_rate,
            target_rate = self.target_rate,
            samples = samples.len(),
            "Normalized audio"
        );

        Ok(PcmBuffer {
            samples,
            sample_rate: self.target_rate,
            channels: self.target_channels,
        })
    }
}

/// Keep only the first channel.
///
/// Not an energy-preserving mixdown; interview recordings are effectively mono.
pub fn downmix_first_channel(channels: Vec<Vec<f32>>) -> Vec<f32> {
    channels.into_iter().next().unwrap_or_default()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()))
}

/// Divide every sample by the peak magnitude.
///
/// All-zero input is left untouched. Returns the peak found before scaling.
pub fn peak_normalize(samples: &mut [f32]) -> f32 {
    let max_abs = peak(samples);
    if max_abs > 0.0 && max_abs != 1.0 {
        for s in samples.iter_mut() {
            *s /= max_abs;
        }
    }
    max_abs
}

/// Output length for a rate change: nearest integer, exact ties toward the shorter length.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    let numerator = len as u128 * to_rate as u128 + (from_rate as u128 - 1) / 2;
    (numerator / from_rate as u128) as usize
}

/// Nearest-neighbor resampling: `out[i] = samples[floor(i * from / to)]`.
///
/// Not band-limited, so downsampling aliases. Speech models tolerate it and
/// the cost is a single pass.
pub fn resample_nearest(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || to_rate == 0 {
        return samples.to_vec();
    }

    let out_len = resampled_len(samples.len(), from_rate, to_rate);
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let idx = (i as u128 * from_rate as u128 / to_rate as u128) as usize;
            samples[idx.min(last)]
        })
        .collect()
}
