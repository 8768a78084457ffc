use crate::dsp::resample::Resampler;
use crate::dsp::{mix, resample};
use crate::error::DecodeError;
use crate::TARGET_RATE;

/// Raw bytes as captured by the browser, with the media type it claimed.
#[derive(Clone, Debug)]
pub struct AudioAsset {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl AudioAsset {
    pub fn new(bytes: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn decode(&self) -> Result<DecodedAudio, DecodeError> {
        crate::audio::decode::decode(&self.bytes, &self.media_type)
    }
}

/// Planar PCM. Every channel has the same length and every sample lies in
/// [-1.0, 1.0].
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
    pub duration_secs: f64,
}

impl DecodedAudio {
    /// Build from planar channels, deriving the duration from the frame count.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(sample_rate > 0);
        debug_assert!(!channels.is_empty());
        let frames = channels.first().map_or(0, Vec::len);
        debug_assert!(channels.iter().all(|c| c.len() == frames));
        Self {
            sample_rate,
            channels,
            duration_secs: frames as f64 / sample_rate as f64,
        }
    }

    /// Split interleaved frames into planar channels.
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, interleaved: &[f32]) -> Self {
        let channel_count = channel_count.max(1);
        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::from_channels(sample_rate, channels)
    }

    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Mono audio at the assessment rate, ready for quantization or clipping.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl NormalizedAudio {
    /// Resample to `target_rate` and downmix to mono with the default resampler.
    pub fn from_decoded(audio: DecodedAudio, target_rate: u32) -> Self {
        Self::from_decoded_with(&resample::LinearResampler, audio, target_rate)
    }

    pub fn from_decoded_with<R: Resampler + ?Sized>(resampler: &R, audio: DecodedAudio, target_rate: u32) -> Self {
        let resampled = resample::resample_with(resampler, audio, target_rate);
        Self::from_mono_decoded(mix::downmix_to_mono(resampled))
    }

    /// Wrap samples that are already mono at their final rate.
    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        let duration_secs = samples.len() as f64 / sample_rate as f64;
        Self {
            samples,
            sample_rate,
            duration_secs,
        }
    }

    /// Take the single channel of a downmixed buffer.
    fn from_mono_decoded(audio: DecodedAudio) -> Self {
        debug_assert_eq!(audio.channels.len(), 1);
        let DecodedAudio {
            sample_rate,
            channels,
            duration_secs,
        } = audio;
        let samples = channels.into_iter().next().unwrap_or_default();
        Self {
            samples,
            sample_rate,
            duration_secs,
        }
    }

    /// Silent buffer of `duration_secs` at the assessment rate.
    pub fn silence(duration_secs: f64) -> Self {
        let len = (duration_secs * TARGET_RATE as f64).round() as usize;
        Self::from_mono(TARGET_RATE, vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
