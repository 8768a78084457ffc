use crate::audio::wav::{self, BitDepth};
use crate::dsp::quantize::quantize;
use crate::error::ClipError;
use crate::timing::ClipRequest;
use crate::types::NormalizedAudio;

/// Context kept on each side of a word so it does not start or stop
/// mid-phoneme.
pub const DEFAULT_PADDING_MS: f64 = 100.0;

/// An owned slice of normalized audio, ready for playback.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// First source sample included.
    pub start_sample: usize,
    /// One past the last source sample included.
    pub end_sample: usize,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Encode as a mono 16-bit WAV a browser can play directly.
    pub fn to_wav(&self) -> Vec<u8> {
        wav::encode(&quantize(&self.samples), self.sample_rate, 1, BitDepth::Sixteen)
    }
}

/// Copy `[start_ms - padding_ms, end_ms + padding_ms)` out of `audio`.
///
/// The padded range is clamped to the recording; requesting audio past
/// either end is normal near the edges of a take and is not an error. A range
/// that clamps to nothing gives an empty clip. A reversed range is a caller
/// bug and is rejected before any clamping.
pub fn extract_clip(audio: &NormalizedAudio, start_ms: u64, end_ms: u64, padding_ms: f64) -> Result<AudioClip, ClipError> {
    if start_ms > end_ms {
        log::error!("Clip requested with start {start_ms} ms after end {end_ms} ms");
        return Err(ClipError::InvalidRange { start_ms, end_ms });
    }
    Ok(cut(audio, start_ms, end_ms, padding_ms))
}

/// Extract the clip described by a validated [`ClipRequest`].
pub fn extract_request(audio: &NormalizedAudio, request: &ClipRequest) -> AudioClip {
    cut(audio, request.start_ms(), request.end_ms(), request.padding_ms())
}

fn cut(audio: &NormalizedAudio, start_ms: u64, end_ms: u64, padding_ms: f64) -> AudioClip {
    let padding_ms = if padding_ms.is_finite() && padding_ms >= 0.0 {
        padding_ms
    } else {
        log::warn!("Ignoring clip padding of {padding_ms} ms");
        0.0
    };

    let len = audio.samples.len();
    let rate = audio.sample_rate as f64;
    let to_index = |ms: f64| -> usize {
        let idx = (ms / 1000.0 * rate).round();
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(len)
        }
    };

    let start_sample = to_index(start_ms as f64 - padding_ms);
    let end_sample = to_index(end_ms as f64 + padding_ms).max(start_sample);

    log::debug!(
        "Clip {start_ms}..{end_ms} ms (+/-{padding_ms} ms) -> samples {start_sample}..{end_sample} of {len}"
    );

    AudioClip {
        samples: audio.samples[start_sample..end_sample].to_vec(),
        sample_rate: audio.sample_rate,
        start_sample,
        end_sample,
    }
}
