//! Normalizes browser-captured speech recordings into the WAV profile a
//! pronunciation-assessment service accepts, and cuts padded per-word clips
//! out of the normalized audio using the tick-based timings the service
//! reports back.
//!
//! ```text
//! decode -> resample -> downmix -> quantize -> encode     (normalization)
//! WordTiming -> ClipRequest -> extract_clip               (playback clips)
//! ```

pub mod audio;
pub mod clip;
pub mod config;
pub mod dsp;
pub mod error;
pub mod pipeline;
pub mod timing;
pub mod types;

pub use audio::decode::decode;
pub use audio::sniff::ContainerFormat;
pub use audio::wav::{encode, BitDepth, WavHeader};
pub use clip::{extract_clip, extract_request, AudioClip, DEFAULT_PADDING_MS};
pub use config::{PipelineConfig, ResamplerKind};
pub use dsp::mix::downmix_to_mono;
pub use dsp::quantize::{dequantize, quantize};
pub use dsp::resample::{resample, resample_with, FftResampler, LinearResampler, Resampler};
pub use error::{ClipError, ConfigError, DecodeError, PipelineError};
pub use pipeline::{NormalizedWav, Normalizer, NormalizerBuilder};
pub use timing::{ms_to_ticks, parse_assessed_words, ticks_to_ms, ClipRequest, WordTiming};
pub use types::{AudioAsset, DecodedAudio, NormalizedAudio};

/// Sample rate the assessment service requires.
pub const TARGET_RATE: u32 = 16_000;
