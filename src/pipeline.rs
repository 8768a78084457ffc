use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::decode::decode_sniffed;
use crate::audio::sniff::ContainerFormat;
use crate::audio::wav::{self, BitDepth, WavHeader};
use crate::clip::{self, AudioClip};
use crate::config::PipelineConfig;
use crate::dsp::quantize::quantize;
use crate::dsp::resample::Resampler;
use crate::error::{ConfigError, PipelineError};
use crate::timing::{ClipRequest, WordTiming};
use crate::types::{AudioAsset, DecodedAudio, NormalizedAudio};

#[derive(Default)]
pub struct NormalizerBuilder {
    config: PipelineConfig,
    resampler: Option<Box<dyn Resampler>>,
}

impl NormalizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn target_rate(mut self, hz: u32) -> Self {
        self.config.target_rate = hz;
        self
    }

    pub fn bit_depth(mut self, depth: BitDepth) -> Self {
        self.config.bit_depth = depth;
        self
    }

    pub fn clip_padding_ms(mut self, ms: f64) -> Self {
        self.config.clip_padding_ms = ms;
        self
    }

    /// Use a custom resampler instead of the one named in the config.
    pub fn with_resampler<R: Resampler + 'static>(mut self, r: R) -> Self {
        self.resampler = Some(Box::new(r));
        self
    }

    pub fn build(self) -> Result<Normalizer, ConfigError> {
        self.config.validate()?;
        let resampler = self.resampler.unwrap_or_else(|| self.config.resampler.build());
        Ok(Normalizer {
            config: self.config,
            resampler,
        })
    }
}

/// Runs the full decode -> resample -> downmix -> quantize -> encode chain.
///
/// Holds no per-request state; one instance can serve any number of threads.
pub struct Normalizer {
    config: PipelineConfig,
    resampler: Box<dyn Resampler>,
}

/// The canonical WAV plus what was learned about the source along the way.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedWav {
    pub bytes: Vec<u8>,
    /// The same audio as float samples, kept for clip extraction.
    pub audio: NormalizedAudio,
    /// Container identified from the bytes, whatever the declared type said.
    pub source_format: ContainerFormat,
    pub source_rate: u32,
    pub source_channels: u32,
    pub source_duration_secs: f64,
}

impl NormalizedWav {
    /// BLAKE3 of the WAV bytes, hex encoded. Identical input gives an
    /// identical digest.
    pub fn digest(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }

    pub fn header(&self) -> Option<WavHeader> {
        WavHeader::parse(&self.bytes)
    }
}

impl Normalizer {
    pub fn builder() -> NormalizerBuilder {
        NormalizerBuilder::default()
    }

    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn normalize(&self, bytes: &[u8], declared_type: &str) -> Result<NormalizedWav, PipelineError> {
        self.run(bytes, declared_type, None)
    }

    pub fn normalize_asset(&self, asset: &AudioAsset) -> Result<NormalizedWav, PipelineError> {
        self.run(&asset.bytes, &asset.media_type, None)
    }

    /// Like [`Normalizer::normalize`], but gives up with
    /// [`PipelineError::Cancelled`] once `cancel` is set. The flag is checked
    /// between stages; partial results are dropped.
    pub fn normalize_cancellable(
        &self,
        bytes: &[u8],
        declared_type: &str,
        cancel: &AtomicBool,
    ) -> Result<NormalizedWav, PipelineError> {
        self.run(bytes, declared_type, Some(cancel))
    }

    /// Resample and downmix already-decoded audio.
    pub fn normalize_decoded(&self, audio: DecodedAudio) -> NormalizedAudio {
        NormalizedAudio::from_decoded_with(&*self.resampler, audio, self.config.target_rate)
    }

    /// Quantize and wrap normalized audio in the configured WAV profile.
    pub fn encode(&self, audio: &NormalizedAudio) -> Vec<u8> {
        let pcm = quantize(&audio.samples);
        wav::encode(&pcm, audio.sample_rate, 1, self.config.bit_depth)
    }

    /// Clip for one assessed word using the configured padding.
    pub fn clip_word(&self, audio: &NormalizedAudio, word: &WordTiming) -> AudioClip {
        let request = ClipRequest::from_word(word, self.config.clip_padding_ms);
        clip::extract_request(audio, &request)
    }

    fn run(&self, bytes: &[u8], declared_type: &str, cancel: Option<&AtomicBool>) -> Result<NormalizedWav, PipelineError> {
        let check = || match cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(PipelineError::Cancelled),
            _ => Ok(()),
        };

        check()?;
        let (source_format, decoded) = decode_sniffed(bytes, declared_type)?;
        let source_rate = decoded.sample_rate;
        let source_channels = decoded.channel_count();
        let source_duration_secs = decoded.duration_secs;

        check()?;
        let audio = self.normalize_decoded(decoded);

        check()?;
        let bytes = self.encode(&audio);

        log::info!(
            "Normalized {} ({} Hz, {} ch, {:.2}s) -> {} byte WAV at {} Hz",
            source_format,
            source_rate,
            source_channels,
            source_duration_secs,
            bytes.len(),
            audio.sample_rate
        );

        Ok(NormalizedWav {
            bytes,
            audio,
            source_format,
            source_rate,
            source_channels,
            source_duration_secs,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            resampler: PipelineConfig::default().resampler.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::mix::downmix_to_mono;
    use crate::dsp::resample::{resample, FftResampler};
    use crate::error::DecodeError;
    use crate::TARGET_RATE;
    use std::f64::consts::PI;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A stereo 44.1 kHz speech-like test tone as 16-bit WAV bytes.
    fn stereo_tone_wav(secs: f64) -> Vec<u8> {
        let rate = 44_100u32;
        let frames = (secs * rate as f64) as usize;
        let mut pcm = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f64 / rate as f64;
            let l = 0.4 * (2.0 * PI * 220.0 * t).sin();
            let r = 0.3 * (2.0 * PI * 330.0 * t).sin();
            pcm.push(l as f32);
            pcm.push(r as f32);
        }
        wav::encode(&quantize(&pcm), rate, 2, BitDepth::Sixteen)
    }

    #[test]
    fn test_silent_stereo_48k_end_to_end() {
        let audio = DecodedAudio::from_channels(48_000, vec![vec![0.0; 96_000], vec![0.0; 96_000]]);
        let resampled = resample(audio, TARGET_RATE);
        let mono = downmix_to_mono(resampled);
        let pcm = quantize(&mono.channels[0]);
        let wav = wav::encode(&pcm, TARGET_RATE, 1, BitDepth::Sixteen);

        assert_eq!(wav.len(), 44 + 2 * 16_000 * 2);
        assert!(wav[44..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_normalize_produces_assessment_profile() {
        init_logs();
        let normalizer = Normalizer::default();
        let out = normalizer.normalize(&stereo_tone_wav(1.5), "audio/wav").unwrap();

        let header = out.header().expect("canonical header");
        assert_eq!(header.channel_count, 1);
        assert_eq!(header.sample_rate, 16_000);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_size as usize, out.bytes.len() - WavHeader::LEN);
        assert_eq!(out.audio.len(), 24_000);
        assert_eq!(header.data_size, 24_000 * 2);

        assert_eq!(out.source_format, ContainerFormat::Wav);
        assert_eq!(out.source_rate, 44_100);
        assert_eq!(out.source_channels, 2);
        assert!((out.audio.duration_secs - out.source_duration_secs).abs() <= 1.0 / 16_000.0);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let input = stereo_tone_wav(0.75);
        let normalizer = Normalizer::default();
        let a = normalizer.normalize(&input, "audio/wav").unwrap();
        let b = normalizer.normalize(&input, "audio/wav").unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_already_canonical_input_stays_within_one_step() {
        let pcm: Vec<i16> = (0..16_000).map(|i| ((i % 64) as i16 - 32) * 500).collect();
        let input = wav::encode(&pcm, 16_000, 1, BitDepth::Sixteen);
        let out = Normalizer::default().normalize(&input, "audio/wav").unwrap();
        assert_eq!(out.bytes.len(), input.len());
        assert_eq!(out.bytes[..WavHeader::LEN], input[..WavHeader::LEN]);
        let back: Vec<i16> = out.bytes[WavHeader::LEN..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        for (&a, &b) in pcm.iter().zip(&back) {
            assert!((a as i32 - b as i32).abs() <= 1, "{a} came back as {b}");
        }
    }

    #[test]
    fn test_decode_errors_surface() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.normalize(&[], "audio/webm"),
            Err(PipelineError::Decode(DecodeError::Empty))
        );
        assert!(matches!(
            normalizer.normalize(b"<html></html>", "audio/webm"),
            Err(PipelineError::Decode(DecodeError::Unrecognized { .. }))
        ));
    }

    #[test]
    fn test_cancelled_before_work() {
        let cancel = AtomicBool::new(true);
        let result = Normalizer::default().normalize_cancellable(&stereo_tone_wav(0.1), "audio/wav", &cancel);
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[test]
    fn test_not_cancelled_completes() {
        let cancel = AtomicBool::new(false);
        let result = Normalizer::default().normalize_cancellable(&stereo_tone_wav(0.1), "audio/wav", &cancel);
        assert!(result.is_ok());
    }

    #[test]
    fn test_parallel_runs_agree() {
        let input = stereo_tone_wav(0.5);
        let normalizer = Normalizer::default();
        let expected = normalizer.normalize(&input, "audio/wav").unwrap().digest();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| normalizer.normalize(&input, "audio/wav").unwrap().digest()))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), expected);
            }
        });
    }

    #[test]
    fn test_builder_overrides() {
        let normalizer = Normalizer::builder()
            .target_rate(8_000)
            .bit_depth(BitDepth::TwentyFour)
            .with_resampler(FftResampler)
            .build()
            .unwrap();
        let out = normalizer.normalize(&stereo_tone_wav(0.5), "audio/wav").unwrap();
        let header = out.header().unwrap();
        assert_eq!(header.sample_rate, 8_000);
        assert_eq!(header.bits_per_sample, 24);
        assert_eq!(out.audio.len(), 4_000);
        assert_eq!(header.data_size, 4_000 * 3);
    }

    #[test]
    fn test_asset_matches_raw_bytes() {
        let input = stereo_tone_wav(0.4);
        let normalizer = Normalizer::default();
        let from_asset = normalizer
            .normalize_asset(&AudioAsset::new(input.clone(), "audio/webm;codecs=opus"))
            .unwrap();
        let from_bytes = normalizer.normalize(&input, "audio/wav").unwrap();
        assert_eq!(from_asset, from_bytes);
        assert_eq!(from_asset.source_format, ContainerFormat::Wav);
    }

    #[test]
    fn test_normalize_decoded_uses_configured_rate() {
        let normalizer = Normalizer::builder().target_rate(8_000).build().unwrap();
        let audio = DecodedAudio::from_channels(24_000, vec![vec![0.2; 2_400], vec![0.6; 2_400]]);
        let out = normalizer.normalize_decoded(audio);
        assert_eq!(out.sample_rate, 8_000);
        assert_eq!(out.len(), 800);
        assert!(out.samples.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_from_config() {
        let config = PipelineConfig::from_json(r#"{"target_rate": 22050, "clip_padding_ms": 0, "resampler": "fft"}"#).unwrap();
        let normalizer = Normalizer::from_config(config.clone()).unwrap();
        assert_eq!(normalizer.config(), &config);
        let out = normalizer.normalize(&stereo_tone_wav(0.2), "audio/wav").unwrap();
        assert_eq!(out.audio.sample_rate, 22_050);
        assert_eq!(out.audio.len(), 4_410);

        let bad = PipelineConfig {
            clip_padding_ms: f64::NAN,
            ..PipelineConfig::default()
        };
        assert!(matches!(Normalizer::from_config(bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_clip_padding_override_reaches_clip_word() {
        let out = Normalizer::default().normalize(&stereo_tone_wav(3.0), "audio/wav").unwrap();
        let word = WordTiming {
            word: "tone".into(),
            start_ticks: 10_000_000,
            duration_ticks: 5_000_000,
            accuracy_score: 90.0,
        };
        let unpadded = Normalizer::builder().clip_padding_ms(0.0).build().unwrap();
        assert_eq!(unpadded.config().clip_padding_ms, 0.0);
        let clip = unpadded.clip_word(&out.audio, &word);
        // 1000 ms .. 1500 ms, no padding
        assert_eq!(clip.start_sample, 16_000);
        assert_eq!(clip.len(), 8_000);
    }

    #[test]
    fn test_builder_rejects_zero_rate() {
        assert!(matches!(
            Normalizer::builder().target_rate(0).build(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_clip_word_from_normalized_output() {
        let out = Normalizer::default().normalize(&stereo_tone_wav(3.0), "audio/wav").unwrap();
        let word = WordTiming {
            word: "tone".into(),
            start_ticks: 10_000_000,
            duration_ticks: 5_000_000,
            accuracy_score: 90.0,
        };
        let clip = Normalizer::default().clip_word(&out.audio, &word);
        // 900 ms .. 1600 ms at 16 kHz
        assert_eq!(clip.start_sample, 14_400);
        assert_eq!(clip.len(), 11_200);
        assert_eq!(clip.samples[..], out.audio.samples[14_400..25_600]);
    }
}
