use serde::{Deserialize, Serialize};

use crate::audio::wav::BitDepth;
use crate::clip::DEFAULT_PADDING_MS;
use crate::dsp::resample::{FftResampler, LinearResampler, Resampler};
use crate::error::ConfigError;
use crate::TARGET_RATE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerKind {
    #[default]
    Linear,
    Fft,
}

impl ResamplerKind {
    pub fn build(self) -> Box<dyn Resampler> {
        match self {
            ResamplerKind::Linear => Box::new(LinearResampler),
            ResamplerKind::Fft => Box::new(FftResampler),
        }
    }
}

/// Output profile and clip defaults. Every field has a default matching what
/// the assessment service accepts, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_rate: u32,
    pub bit_depth: BitDepth,
    pub clip_padding_ms: f64,
    pub resampler: ResamplerKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_rate: TARGET_RATE,
            bit_depth: BitDepth::Sixteen,
            clip_padding_ms: DEFAULT_PADDING_MS,
            resampler: ResamplerKind::Linear,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_rate == 0 {
            return Err(ConfigError::Invalid("target_rate must be positive"));
        }
        if !self.clip_padding_ms.is_finite() || self.clip_padding_ms < 0.0 {
            return Err(ConfigError::Invalid("clip_padding_ms must be a non-negative number"));
        }
        Ok(())
    }
}
