use thiserror::Error;

use crate::audio::sniff::ContainerFormat;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("audio buffer is empty")]
    Empty,

    /// No decoder handles the byte signature. `format` is set when the
    /// container was identified but its codec has no decoder here: Ogg or
    /// WebM carrying an unknown codec, or Opus in a build without the `opus`
    /// feature.
    #[error("unrecognized audio signature (declared as {declared:?})")]
    Unrecognized {
        declared: String,
        format: Option<ContainerFormat>,
    },

    #[error("{format} stream is truncated: {detail}")]
    Truncated {
        format: ContainerFormat,
        detail: String,
    },

    #[error("{format} stream is malformed: {detail}")]
    Malformed {
        format: ContainerFormat,
        detail: String,
    },
}

impl DecodeError {
    pub(crate) fn truncated(format: ContainerFormat, detail: impl Into<String>) -> Self {
        DecodeError::Truncated {
            format,
            detail: detail.into(),
        }
    }

    pub(crate) fn malformed(format: ContainerFormat, detail: impl Into<String>) -> Self {
        DecodeError::Malformed {
            format,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClipError {
    /// Caller bug: the requested range ends before it starts.
    #[error("invalid clip range: start {start_ms} ms is after end {end_ms} ms")]
    InvalidRange { start_ms: u64, end_ms: u64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("could not process this audio")]
    Decode(#[from] DecodeError),

    #[error("normalization cancelled by caller")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse pipeline config")]
    Parse(#[from] serde_json::Error),

    #[error("invalid pipeline config: {0}")]
    Invalid(&'static str),
}
