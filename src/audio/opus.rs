//! Opus packet decoding shared by the Ogg and WebM demuxers.
//!
//! Both containers hand over the same thing: the `OpusHead` identification
//! header and the raw audio packets in order. Decoding needs libopus and is
//! only compiled with the `opus` feature; without it an Opus payload is
//! reported as recognized but undecodable.

use crate::audio::sniff::ContainerFormat;
use crate::error::DecodeError;
use crate::types::DecodedAudio;

/// Opus always decodes at 48 kHz, whatever input rate the header records.
pub const OPUS_RATE: u32 = 48_000;

/// The `OpusHead` identification header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpusHead {
    pub channels: u8,
    /// Frames at 48 kHz to drop from the start of the decoded output.
    pub pre_skip: u16,
    /// Rate of the original capture. Informational only.
    pub input_rate: u32,
    /// Q7.8 dB.
    pub output_gain: i16,
    pub mapping_family: u8,
}

impl OpusHead {
    pub const MAGIC: &'static [u8; 8] = b"OpusHead";
    const MIN_LEN: usize = 19;

    pub fn parse(bytes: &[u8], format: ContainerFormat) -> Result<Self, DecodeError> {
        if !bytes.starts_with(Self::MAGIC) {
            return Err(DecodeError::malformed(format, "missing OpusHead header"));
        }
        if bytes.len() < Self::MIN_LEN {
            return Err(DecodeError::malformed(
                format,
                format!("OpusHead is {} bytes, expected at least {}", bytes.len(), Self::MIN_LEN),
            ));
        }
        let version = bytes[8];
        if version >> 4 != 0 {
            return Err(DecodeError::malformed(format, format!("unsupported OpusHead version {version}")));
        }

        let head = Self {
            channels: bytes[9],
            pre_skip: u16::from_le_bytes([bytes[10], bytes[11]]),
            input_rate: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            output_gain: i16::from_le_bytes([bytes[16], bytes[17]]),
            mapping_family: bytes[18],
        };
        if head.channels == 0 {
            return Err(DecodeError::malformed(format, "OpusHead declares no channels"));
        }
        if head.mapping_family == 0 && head.channels > 2 {
            return Err(DecodeError::malformed(
                format,
                format!("mapping family 0 allows 2 channels, header says {}", head.channels),
            ));
        }
        Ok(head)
    }

    /// Linear factor for `output_gain`.
    pub fn gain_factor(&self) -> f32 {
        10f32.powf(self.output_gain as f32 / (256.0 * 20.0))
    }
}

/// A demuxed Opus track.
#[derive(Clone, Debug)]
pub struct OpusStream {
    pub head: OpusHead,
    pub packets: Vec<Vec<u8>>,
    /// Granule position of the final page: pre-skip plus playable frames.
    /// WebM has no equivalent, so only Ogg sets it.
    pub end_granule: Option<u64>,
}

#[cfg(feature = "opus")]
pub(crate) fn decode_stream(
    stream: OpusStream,
    format: ContainerFormat,
    declared: &str,
) -> Result<DecodedAudio, DecodeError> {
    use crate::audio::decode::sanitize;

    // 120 ms, the longest packet Opus allows.
    const MAX_PACKET_FRAMES: usize = 5_760;

    let head = stream.head;
    let channels = match head.channels {
        1 => ::opus::Channels::Mono,
        2 => ::opus::Channels::Stereo,
        n => {
            log::warn!("{format} Opus stream has {n} channels (mapping family {}); only mono and stereo decode", head.mapping_family);
            return Err(DecodeError::Unrecognized {
                declared: declared.to_string(),
                format: Some(format),
            });
        }
    };
    let count = head.channels as usize;

    let mut decoder = ::opus::Decoder::new(OPUS_RATE, channels).map_err(|e| DecodeError::malformed(format, e.to_string()))?;
    let mut buf = vec![0f32; MAX_PACKET_FRAMES * count];
    let mut interleaved: Vec<f32> = Vec::new();
    for (i, packet) in stream.packets.iter().enumerate() {
        match decoder.decode_float(packet, &mut buf, false) {
            Ok(frames) => interleaved.extend_from_slice(&buf[..frames * count]),
            Err(e) => log::warn!("Skipping corrupt {format} packet {i}: {e}"),
        }
    }

    let skip = (head.pre_skip as usize * count).min(interleaved.len());
    interleaved.drain(..skip);
    if let Some(end) = stream.end_granule {
        let playable = end.saturating_sub(head.pre_skip as u64) as usize * count;
        interleaved.truncate(playable);
    }
    if interleaved.is_empty() {
        return Err(DecodeError::truncated(format, "no audio frames decoded"));
    }

    let gain = head.gain_factor();
    for s in interleaved.iter_mut() {
        *s = sanitize(*s * gain);
    }
    log::debug!(
        "Decoded {} Opus packets: pre-skip {}, gain {:.3}",
        stream.packets.len(),
        head.pre_skip,
        gain
    );
    Ok(DecodedAudio::from_interleaved(OPUS_RATE, count, &interleaved))
}

#[cfg(not(feature = "opus"))]
pub(crate) fn decode_stream(
    stream: OpusStream,
    format: ContainerFormat,
    declared: &str,
) -> Result<DecodedAudio, DecodeError> {
    log::warn!(
        "{format} payload carries {} Opus packets but this build has no Opus decoder (enable the `opus` feature)",
        stream.packets.len()
    );
    Err(DecodeError::Unrecognized {
        declared: declared.to_string(),
        format: Some(format),
    })
}

/// `OpusHead` bytes for building test streams.
#[cfg(test)]
pub(crate) fn head_bytes(channels: u8, pre_skip: u16) -> Vec<u8> {
    let mut head = OpusHead::MAGIC.to_vec();
    head.push(1);
    head.push(channels);
    head.extend_from_slice(&pre_skip.to_le_bytes());
    head.extend_from_slice(&48_000u32.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes());
    head.push(0);
    head
}

/// Encode `packets` 20 ms frames of a mono 440 Hz tone.
#[cfg(all(test, feature = "opus"))]
pub(crate) fn encode_tone(packets: usize) -> Vec<Vec<u8>> {
    let mut encoder = ::opus::Encoder::new(OPUS_RATE, ::opus::Channels::Mono, ::opus::Application::Audio).unwrap();
    let mut out = vec![0u8; 4_000];
    (0..packets)
        .map(|p| {
            let frame: Vec<f32> = (0..960)
                .map(|i| {
                    let t = (p * 960 + i) as f32 / OPUS_RATE as f32;
                    0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
                })
                .collect();
            let len = encoder.encode_float(&frame, &mut out).unwrap();
            out[..len].to_vec()
        })
        .collect()
}
