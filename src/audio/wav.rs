use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// PCM sample width written by [`encode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Eight,
    #[default]
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwo => 32,
        }
    }

    pub fn bytes(self) -> u16 {
        self.bits() / 8
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = ConfigError;

    fn try_from(bits: u16) -> Result<Self, ConfigError> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwo),
            _ => Err(ConfigError::Invalid("bit depth must be 8, 16, 24 or 32")),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> u16 {
        depth.bits()
    }
}

/// The canonical 44-byte PCM header: `RIFF` / `WAVE` / 16-byte `fmt ` /
/// `data`, all little-endian. Derived fields are computed, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    pub const LEN: usize = 44;
    const FMT_CHUNK_LEN: u32 = 16;
    const FORMAT_PCM: u16 = 1;

    /// Header for `sample_count` interleaved samples.
    pub fn new(sample_count: usize, sample_rate: u32, channel_count: u16, bit_depth: BitDepth) -> Self {
        let data_size = sample_count.saturating_mul(bit_depth.bytes() as usize);
        Self {
            channel_count,
            sample_rate,
            bits_per_sample: bit_depth.bits(),
            data_size: u32::try_from(data_size).unwrap_or(u32::MAX),
        }
    }

    /// The RIFF chunk size: everything after the first 8 bytes.
    pub fn riff_size(&self) -> u32 {
        36u32.saturating_add(self.data_size)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate
            .saturating_mul(self.channel_count as u32)
            .saturating_mul(self.bits_per_sample as u32 / 8)
    }

    pub fn block_align(&self) -> u16 {
        self.channel_count.saturating_mul(self.bits_per_sample / 8)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&self.riff_size().to_le_bytes());
        out.extend_from_slice(b"WAVE");

        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&Self::FMT_CHUNK_LEN.to_le_bytes());
        out.extend_from_slice(&Self::FORMAT_PCM.to_le_bytes());
        out.extend_from_slice(&self.channel_count.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&self.byte_rate().to_le_bytes());
        out.extend_from_slice(&self.block_align().to_le_bytes());
        out.extend_from_slice(&self.bits_per_sample.to_le_bytes());

        out.extend_from_slice(b"data");
        out.extend_from_slice(&self.data_size.to_le_bytes());
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = Vec::with_capacity(Self::LEN);
        self.write_to(&mut buf);
        let mut out = [0u8; Self::LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Read back a header in exactly the layout [`WavHeader::write_to`]
    /// produces. Any other layout (extensible format, extra chunks, non-PCM)
    /// gives `None`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let h = bytes.get(..Self::LEN)?;
        let u16_at = |i: usize| u16::from_le_bytes([h[i], h[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([h[i], h[i + 1], h[i + 2], h[i + 3]]);

        if &h[0..4] != b"RIFF" || &h[8..12] != b"WAVE" || &h[12..16] != b"fmt " || &h[36..40] != b"data" {
            return None;
        }
        if u32_at(16) != Self::FMT_CHUNK_LEN || u16_at(20) != Self::FORMAT_PCM {
            return None;
        }

        let header = Self {
            channel_count: u16_at(22),
            sample_rate: u32_at(24),
            bits_per_sample: u16_at(34),
            data_size: u32_at(40),
        };
        let consistent = u32_at(4) == header.riff_size()
            && u32_at(28) == header.byte_rate()
            && u16_at(32) == header.block_align();
        consistent.then_some(header)
    }
}

/// Serialize interleaved 16-bit PCM as a canonical WAV file.
///
/// 8-bit output is unsigned offset-binary; 24- and 32-bit output left-shift
/// the 16-bit value so full scale stays full scale.
pub fn encode(pcm: &[i16], sample_rate: u32, channel_count: u16, bit_depth: BitDepth) -> Vec<u8> {
    let header = WavHeader::new(pcm.len(), sample_rate, channel_count, bit_depth);
    let mut out = Vec::with_capacity(WavHeader::LEN + header.data_size as usize);
    header.write_to(&mut out);

    match bit_depth {
        BitDepth::Eight => out.extend(pcm.iter().map(|&s| ((s >> 8) + 128) as u8)),
        BitDepth::Sixteen => {
            for &s in pcm {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
        BitDepth::TwentyFour => {
            for &s in pcm {
                out.extend_from_slice(&((s as i32) << 8).to_le_bytes()[..3]);
            }
        }
        BitDepth::ThirtyTwo => {
            for &s in pcm {
                out.extend_from_slice(&((s as i32) << 16).to_le_bytes());
            }
        }
    }

    out
}
