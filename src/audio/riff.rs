//! Chunk-level inspection of RIFF/WAVE streams.
//!
//! Sample decoding is left to `hound`; this walk tells a cut-off upload (data
//! chunk shorter than its size field) apart from a malformed one before any
//! samples are read.

use crate::audio::sniff::ContainerFormat;
use crate::error::DecodeError;

/// One subchunk. `data` is clipped to the bytes actually present.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub declared_len: u32,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.declared_len as usize
    }
}

/// Iterate the subchunks after the 12-byte `RIFF....WAVE` preamble.
pub fn chunks(bytes: &[u8]) -> Chunks<'_> {
    Chunks { bytes, pos: 12 }
}

pub struct Chunks<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let bytes = self.bytes;
        if self.pos + 8 > bytes.len() {
            return None;
        }
        let pos = self.pos;
        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[pos..pos + 4]);
        let declared_len = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]);
        let data_start = pos + 8;
        let data_end = data_start.saturating_add(declared_len as usize).min(bytes.len());

        // Chunks are word-aligned (padded to even size)
        self.pos = data_start.saturating_add((declared_len as usize + 1) & !1);

        Some(Chunk {
            id,
            declared_len,
            data: &bytes[data_start..data_end],
        })
    }
}

/// Where the PCM payload of a WAVE stream sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaveLayout {
    pub fmt_len: u32,
    pub data_offset: usize,
    pub data_len: u32,
}

/// Confirm `bytes` holds a complete `fmt ` chunk followed by a complete
/// `data` chunk.
pub fn inspect_wave(bytes: &[u8]) -> Result<WaveLayout, DecodeError> {
    let mut fmt_len = None;

    for chunk in chunks(bytes) {
        match &chunk.id {
            b"fmt " => {
                if !chunk.is_complete() {
                    return Err(DecodeError::truncated(ContainerFormat::Wav, "fmt chunk is cut short"));
                }
                fmt_len = Some(chunk.declared_len);
            }
            b"data" => {
                let Some(fmt_len) = fmt_len else {
                    return Err(DecodeError::malformed(ContainerFormat::Wav, "data chunk precedes fmt chunk"));
                };
                if !chunk.is_complete() {
                    return Err(DecodeError::truncated(
                        ContainerFormat::Wav,
                        format!("data chunk declares {} bytes, {} present", chunk.declared_len, chunk.data.len()),
                    ));
                }
                let data_offset = chunk.data.as_ptr() as usize - bytes.as_ptr() as usize;
                return Ok(WaveLayout {
                    fmt_len,
                    data_offset,
                    data_len: chunk.declared_len,
                });
            }
            _ => {}
        }
    }

    let missing = if fmt_len.is_some() { "data" } else { "fmt" };
    Err(DecodeError::truncated(ContainerFormat::Wav, format!("stream ends before the {missing} chunk")))
}
