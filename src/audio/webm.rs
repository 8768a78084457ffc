//! WebM demuxing for Chrome's MediaRecorder output (`audio/webm;codecs=opus`).
//!
//! `matroska-demuxer` does the parsing. Before handing it the bytes, a flat
//! EBML scan checks that no element runs past the end of the upload, so a
//! recording cut off mid-block reports `Truncated` instead of whatever the
//! demuxer makes of the missing tail.

use std::io::Cursor;

use matroska_demuxer::{Frame, MatroskaFile, TrackType};

use crate::audio::opus::{OpusHead, OpusStream};
use crate::audio::sniff::ContainerFormat;
use crate::error::DecodeError;

const FORMAT: ContainerFormat = ContainerFormat::WebM;

const SEGMENT: u32 = 0x1853_8067;
const CLUSTER: u32 = 0x1F43_B675;

/// Read an EBML variable-length integer at `pos`.
///
/// Returns the value without its length marker, the width in bytes, and
/// whether every value bit is set (the "unknown size" encoding).
fn vint(bytes: &[u8], pos: usize) -> Result<(u64, usize, bool), DecodeError> {
    let first = *bytes
        .get(pos)
        .ok_or_else(|| DecodeError::truncated(FORMAT, format!("element header at byte {pos} cut off")))?;
    if first == 0 {
        return Err(DecodeError::malformed(FORMAT, format!("invalid EBML length marker at byte {pos}")));
    }
    let width = first.leading_zeros() as usize + 1;
    let raw = bytes
        .get(pos..pos + width)
        .ok_or_else(|| DecodeError::truncated(FORMAT, format!("element header at byte {pos} cut off")))?;

    let mut value = (first & 0xFFu8.checked_shr(width as u32).unwrap_or(0)) as u64;
    for &b in &raw[1..] {
        value = (value << 8) | b as u64;
    }
    let unknown = value == (1u64 << (7 * width)) - 1;
    Ok((value, width, unknown))
}

/// Element ids keep their marker bits.
fn element_id(bytes: &[u8], pos: usize) -> Result<(u32, usize), DecodeError> {
    let (_, width, _) = vint(bytes, pos)?;
    if width > 4 {
        return Err(DecodeError::malformed(FORMAT, format!("element id at byte {pos} is {width} bytes wide")));
    }
    let id = bytes[pos..pos + width].iter().fold(0u32, |id, &b| (id << 8) | b as u32);
    Ok((id, width))
}

/// Walk the element tree, entering Segment and Cluster and skipping
/// everything else, and fail on the first element that does not fit.
///
/// Live recordings leave Segment and Cluster open with an unknown size; any
/// other element with an unknown size is malformed.
pub(crate) fn inspect(bytes: &[u8]) -> Result<(), DecodeError> {
    let mut pos = 0;
    while pos < bytes.len() {
        let (id, id_len) = element_id(bytes, pos)?;
        let (size, size_len, unknown) = vint(bytes, pos + id_len)?;
        let body = pos + id_len + size_len;
        let container = id == SEGMENT || id == CLUSTER;

        if unknown {
            if !container {
                return Err(DecodeError::malformed(
                    FORMAT,
                    format!("element {id:#x} at byte {pos} has an unknown size"),
                ));
            }
            pos = body;
            continue;
        }

        let end = usize::try_from(size).ok().and_then(|s| body.checked_add(s));
        match end {
            Some(end) if end <= bytes.len() => pos = if container { body } else { end },
            _ => {
                return Err(DecodeError::truncated(
                    FORMAT,
                    format!(
                        "element {id:#x} at byte {pos} needs {size} bytes, {} remain",
                        bytes.len().saturating_sub(body)
                    ),
                ))
            }
        }
    }
    Ok(())
}

fn demux_error(e: matroska_demuxer::DemuxError) -> DecodeError {
    DecodeError::malformed(FORMAT, e.to_string())
}

/// Pull the Opus header and packets out of the first audio track.
pub(crate) fn demux(bytes: &[u8], declared: &str) -> Result<OpusStream, DecodeError> {
    inspect(bytes)?;

    let mut file = MatroskaFile::open(Cursor::new(bytes)).map_err(demux_error)?;
    let (number, head) = {
        let track = file
            .tracks()
            .iter()
            .find(|t| t.track_type() == TrackType::Audio)
            .ok_or_else(|| DecodeError::malformed(FORMAT, "no audio track"))?;

        if track.codec_id() != "A_OPUS" {
            log::debug!("WebM audio track uses {}, not Opus", track.codec_id());
            return Err(DecodeError::Unrecognized {
                declared: declared.to_string(),
                format: Some(FORMAT),
            });
        }
        let private = track
            .codec_private()
            .ok_or_else(|| DecodeError::malformed(FORMAT, "Opus track has no CodecPrivate"))?;
        let head = OpusHead::parse(private, FORMAT)?;

        if let Some(audio) = track.audio() {
            let channels = audio.channels().get();
            if channels != head.channels as u64 {
                log::warn!("WebM track declares {channels} channels, OpusHead {}; using OpusHead", head.channels);
            }
        }
        (track.track_number().get(), head)
    };

    let mut frame = Frame::default();
    let mut packets = Vec::new();
    while file.next_frame(&mut frame).map_err(demux_error)? {
        if frame.track == number {
            packets.push(std::mem::take(&mut frame.data));
        }
    }
    if packets.is_empty() {
        return Err(DecodeError::truncated(FORMAT, "no audio blocks"));
    }

    log::debug!(
        "WebM Opus track {number}: {} ch, pre-skip {}, {} packets",
        head.channels,
        head.pre_skip,
        packets.len()
    );
    Ok(OpusStream {
        head,
        packets,
        end_granule: None,
    })
}
