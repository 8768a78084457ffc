//! Ogg Opus demuxing, as written by Firefox's MediaRecorder.

use std::io::Cursor;

use ogg::{OggReadError, PacketReader};

use crate::audio::opus::{OpusHead, OpusStream};
use crate::audio::sniff::ContainerFormat;
use crate::error::DecodeError;

const FORMAT: ContainerFormat = ContainerFormat::OggOpus;

fn ogg_error(e: OggReadError) -> DecodeError {
    match e {
        // read_exact inside a page body: the upload stopped mid-page
        OggReadError::ReadError(io) => DecodeError::truncated(FORMAT, io.to_string()),
        other => DecodeError::malformed(FORMAT, other.to_string()),
    }
}

/// Split an Ogg Opus file into its header and audio packets.
///
/// Only the first logical stream is read; packets of other serials are
/// skipped. A stream that never reaches its end-of-stream page is truncated.
pub(crate) fn demux(bytes: &[u8]) -> Result<OpusStream, DecodeError> {
    let mut reader = PacketReader::new(Cursor::new(bytes));

    let first = reader
        .read_packet()
        .map_err(ogg_error)?
        .ok_or_else(|| DecodeError::truncated(FORMAT, "no packets"))?;
    let serial = first.stream_serial();
    let head = OpusHead::parse(&first.data, FORMAT)?;

    let mut saw_tags = false;
    let mut packets = Vec::new();
    let mut end_granule = None;
    let mut ended = false;
    while let Some(packet) = reader.read_packet().map_err(ogg_error)? {
        if packet.stream_serial() != serial {
            continue;
        }
        if !saw_tags {
            if !packet.data.starts_with(b"OpusTags") {
                return Err(DecodeError::malformed(FORMAT, "second packet is not OpusTags"));
            }
            saw_tags = true;
            continue;
        }

        ended = packet.last_in_stream();
        if ended {
            // u64::MAX marks a page on which no packet ends
            end_granule = Some(packet.absgp_page()).filter(|&g| g != u64::MAX);
        }
        packets.push(packet.data);
        if ended {
            break;
        }
    }

    if !ended {
        return Err(DecodeError::truncated(
            FORMAT,
            format!("stream stops after {} audio packets without an end-of-stream page", packets.len()),
        ));
    }
    if packets.is_empty() {
        return Err(DecodeError::truncated(FORMAT, "no audio packets after the headers"));
    }

    log::debug!(
        "Ogg Opus stream {serial:#x}: {} ch, pre-skip {}, {} packets, end granule {:?}",
        head.channels,
        head.pre_skip,
        packets.len(),
        end_granule
    );
    Ok(OpusStream {
        head,
        packets,
        end_granule,
    })
}
