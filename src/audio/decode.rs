use std::io::{self, Cursor};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::sniff::{self, ContainerFormat};
use crate::audio::{ogg_opus, opus, riff, webm};
use crate::error::DecodeError;
use crate::types::DecodedAudio;

/// Decode an uploaded recording into planar f32 PCM.
///
/// The container is identified from the bytes themselves. `declared_type` is
/// only a hint: browsers report things like `audio/webm;codecs=opus` for
/// payloads that turn out to be something else, so a disagreement is logged
/// and otherwise ignored.
///
/// Samples are clamped to [-1.0, 1.0]; non-finite samples become 0.0.
pub fn decode(bytes: &[u8], declared_type: &str) -> Result<DecodedAudio, DecodeError> {
    decode_sniffed(bytes, declared_type).map(|(_, audio)| audio)
}

/// [`decode`], also returning the container the bytes were identified as.
pub(crate) fn decode_sniffed(bytes: &[u8], declared_type: &str) -> Result<(ContainerFormat, DecodedAudio), DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let declared = sniff::media_type_essence(declared_type);
    let Some(format) = sniff::sniff(bytes) else {
        log::debug!("No known signature in {} bytes (declared {declared:?})", bytes.len());
        return Err(DecodeError::Unrecognized { declared, format: None });
    };

    if let Some(claimed) = ContainerFormat::from_media_type(&declared) {
        if !claimed.agrees_with(format) {
            log::warn!("Declared {declared} but payload is {format}; decoding as {format}");
        }
    }

    let audio = match format {
        ContainerFormat::Wav => decode_wav(bytes)?,
        ContainerFormat::Flac => decode_flac(bytes)?,
        ContainerFormat::OggVorbis => decode_vorbis(bytes)?,
        ContainerFormat::OggOpus => opus::decode_stream(ogg_opus::demux(bytes)?, format, &declared)?,
        ContainerFormat::WebM => opus::decode_stream(webm::demux(bytes, &declared)?, format, &declared)?,
        ContainerFormat::Mp3 | ContainerFormat::Aac | ContainerFormat::Mp4 => {
            decode_symphonia(bytes, format, &declared)?
        }
        ContainerFormat::Ogg => {
            log::debug!("Ogg payload carries neither Vorbis nor Opus");
            return Err(DecodeError::Unrecognized {
                declared,
                format: Some(format),
            });
        }
    };

    log::debug!(
        "Decoded {format}: {} Hz, {} ch, {} frames ({:.3}s)",
        audio.sample_rate,
        audio.channel_count(),
        audio.frames(),
        audio.duration_secs
    );
    Ok((format, audio))
}

#[inline]
pub(crate) fn sanitize(s: f32) -> f32 {
    if s.is_finite() {
        s.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Scale for signed integer samples of `bits` width.
fn int_scale(bits: u32) -> f32 {
    1.0 / (1u64 << bits.clamp(1, 32).saturating_sub(1)) as f32
}

fn finish(
    format: ContainerFormat,
    sample_rate: u32,
    channel_count: usize,
    interleaved: &[f32],
) -> Result<DecodedAudio, DecodeError> {
    if sample_rate == 0 {
        return Err(DecodeError::malformed(format, "sample rate is zero"));
    }
    if channel_count == 0 {
        return Err(DecodeError::malformed(format, "stream has no channels"));
    }
    Ok(DecodedAudio::from_interleaved(sample_rate, channel_count, interleaved))
}

fn is_eof(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

// ---- WAV ----

fn wav_error(e: hound::Error) -> DecodeError {
    match e {
        hound::Error::IoError(io) if is_eof(&io) => DecodeError::truncated(ContainerFormat::Wav, io.to_string()),
        other => DecodeError::malformed(ContainerFormat::Wav, other.to_string()),
    }
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let layout = riff::inspect_wave(bytes)?;
    log::debug!("WAV data chunk: {} bytes at offset {}", layout.data_len, layout.data_offset);

    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(wav_error)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(sanitize))
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| sanitize(v as f32 * scale)))
                .collect::<Result<_, _>>()
                .map_err(wav_error)?
        }
    };

    finish(ContainerFormat::Wav, spec.sample_rate, spec.channels as usize, &interleaved)
}

// ---- FLAC ----

fn flac_error(e: claxon::Error) -> DecodeError {
    match e {
        claxon::Error::IoError(io) if is_eof(&io) => DecodeError::truncated(ContainerFormat::Flac, io.to_string()),
        other => DecodeError::malformed(ContainerFormat::Flac, other.to_string()),
    }
}

fn decode_flac(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let mut reader = claxon::FlacReader::new(Cursor::new(bytes)).map_err(flac_error)?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample);
    let channel_count = info.channels as usize;

    let mut interleaved = Vec::new();
    for sample in reader.samples() {
        let v = sample.map_err(flac_error)?;
        interleaved.push(sanitize(v as f32 * scale));
    }

    let frames = interleaved.len() / channel_count.max(1);
    if let Some(total) = info.samples {
        if (frames as u64) < total {
            return Err(DecodeError::truncated(
                ContainerFormat::Flac,
                format!("STREAMINFO declares {total} frames, decoded {frames}"),
            ));
        }
    }

    finish(ContainerFormat::Flac, info.sample_rate, channel_count, &interleaved)
}

// ---- Ogg Vorbis ----

fn vorbis_error(e: lewton::VorbisError) -> DecodeError {
    match e {
        // A page cut short surfaces as a read error from the Ogg layer.
        lewton::VorbisError::OggError(ogg::OggReadError::ReadError(io)) => {
            DecodeError::truncated(ContainerFormat::OggVorbis, io.to_string())
        }
        other => DecodeError::malformed(ContainerFormat::OggVorbis, other.to_string()),
    }
}

fn decode_vorbis(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    let mut reader = lewton::inside_ogg::OggStreamReader::new(Cursor::new(bytes)).map_err(vorbis_error)?;
    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channel_count = reader.ident_hdr.audio_channels as usize;
    if channel_count == 0 {
        return Err(DecodeError::malformed(ContainerFormat::OggVorbis, "stream has no channels"));
    }

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];
    while let Some(packet) = reader
        .read_dec_packet_generic::<Vec<Vec<f32>>>()
        .map_err(vorbis_error)?
    {
        for (dst, src) in channels.iter_mut().zip(packet) {
            dst.extend(src.into_iter().map(sanitize));
        }
    }

    if sample_rate == 0 {
        return Err(DecodeError::malformed(ContainerFormat::OggVorbis, "sample rate is zero"));
    }
    if channels[0].is_empty() {
        return Err(DecodeError::truncated(ContainerFormat::OggVorbis, "no audio packets after the headers"));
    }
    Ok(DecodedAudio::from_channels(sample_rate, channels))
}

// ---- MP3 / AAC / MP4 via symphonia ----

fn decode_symphonia(bytes: &[u8], format: ContainerFormat, declared: &str) -> Result<DecodedAudio, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());
    if !declared.is_empty() {
        hint.mime_type(declared);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| match e {
            SymphoniaError::IoError(io) if is_eof(&io) => DecodeError::truncated(format, io.to_string()),
            SymphoniaError::Unsupported(what) => {
                log::debug!("symphonia could not probe {format} payload: {what}");
                DecodeError::Unrecognized {
                    declared: declared.to_string(),
                    format: Some(format),
                }
            }
            other => DecodeError::malformed(format, other.to_string()),
        })?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::malformed(format, "no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let declared_channels = track.codec_params.channels.map(|c| c.count());
    let declared_frames = track.codec_params.n_frames;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => {
                log::debug!("{format} track uses an unsupported codec: {what}");
                DecodeError::Unrecognized {
                    declared: declared.to_string(),
                    format: Some(format),
                }
            }
            other => DecodeError::malformed(format, other.to_string()),
        })?;

    let mut channel_count: Option<usize> = None;
    let mut longest_packet = 0usize;
    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if is_eof(&e) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::malformed(format, e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = spec.channels.count();
                match channel_count {
                    None => {
                        if let Some(header) = declared_channels.filter(|&d| d != count) {
                            log::warn!("{format} track declares {header} channels but decodes to {count}; using {count}");
                        }
                        channel_count = Some(count);
                    }
                    Some(current) if current != count => {
                        return Err(DecodeError::malformed(
                            format,
                            format!("channel count changed from {current} to {count} mid-stream"),
                        ));
                    }
                    Some(_) => {}
                }
                sample_rate.get_or_insert(spec.rate);
                longest_packet = longest_packet.max(decoded.frames());
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend(buf.samples().iter().copied().map(sanitize));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt {format} packet: {e}");
            }
            Err(SymphoniaError::IoError(e)) if is_eof(&e) => break,
            Err(e) => return Err(DecodeError::malformed(format, e.to_string())),
        }
    }

    if interleaved.is_empty() {
        return Err(DecodeError::truncated(format, "no audio frames decoded"));
    }
    let channel_count = channel_count.unwrap_or(1);

    // Only MP4 records an exact length; MP3 and ADTS counts are estimates.
    if format == ContainerFormat::Mp4 {
        if let Some(expected) = declared_frames {
            let frames = (interleaved.len() / channel_count.max(1)) as u64;
            if frames + (longest_packet as u64) < expected {
                return Err(DecodeError::truncated(
                    format,
                    format!("track declares {expected} frames, decoded {frames}"),
                ));
            }
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| DecodeError::malformed(format, "unknown sample rate"))?;
    finish(format, sample_rate, channel_count, &interleaved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::{encode, BitDepth};

    fn hound_wav(spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode(&[], "audio/wav"), Err(DecodeError::Empty));
    }

    #[test]
    fn test_unknown_bytes_are_unrecognized() {
        let err = decode(b"definitely not audio", "audio/webm;codecs=opus").unwrap_err();
        assert_eq!(
            err,
            DecodeError::Unrecognized {
                declared: "audio/webm".into(),
                format: None
            }
        );
    }

    #[test]
    fn test_decode_own_encoder_output() {
        let pcm = [0i16, 16384, -16384, i16::MAX, i16::MIN];
        let wav = encode(&pcm, 16_000, 1, BitDepth::Sixteen);
        let audio = decode(&wav, "audio/wav").unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channel_count(), 1);
        assert_eq!(audio.frames(), 5);
        let expected = [0.0, 0.5, -0.5, 32767.0 / 32768.0, -1.0];
        for (got, want) in audio.channels[0].iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn test_mislabelled_wav_still_decodes() {
        let wav = encode(&[0; 160], 8_000, 1, BitDepth::Sixteen);
        let audio = decode(&wav, "audio/webm;codecs=opus").unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.frames(), 160);
    }

    #[test]
    fn test_stereo_float_wav() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let wav = hound_wav(spec, |w| {
            for i in 0..480 {
                w.write_sample(0.25f32).unwrap();
                w.write_sample(if i % 2 == 0 { 2.0f32 } else { f32::NAN }).unwrap();
            }
        });
        let audio = decode(&wav, "").unwrap();
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.frames(), 480);
        assert!((audio.duration_secs - 0.01).abs() < 1e-12);
        assert!(audio.channels[0].iter().all(|&s| s == 0.25));
        // out-of-range clamps, NaN becomes silence
        assert_eq!(audio.channels[1][0], 1.0);
        assert_eq!(audio.channels[1][1], 0.0);
    }

    #[test]
    fn test_24_bit_wav_scaling() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let wav = hound_wav(spec, |w| {
            w.write_sample(-8_388_608i32).unwrap();
            w.write_sample(4_194_304i32).unwrap();
        });
        let audio = decode(&wav, "audio/x-wav").unwrap();
        assert_eq!(audio.channels[0], vec![-1.0, 0.5]);
    }

    #[test]
    fn test_truncated_wav() {
        let mut wav = encode(&[100; 1000], 16_000, 1, BitDepth::Sixteen);
        wav.truncate(44 + 500);
        assert!(matches!(
            decode(&wav, "audio/wav"),
            Err(DecodeError::Truncated {
                format: ContainerFormat::Wav,
                ..
            })
        ));
    }

    #[test]
    fn test_header_only_wav_is_truncated() {
        let wav = encode(&[0; 10], 16_000, 1, BitDepth::Sixteen);
        assert!(matches!(decode(&wav[..30], "audio/wav"), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_zero_length_wav_decodes_empty() {
        let wav = encode(&[], 16_000, 1, BitDepth::Sixteen);
        let audio = decode(&wav, "audio/wav").unwrap();
        assert_eq!(audio.frames(), 0);
        assert_eq!(audio.duration_secs, 0.0);
    }

    #[test]
    fn test_bad_flac_is_an_error() {
        let result = decode(b"fLaC\x00\x00\x00", "audio/flac");
        assert!(matches!(
            result,
            Err(DecodeError::Truncated { .. }) | Err(DecodeError::Malformed { .. })
        ));
    }

    const FLAC: &[u8] = include_bytes!("../../testdata/mono44k.flac");
    const VORBIS: &[u8] = include_bytes!("../../testdata/silence22k.ogg");
    const MP3: &[u8] = include_bytes!("../../testdata/mono22k.mp3");
    const ADTS: &[u8] = include_bytes!("../../testdata/silence16k.aac");
    const M4A: &[u8] = include_bytes!("../../testdata/silence16k.m4a");

    fn assert_shape(audio: &DecodedAudio, rate: u32, channels: u32, frames: usize) {
        assert_eq!(audio.sample_rate, rate);
        assert_eq!(audio.channel_count(), channels);
        assert_eq!(audio.frames(), frames);
        assert!(audio.channels.iter().flatten().all(|s| (-1.0..=1.0).contains(s)));
    }

    fn is_truncated(result: Result<DecodedAudio, DecodeError>, format: ContainerFormat) -> bool {
        matches!(result, Err(DecodeError::Truncated { format: f, .. }) if f == format)
    }

    #[test]
    fn test_flac_fixture() {
        assert_shape(&decode(FLAC, "audio/flac").unwrap(), 44_100, 1, 100);
        assert!(is_truncated(decode(&FLAC[..FLAC.len() / 2], "audio/flac"), ContainerFormat::Flac));
    }

    #[test]
    fn test_vorbis_fixture() {
        let (format, audio) = decode_sniffed(VORBIS, "audio/ogg").unwrap();
        assert_eq!(format, ContainerFormat::OggVorbis);
        assert_shape(&audio, 22_050, 2, 5_120);

        assert!(is_truncated(decode(&VORBIS[..VORBIS.len() / 2], "audio/ogg"), ContainerFormat::OggVorbis));
        // identification, comment and setup headers end at byte 173
        assert!(is_truncated(decode(&VORBIS[..173], "audio/ogg"), ContainerFormat::OggVorbis));
    }

    #[test]
    fn test_vorbis_checksum_failure_is_malformed() {
        let mut bytes = VORBIS.to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode(&bytes, "audio/ogg"),
            Err(DecodeError::Malformed {
                format: ContainerFormat::OggVorbis,
                ..
            })
        ));
    }

    #[test]
    fn test_mp3_fixture() {
        assert_shape(&decode(MP3, "audio/mpeg").unwrap(), 22_050, 1, 25_920);
        // MP3 carries no exact length, so a cut file decodes what is there
        let half = decode(&MP3[..MP3.len() / 2], "audio/mpeg").unwrap();
        assert!(half.frames() > 0 && half.frames() < 25_920, "{} frames", half.frames());
    }

    #[test]
    fn test_adts_fixture() {
        assert_shape(&decode(ADTS, "audio/aac").unwrap(), 16_000, 1, 20_480);
        // ten whole 11-byte frames and part of a header
        assert_shape(&decode(&ADTS[..113], "audio/aac").unwrap(), 16_000, 1, 10_240);
    }

    #[test]
    fn test_m4a_fixture() {
        let (format, audio) = decode_sniffed(M4A, "audio/mp4").unwrap();
        assert_eq!(format, ContainerFormat::Mp4);
        assert_shape(&audio, 16_000, 1, 20_480);

        // moov cut short
        assert!(is_truncated(decode(&M4A[..M4A.len() / 2], "audio/mp4"), ContainerFormat::Mp4));
        // samples missing from the end of mdat
        assert!(is_truncated(decode(&M4A[..M4A.len() - 40], "audio/mp4"), ContainerFormat::Mp4));
    }

    #[test]
    fn test_int_scale() {
        assert_eq!(int_scale(16), 1.0 / 32768.0);
        assert_eq!(int_scale(8), 1.0 / 128.0);
        assert_eq!(int_scale(32), 1.0 / 2_147_483_648.0);
    }
}
