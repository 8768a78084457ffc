use serde::{Deserialize, Serialize};
use std::fmt;

/// Container (and for Ogg, codec) identified from leading bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Wav,
    Flac,
    OggVorbis,
    OggOpus,
    /// Ogg with a codec other than Vorbis or Opus.
    Ogg,
    Mp3,
    Aac,
    Mp4,
    WebM,
}

impl ContainerFormat {
    /// File extension used as a probe hint.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Wav => "wav",
            ContainerFormat::Flac => "flac",
            ContainerFormat::OggVorbis | ContainerFormat::OggOpus | ContainerFormat::Ogg => "ogg",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Aac => "aac",
            ContainerFormat::Mp4 => "m4a",
            ContainerFormat::WebM => "webm",
        }
    }

    /// Map a media-type essence (already lowercased, parameters stripped).
    pub fn from_media_type(essence: &str) -> Option<Self> {
        let format = match essence {
            "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => ContainerFormat::Wav,
            "audio/flac" | "audio/x-flac" => ContainerFormat::Flac,
            "audio/ogg" | "application/ogg" => ContainerFormat::Ogg,
            "audio/opus" => ContainerFormat::OggOpus,
            "audio/mpeg" | "audio/mp3" => ContainerFormat::Mp3,
            "audio/aac" | "audio/aacp" => ContainerFormat::Aac,
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "video/mp4" => ContainerFormat::Mp4,
            "audio/webm" | "video/webm" => ContainerFormat::WebM,
            _ => return None,
        };
        Some(format)
    }

    /// Whether a declared format agrees with a sniffed one. Any Ogg
    /// declaration agrees with any Ogg payload.
    pub fn agrees_with(self, other: ContainerFormat) -> bool {
        self == other || (self.is_ogg() && other.is_ogg())
    }

    fn is_ogg(self) -> bool {
        matches!(
            self,
            ContainerFormat::OggVorbis | ContainerFormat::OggOpus | ContainerFormat::Ogg
        )
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerFormat::Wav => "WAV",
            ContainerFormat::Flac => "FLAC",
            ContainerFormat::OggVorbis => "Ogg Vorbis",
            ContainerFormat::OggOpus => "Ogg Opus",
            ContainerFormat::Ogg => "Ogg",
            ContainerFormat::Mp3 => "MP3",
            ContainerFormat::Aac => "AAC",
            ContainerFormat::Mp4 => "MP4",
            ContainerFormat::WebM => "WebM",
        };
        f.write_str(name)
    }
}

/// Strip parameters and case from a declared media type:
/// `"Audio/WebM; codecs=opus"` becomes `"audio/webm"`.
pub fn media_type_essence(declared: &str) -> String {
    declared
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Identify the container from magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<ContainerFormat> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(ContainerFormat::Wav);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(ContainerFormat::Flac);
    }
    if bytes.starts_with(b"OggS") {
        return Some(ogg_codec(bytes));
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(ContainerFormat::WebM);
    }
    if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        return Some(ContainerFormat::Mp4);
    }
    if bytes.starts_with(b"ID3") {
        return Some(ContainerFormat::Mp3);
    }
    if bytes.len() >= 2 && bytes[0] == 0xFF {
        let b1 = bytes[1];
        // ADTS: 12-bit sync, layer bits 00
        if b1 & 0xF6 == 0xF0 {
            return Some(ContainerFormat::Aac);
        }
        // MPEG audio: 11-bit sync, layer bits non-zero
        if b1 & 0xE0 == 0xE0 && (b1 >> 1) & 0x03 != 0 {
            return Some(ContainerFormat::Mp3);
        }
    }
    None
}

/// Look at the first packet of the first Ogg page.
fn ogg_codec(bytes: &[u8]) -> ContainerFormat {
    let segments = bytes.get(26).copied().unwrap_or(0) as usize;
    let packet = bytes.get(27 + segments..).unwrap_or(&[]);
    if packet.starts_with(b"\x01vorbis") {
        ContainerFormat::OggVorbis
    } else if packet.starts_with(b"OpusHead") {
        ContainerFormat::OggOpus
    } else {
        ContainerFormat::Ogg
    }
}
