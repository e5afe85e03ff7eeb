//! Audio output settings.
//!
//! This module defines [`AudioFormat`] and [`AudioBitrate`], the closed sets
//! of encodings the external transcoder is asked to produce, and
//! [`AudioConfig`] which bundles them. The transcoding itself lives in
//! [`transcoder`](crate::transcoder).

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::SiftError;

/// Audio output format.
///
/// Determines the file extension and the codec the transcoder encodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioFormat {
    /// MP3 via libmp3lame. This is the default.
    #[default]
    Mp3,
    /// WAV (PCM signed 16-bit little-endian).
    Wav,
    /// Raw AAC in an ADTS stream.
    Aac,
    /// AAC in an MPEG-4 audio container.
    M4a,
    /// FLAC (lossless).
    Flac,
}

impl AudioFormat {
    /// Every supported format, in the order they are listed to users.
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Aac,
        AudioFormat::M4a,
        AudioFormat::Flac,
    ];

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
        }
    }

    /// Encoder name passed to the transcoder's `-acodec`.
    pub fn codec_name(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Aac | AudioFormat::M4a => "aac",
            AudioFormat::Flac => "flac",
        }
    }

    /// Lossless formats ignore the bitrate setting.
    pub fn is_lossless(self) -> bool {
        matches!(self, AudioFormat::Wav | AudioFormat::Flac)
    }
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = SiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().trim_start_matches('.').to_ascii_lowercase();
        AudioFormat::ALL
            .into_iter()
            .find(|format| format.extension() == wanted)
            .ok_or_else(|| SiftError::UnsupportedParameter {
                parameter: "audio format",
                value: value.to_string(),
            })
    }
}

/// Target bitrate for lossy audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AudioBitrate {
    /// 64 kbit/s.
    K64,
    /// 128 kbit/s.
    K128,
    /// 192 kbit/s. This is the default.
    #[default]
    K192,
    /// 256 kbit/s.
    K256,
    /// 320 kbit/s.
    K320,
}

impl AudioBitrate {
    /// Every supported bitrate, lowest first.
    pub const ALL: [AudioBitrate; 5] = [
        AudioBitrate::K64,
        AudioBitrate::K128,
        AudioBitrate::K192,
        AudioBitrate::K256,
        AudioBitrate::K320,
    ];

    /// Kilobits per second.
    pub fn kbps(self) -> u32 {
        match self {
            AudioBitrate::K64 => 64,
            AudioBitrate::K128 => 128,
            AudioBitrate::K192 => 192,
            AudioBitrate::K256 => 256,
            AudioBitrate::K320 => 320,
        }
    }
}

impl Display for AudioBitrate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}k", self.kbps())
    }
}

impl FromStr for AudioBitrate {
    type Err = SiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().to_ascii_lowercase();
        let digits = trimmed.strip_suffix('k').unwrap_or(&trimmed);
        let unsupported = || SiftError::UnsupportedParameter {
            parameter: "audio bitrate",
            value: value.to_string(),
        };
        let kbps: u32 = digits.parse().map_err(|_| unsupported())?;
        AudioBitrate::ALL
            .into_iter()
            .find(|bitrate| bitrate.kbps() == kbps)
            .ok_or_else(unsupported)
    }
}

/// Audio extraction settings for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioConfig {
    /// Output encoding.
    pub format: AudioFormat,
    /// Bitrate for lossy formats.
    pub bitrate: AudioBitrate,
}

impl AudioConfig {
    /// Create a config for the given format at the default bitrate.
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            bitrate: AudioBitrate::default(),
        }
    }

    /// Set the bitrate.
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: AudioBitrate) -> Self {
        self.bitrate = bitrate;
        self
    }
}
