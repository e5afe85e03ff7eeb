//! Source metadata.
//!
//! Produced by [`probe`](crate::probe) and by
//! [`VideoDecoder::metadata`](crate::VideoDecoder::metadata). The job layer
//! uses it to plan chunks; the CLI prints it for the `probe` subcommand.

use std::time::Duration;

use serde::Serialize;

/// What the container reports about a source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMetadata {
    /// Path or URL the source was opened from.
    pub location: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub container: String,
    /// Total duration. Zero when the container does not record one.
    #[serde(serialize_with = "serialize_seconds")]
    pub duration: Duration,
    /// Best video stream, if present.
    pub video: Option<VideoMetadata>,
    /// Best audio stream, if present.
    pub audio: Option<AudioMetadata>,
}

/// Metadata for a video stream.
#[derive(Debug, Clone, Serialize)]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate (approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Frame count from the container, or estimated from duration × rate.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
}

/// Metadata for an audio stream.
#[derive(Debug, Clone, Serialize)]
pub struct AudioMetadata {
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Codec name (e.g. `"aac"`).
    pub codec: String,
    /// Bit rate in bits per second; zero when unknown.
    pub bit_rate: u64,
}

pub(crate) fn serialize_seconds<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
