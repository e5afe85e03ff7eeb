//! Decoded frames and the decoder boundary.
//!
//! [`FrameSample`] is one decoded picture with its position in the source.
//! [`FrameSource`] is the seam between sampling logic and whatever produces
//! frames: the FFmpeg-backed [`VideoDecoder`](crate::VideoDecoder) in
//! production, in-memory sequences in tests.

use std::time::Duration;

use image::RgbImage;

use crate::error::SiftError;

/// A decoded frame.
///
/// Owned by the worker that decoded it; handed to the exporter and then
/// dropped.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Zero-based index of the frame in the source stream.
    pub index: u64,
    /// Presentation time reported by the decoder.
    pub timestamp: Duration,
    /// The picture, tightly packed RGB8.
    pub image: RgbImage,
}

/// A monotonically advancing cursor over decoded frames.
pub trait FrameSource {
    /// Average frame rate of the stream.
    fn frames_per_second(&self) -> f64;

    /// Number of frames in the stream, estimated where the container does
    /// not record it.
    fn frame_count(&self) -> u64;

    /// Position the cursor so the next [`read_frame`](FrameSource::read_frame)
    /// returns the first frame whose index is at least `index`.
    fn seek_to_frame(&mut self, index: u64) -> Result<(), SiftError>;

    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    fn read_frame(&mut self) -> Result<Option<FrameSample>, SiftError>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn frames_per_second(&self) -> f64 {
        (**self).frames_per_second()
    }

    fn frame_count(&self) -> u64 {
        (**self).frame_count()
    }

    fn seek_to_frame(&mut self, index: u64) -> Result<(), SiftError> {
        (**self).seek_to_frame(index)
    }

    fn read_frame(&mut self) -> Result<Option<FrameSample>, SiftError> {
        (**self).read_frame()
    }
}
