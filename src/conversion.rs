//! Pixel and timestamp conversions between FFmpeg and the rest of the crate.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy plane 0 of a packed video frame into a tightly packed buffer,
/// dropping any row padding FFmpeg added.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        return data[..row_length * (height as usize)].to_vec();
    }

    let mut buffer = Vec::with_capacity(row_length * (height as usize));
    for row in 0..(height as usize) {
        let row_start = row * stride;
        buffer.extend_from_slice(&data[row_start..row_start + row_length]);
    }
    buffer
}

/// Frames per second from a stream rate, or `None` when the rate is unset.
pub(crate) fn rate_to_fps(rate: Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    Some(f64::from(rate.numerator()) / f64::from(rate.denominator()))
}

/// Rescale a PTS value from the stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Frame index nearest to a PTS value. Negative timestamps map to zero.
pub(crate) fn pts_to_frame_index(pts: i64, time_base: Rational, frames_per_second: f64) -> u64 {
    let index = (pts_to_seconds(pts, time_base) * frames_per_second).round();
    if index > 0.0 { index as u64 } else { 0 }
}

/// Non-negative seconds as a [`Duration`], saturating at [`Duration::MAX`].
pub(crate) fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Seek target for a frame index, in `AV_TIME_BASE` units (microseconds).
///
/// Container-level seeks (`stream_index = -1`) take this unit regardless of
/// the stream time base.
pub(crate) fn frame_index_to_seek_timestamp(index: u64, frames_per_second: f64) -> i64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (index as f64 / frames_per_second * 1_000_000.0) as i64
}
