//! FFmpeg-backed video decoding.
//!
//! [`VideoDecoder`] opens one source (local path or direct stream URL),
//! selects its best video stream and yields RGB8 [`FrameSample`]s through
//! the [`FrameSource`] trait. Each worker opens its own decoder; nothing
//! here is shared between threads.
//!
//! [`probe`] reads only the container header and is what the job layer and
//! the `probe` subcommand use to plan work.
//!
//! # Example
//!
//! ```no_run
//! use framesift::{FrameSource, VideoDecoder};
//!
//! let mut decoder = VideoDecoder::open("input.mp4")?;
//! decoder.seek_to_frame(300)?;
//! if let Some(frame) = decoder.read_frame()? {
//!     frame.image.save("frame_300.png")?;
//! }
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::Path,
    time::Duration,
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as FfmpegVideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::{
    conversion::{
        frame_index_to_seek_timestamp, frame_to_buffer, pts_to_frame_index, pts_to_seconds,
        rate_to_fps, seconds_to_duration,
    },
    error::SiftError,
    frame::{FrameSample, FrameSource},
    metadata::{AudioMetadata, SourceMetadata, VideoMetadata},
};

/// Consecutive unreadable packets tolerated before decoding gives up.
const MAX_READ_ERRORS: u32 = 64;

/// Read container and stream metadata without decoding anything.
///
/// # Errors
///
/// Returns [`SiftError::StreamOpen`] if FFmpeg cannot open or parse the
/// source.
pub fn probe<P: AsRef<Path>>(location: P) -> Result<SourceMetadata, SiftError> {
    let location = location.as_ref();
    let input = open_input(location)?;
    read_metadata(&input, &location.display().to_string())
}

fn open_input(location: &Path) -> Result<Input, SiftError> {
    log::debug!("Opening media source: {}", location.display());

    ffmpeg_next::init().map_err(|error| SiftError::StreamOpen {
        location: location.display().to_string(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })?;

    ffmpeg_next::format::input(&location).map_err(|error| SiftError::StreamOpen {
        location: location.display().to_string(),
        reason: error.to_string(),
    })
}

fn read_metadata(input: &Input, location: &str) -> Result<SourceMetadata, SiftError> {
    let open_error = |reason: String| SiftError::StreamOpen {
        location: location.to_string(),
        reason,
    };

    let container_micros = input.duration();
    let mut duration = if container_micros > 0 {
        Duration::from_micros(container_micros as u64)
    } else {
        Duration::ZERO
    };

    let video = match input.streams().best(Type::Video) {
        Some(stream) => {
            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| open_error(format!("video decoder: {error}")))?;

            let frames_per_second = rate_to_fps(stream.avg_frame_rate())
                .or_else(|| rate_to_fps(stream.rate()))
                .unwrap_or(0.0);

            if duration.is_zero() && stream.duration() > 0 {
                duration =
                    seconds_to_duration(pts_to_seconds(stream.duration(), stream.time_base()));
            }

            let frame_count = if stream.frames() > 0 {
                stream.frames() as u64
            } else {
                (duration.as_secs_f64() * frames_per_second) as u64
            };

            Some(VideoMetadata {
                width: decoder.width(),
                height: decoder.height(),
                frames_per_second,
                frame_count,
                codec: decoder
                    .codec()
                    .map(|codec| codec.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        }
        None => None,
    };

    let audio = match input.streams().best(Type::Audio) {
        Some(stream) => {
            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().audio())
                .map_err(|error| open_error(format!("audio decoder: {error}")))?;
            Some(AudioMetadata {
                sample_rate: decoder.rate(),
                channels: decoder.channels(),
                codec: decoder
                    .codec()
                    .map(|codec| codec.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                bit_rate: decoder.bit_rate() as u64,
            })
        }
        None => None,
    };

    Ok(SourceMetadata {
        location: location.to_string(),
        container: input.format().name().to_string(),
        duration,
        video,
        audio,
    })
}

/// Decodes the best video stream of one source into RGB8 frames.
pub struct VideoDecoder {
    input: Input,
    decoder: FfmpegVideoDecoder,
    scaler: Option<((Pixel, u32, u32), ScalingContext)>,
    metadata: SourceMetadata,
    stream_index: usize,
    time_base: Rational,
    frames_per_second: f64,
    frame_count: u64,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    skip_until: u64,
    last_index: Option<u64>,
    eof_sent: bool,
}

impl VideoDecoder {
    /// Open a source and prepare to decode its best video stream.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::StreamOpen`] if the source cannot be opened and
    /// [`SiftError::NoVideoStream`] if it has no video.
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self, SiftError> {
        let location = location.as_ref();
        let label = location.display().to_string();
        let input = open_input(location)?;
        let metadata = read_metadata(&input, &label)?;

        let video = metadata
            .video
            .clone()
            .ok_or_else(|| SiftError::NoVideoStream(label.clone()))?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| SiftError::NoVideoStream(label.clone()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        if video.frames_per_second <= 0.0 {
            return Err(SiftError::StreamOpen {
                location: label,
                reason: "video stream reports no frame rate".to_string(),
            });
        }

        log::debug!(
            "{label}: {}x{} {} at {:.3} fps, ~{} frames",
            video.width,
            video.height,
            video.codec,
            video.frames_per_second,
            video.frame_count
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            time_base,
            frames_per_second: video.frames_per_second,
            frame_count: video.frame_count,
            metadata,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            skip_until: 0,
            last_index: None,
            eof_sent: false,
        })
    }

    /// Metadata read when the source was opened.
    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn current_index(&self) -> u64 {
        let timestamp = self.decoded_frame.timestamp().or(self.decoded_frame.pts());
        let next = self.last_index.map_or(0, |last| last + 1);
        match timestamp {
            Some(pts) => {
                pts_to_frame_index(pts, self.time_base, self.frames_per_second).max(next)
            }
            None => next,
        }
    }

    fn convert_current_frame(&mut self, index: u64) -> Result<FrameSample, SiftError> {
        let key = (
            self.decoded_frame.format(),
            self.decoded_frame.width(),
            self.decoded_frame.height(),
        );
        let (_, width, height) = key;

        let scaler = match &mut self.scaler {
            Some((current, scaler)) if *current == key => scaler,
            slot => {
                let scaler = ScalingContext::get(
                    key.0,
                    width,
                    height,
                    Pixel::RGB24,
                    width,
                    height,
                    ScalingFlags::BILINEAR,
                )?;
                &mut slot.insert((key, scaler)).1
            }
        };
        scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;

        let buffer = frame_to_buffer(&self.rgb_frame, width, height, 3);
        let image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            SiftError::VideoDecode("decoded frame buffer has the wrong size".to_string())
        })?;

        let timestamp = match self.decoded_frame.timestamp().or(self.decoded_frame.pts()) {
            Some(pts) => seconds_to_duration(pts_to_seconds(pts, self.time_base)),
            None => seconds_to_duration(index as f64 / self.frames_per_second),
        };

        Ok(FrameSample {
            index,
            timestamp,
            image,
        })
    }
}

impl FrameSource for VideoDecoder {
    fn frames_per_second(&self) -> f64 {
        self.frames_per_second
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek_to_frame(&mut self, index: u64) -> Result<(), SiftError> {
        if index == 0 && self.last_index.is_none() {
            return Ok(());
        }
        let target = frame_index_to_seek_timestamp(index, self.frames_per_second);
        self.input.seek(target, ..target)?;
        self.decoder.flush();
        self.skip_until = index;
        self.last_index = None;
        self.eof_sent = false;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<FrameSample>, SiftError> {
        let mut read_errors = 0;
        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let index = self.current_index();
                self.last_index = Some(index);
                if index < self.skip_until {
                    continue;
                }
                return self.convert_current_frame(index).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    if read_errors >= MAX_READ_ERRORS {
                        return Err(SiftError::VideoDecode(format!(
                            "{read_errors} consecutive unreadable packets, last: {error}"
                        )));
                    }
                }
            }
        }
    }
}

impl Debug for VideoDecoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoDecoder")
            .field("location", &self.metadata.location)
            .field("frames_per_second", &self.frames_per_second)
            .field("frame_count", &self.frame_count)
            .field("last_index", &self.last_index)
            .finish_non_exhaustive()
    }
}
