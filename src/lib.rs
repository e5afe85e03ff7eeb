//! # framesift
//!
//! Sample still frames, and optionally the audio track, out of videos.
//!
//! Given a video file, a directory of videos, a list file or a URL,
//! `framesift` decodes each source with FFmpeg (via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next)), decides frame by
//! frame which frames to keep, and writes the kept frames as JPEG or PNG.
//! Long sources are split into chunks that are decoded in parallel.
//!
//! ## Quick Start
//!
//! ### Keep one frame every five seconds
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framesift::{ExtractionConfig, Extractor, SamplingMethod, resolve_input};
//!
//! let config = ExtractionConfig::new().with_method(SamplingMethod::FixedInterval {
//!     interval: Duration::from_secs(5),
//! });
//! let extractor = Extractor::new("out", config);
//! extractor.preflight()?;
//! let summary = extractor.run(&resolve_input("lecture.mp4")?);
//! println!("{} frames", summary.frames_written());
//! # Ok::<(), framesift::SiftError>(())
//! ```
//!
//! ### Keep frames where the picture changes
//!
//! ```no_run
//! use framesift::{FrameSampler, SampledFrames, SamplingMethod, VideoDecoder};
//!
//! let mut decoder = VideoDecoder::open("slides.mp4")?;
//! let method = SamplingMethod::ChangeDetection { threshold: 0.05, min_area: 500 };
//! let sampler = FrameSampler::new(method, 0.0, 0);
//! for (frame, output_index) in SampledFrames::new(&mut decoder, sampler) {
//!     frame.image.save(format!("slide_{output_index:03}.png"))?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Extract audio alongside frames
//!
//! ```no_run
//! use framesift::{
//!     AudioBitrate, AudioConfig, AudioFormat, ExtractionConfig, Extractor, resolve_input,
//! };
//!
//! let config = ExtractionConfig::new()
//!     .with_audio(AudioConfig::new(AudioFormat::Mp3).with_bitrate(AudioBitrate::K320));
//! let extractor = Extractor::new("out", config);
//! extractor.preflight()?;
//! extractor.run(&resolve_input("videos/")?);
//! # Ok::<(), framesift::SiftError>(())
//! ```
//!
//! ## Features
//!
//! - **Three sampling policies**: fixed output rate, fixed time interval,
//!   and change detection (thresholded frame difference, dilated, summed
//!   over connected regions)
//! - **Chunked parallel decoding**: each chunk opens its own decoder; a
//!   failing chunk is reported without stopping the others
//! - **Inputs**: files, recursive directories, `.txt`/`.csv` lists, and page
//!   URLs resolved with `yt-dlp`
//! - **Audio**: MP3, WAV, AAC, M4A or FLAC through the `ffmpeg` program,
//!   chunked and concatenated, every process under a watchdog timeout
//! - **Per-chunk progress** through [`ProgressCallback`]
//!
//! ## Output layout
//!
//! ```text
//! <output>/<source>/frames/frame_000000.jpg
//! <output>/<source>/audio/<source>.mp3
//! ```
//!
//! Frame file names carry the frame's index in the source, zero-padded to six
//! digits, so they are identical across re-runs and sort in timeline order
//! up to frame 999 999.
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build. The `ffmpeg`
//! program is needed for audio and `yt-dlp` for page URLs.

pub mod audio;
pub mod chunking;
pub mod configuration;
mod conversion;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod frame;
pub mod job;
pub mod logging;
pub mod metadata;
mod process;
pub mod progress;
pub mod sampler;
pub mod source;
pub mod transcoder;

pub use audio::{AudioBitrate, AudioConfig, AudioFormat};
pub use chunking::{ChunkRange, TimeRange};
pub use configuration::{
    ExtractionConfig, ImageFormat, JobFile, MethodKind, Resolution, SamplingMethod,
};
pub use decoder::{VideoDecoder, probe};
pub use dispatch::{
    ChunkOutcome, ConcurrencyPolicy, DispatchCoordinator, JobContext, JobPhase, JobResult,
    WorkerPool,
};
pub use error::SiftError;
pub use export::FrameWriter;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{FrameSample, FrameSource};
pub use job::{Extractor, FailedSource, FrameChunkReport, RunSummary, SourceReport};
pub use metadata::{AudioMetadata, SourceMetadata, VideoMetadata};
pub use progress::{ChunkProgress, NoOpProgress, OperationType, ProgressCallback, ProgressInfo};
pub use sampler::{ChangeMeasurement, FrameSampler, SampledFrames, SamplingState};
pub use source::{MediaSource, UrlResolver, YtDlpResolver, resolve_input};
pub use transcoder::Transcoder;
