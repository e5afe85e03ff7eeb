//! Job configuration.
//!
//! [`ExtractionConfig`] is an immutable-once-built value chosen once per run:
//! the sampling method and its parameters, the image output settings, chunk
//! sizing, worker caps, optional audio settings and the progress callback.
//! It is assembled with `with_*` builder methods, or loaded from a JSON job
//! file through [`JobFile`], which rejects unknown keys.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framesift::{AudioConfig, AudioFormat, ExtractionConfig, ImageFormat, SamplingMethod};
//!
//! let config = ExtractionConfig::new()
//!     .with_method(SamplingMethod::FixedInterval {
//!         interval: Duration::from_secs(5),
//!     })
//!     .with_image_format(ImageFormat::Png)
//!     .with_audio(AudioConfig::new(AudioFormat::Flac));
//! config.validate()?;
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;

use crate::{
    audio::{AudioBitrate, AudioConfig, AudioFormat},
    dispatch::ConcurrencyPolicy,
    error::SiftError,
    progress::{NoOpProgress, ProgressCallback},
};

/// Default chunk length: fifteen minutes of source time.
pub const DEFAULT_CHUNK_LENGTH: Duration = Duration::from_secs(15 * 60);

/// Default watchdog for one transcoder invocation.
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default number of sources processed at the same time.
pub const DEFAULT_SOURCE_WORKERS: usize = 2;

/// Intensity delta above which a pixel counts as changed.
pub const CHANGE_PIXEL_DELTA: u8 = 25;

/// Default minimum changed area, in pixels, for change detection.
pub const DEFAULT_MIN_AREA: u64 = 500;

/// How frames are selected from the decoded stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMethod {
    /// Keep frames at a target rate.
    FixedFps {
        /// Target frames per second.
        fps: f64,
    },
    /// Keep one frame every `interval` of stream time.
    FixedInterval {
        /// Minimum distance between two kept frames.
        interval: Duration,
    },
    /// Keep frames that differ visibly from their predecessor.
    ChangeDetection {
        /// Minimum changed fraction of the frame area, in `[0, 1]`.
        threshold: f64,
        /// Minimum changed area in pixels.
        min_area: u64,
    },
}

impl Default for SamplingMethod {
    fn default() -> Self {
        SamplingMethod::FixedFps { fps: 1.0 }
    }
}

impl SamplingMethod {
    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            SamplingMethod::FixedFps { .. } => "fps",
            SamplingMethod::FixedInterval { .. } => "interval",
            SamplingMethod::ChangeDetection { .. } => "change",
        }
    }

    /// Reject parameters no sampler can act on.
    pub fn validate(&self) -> Result<(), SiftError> {
        match *self {
            SamplingMethod::FixedFps { fps } if !(fps.is_finite() && fps > 0.0) => {
                Err(SiftError::InvalidParameter {
                    parameter: "fps",
                    reason: format!("must be a positive number, got {fps}"),
                })
            }
            SamplingMethod::FixedInterval { interval } if interval.is_zero() => {
                Err(SiftError::InvalidParameter {
                    parameter: "interval",
                    reason: "must be greater than zero".to_string(),
                })
            }
            SamplingMethod::ChangeDetection { threshold, .. }
                if !(0.0..=1.0).contains(&threshold) =>
            {
                Err(SiftError::InvalidParameter {
                    parameter: "change threshold",
                    reason: format!("must lie in [0, 1], got {threshold}"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Selector for [`SamplingMethod`] as named on the command line and in job
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Fixed frames per second.
    #[default]
    Fps,
    /// Fixed time interval.
    Interval,
    /// Change detection.
    Change,
}

impl FromStr for MethodKind {
    type Err = SiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fps" => Ok(MethodKind::Fps),
            "interval" | "time" => Ok(MethodKind::Interval),
            "change" | "scene" => Ok(MethodKind::Change),
            _ => Err(SiftError::UnsupportedParameter {
                parameter: "sampling method",
                value: value.to_string(),
            }),
        }
    }
}

impl MethodKind {
    /// Build the concrete method from the per-method parameters.
    pub fn into_method(
        self,
        fps: f64,
        interval_seconds: f64,
        change_threshold: f64,
        min_area: u64,
    ) -> Result<SamplingMethod, SiftError> {
        let method = match self {
            MethodKind::Fps => SamplingMethod::FixedFps { fps },
            MethodKind::Interval => SamplingMethod::FixedInterval {
                interval: positive_seconds("interval", interval_seconds)?,
            },
            MethodKind::Change => SamplingMethod::ChangeDetection {
                threshold: change_threshold,
                min_area,
            },
        };
        method.validate()?;
        Ok(method)
    }
}

/// Encoding for written frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// JPEG at quality 95. This is the default.
    #[default]
    Jpg,
    /// PNG at best compression.
    Png,
}

impl ImageFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = SiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpg),
            "png" => Ok(ImageFormat::Png),
            _ => Err(SiftError::UnsupportedParameter {
                parameter: "image format",
                value: value.to_string(),
            }),
        }
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = SiftError;

    /// Parses `WIDTHxHEIGHT`; `WIDTH*HEIGHT` is accepted as well.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unsupported = || SiftError::UnsupportedParameter {
            parameter: "resolution",
            value: value.to_string(),
        };
        let (width, height) = value
            .trim()
            .split_once(['x', 'X', '*'])
            .ok_or_else(unsupported)?;
        let width: u32 = width.trim().parse().map_err(|_| unsupported())?;
        let height: u32 = height.trim().parse().map_err(|_| unsupported())?;
        if width == 0 || height == 0 {
            return Err(unsupported());
        }
        Ok(Resolution { width, height })
    }
}

/// Configuration for one extraction run.
///
/// All fields have defaults: one frame per second as JPEG, source
/// resolution, fifteen-minute chunks, automatic worker count, threads, no
/// audio, no progress reporting.
#[derive(Clone)]
pub struct ExtractionConfig {
    pub(crate) method: SamplingMethod,
    pub(crate) image_format: ImageFormat,
    pub(crate) resolution: Option<Resolution>,
    pub(crate) chunk_length: Duration,
    pub(crate) max_workers: Option<usize>,
    pub(crate) source_workers: usize,
    pub(crate) concurrency: ConcurrencyPolicy,
    pub(crate) audio: Option<AudioConfig>,
    pub(crate) transcode_timeout: Duration,
    pub(crate) progress: Arc<dyn ProgressCallback>,
}

impl Debug for ExtractionConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractionConfig")
            .field("method", &self.method)
            .field("image_format", &self.image_format)
            .field("resolution", &self.resolution)
            .field("chunk_length", &self.chunk_length)
            .field("max_workers", &self.max_workers)
            .field("source_workers", &self.source_workers)
            .field("concurrency", &self.concurrency)
            .field("audio", &self.audio)
            .field("transcode_timeout", &self.transcode_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            method: SamplingMethod::default(),
            image_format: ImageFormat::default(),
            resolution: None,
            chunk_length: DEFAULT_CHUNK_LENGTH,
            max_workers: None,
            source_workers: DEFAULT_SOURCE_WORKERS,
            concurrency: ConcurrencyPolicy::Threads,
            audio: None,
            transcode_timeout: DEFAULT_TRANSCODE_TIMEOUT,
            progress: Arc::new(NoOpProgress),
        }
    }

    /// Set the sampling method.
    #[must_use]
    pub fn with_method(mut self, method: SamplingMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the frame image encoding.
    #[must_use]
    pub fn with_image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    /// Resize written frames to an exact size. `None` keeps the source size.
    #[must_use]
    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set how much source time one chunk covers.
    #[must_use]
    pub fn with_chunk_length(mut self, length: Duration) -> Self {
        self.chunk_length = length;
        self
    }

    /// Cap the number of concurrent chunk workers. Clamped to at least one.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers.max(1));
        self
    }

    /// Number of sources extracted concurrently. Each source still splits
    /// into chunks under its own worker cap. Clamped to at least one.
    #[must_use]
    pub fn with_source_workers(mut self, workers: usize) -> Self {
        self.source_workers = workers.max(1);
        self
    }

    /// Choose between a bounded thread pool and inline execution.
    #[must_use]
    pub fn with_concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy;
        self
    }

    /// Enable audio extraction.
    #[must_use]
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Set the watchdog for each transcoder invocation.
    #[must_use]
    pub fn with_transcode_timeout(mut self, timeout: Duration) -> Self {
        self.transcode_timeout = timeout;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// The sampling method.
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    /// The frame image encoding.
    pub fn image_format(&self) -> ImageFormat {
        self.image_format
    }

    /// The output resolution, if any.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// The chunk length.
    pub fn chunk_length(&self) -> Duration {
        self.chunk_length
    }

    /// Sources extracted concurrently.
    pub fn source_workers(&self) -> usize {
        self.source_workers
    }

    /// The audio settings, if audio extraction is enabled.
    pub fn audio(&self) -> Option<AudioConfig> {
        self.audio
    }

    /// Check every setting before any work starts.
    pub fn validate(&self) -> Result<(), SiftError> {
        self.method.validate()?;
        if self.chunk_length.is_zero() {
            return Err(SiftError::InvalidParameter {
                parameter: "chunk length",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(resolution) = self.resolution {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(SiftError::UnsupportedParameter {
                    parameter: "resolution",
                    value: resolution.to_string(),
                });
            }
        }
        if self.transcode_timeout.is_zero() {
            return Err(SiftError::InvalidParameter {
                parameter: "transcode timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Convert a user-supplied number of seconds, rejecting values that are not
/// positive or do not fit in a [`Duration`].
fn positive_seconds(parameter: &'static str, seconds: f64) -> Result<Duration, SiftError> {
    let invalid = || SiftError::InvalidParameter {
        parameter,
        reason: format!("must be a positive number of seconds, got {seconds}"),
    };
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(invalid()),
    }
}

fn default_fps() -> f64 {
    1.0
}

fn default_interval_seconds() -> f64 {
    1.0
}

fn default_change_threshold() -> f64 {
    0.1
}

fn default_min_area() -> u64 {
    DEFAULT_MIN_AREA
}

fn default_image_format() -> String {
    ImageFormat::default().to_string()
}

fn default_audio_format() -> String {
    AudioFormat::default().to_string()
}

fn default_audio_bitrate() -> String {
    AudioBitrate::default().to_string()
}

/// Frame section of a [`JobFile`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FramesSection {
    /// Sampling method. Default: `fps`.
    #[serde(default)]
    pub method: MethodKind,
    /// Target rate for `fps`. Default: 1.
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Interval for `interval`. Default: 1 second.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    /// Changed-area fraction for `change`. Default: 0.1.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    /// Minimum changed pixels for `change`. Default: 500.
    #[serde(default = "default_min_area")]
    pub min_area: u64,
    /// `jpg` or `png`. Default: `jpg`.
    #[serde(default = "default_image_format")]
    pub format: String,
    /// `WIDTHxHEIGHT`. Default: source size.
    #[serde(default)]
    pub resolution: Option<String>,
}

impl Default for FramesSection {
    fn default() -> Self {
        Self {
            method: MethodKind::default(),
            fps: default_fps(),
            interval_seconds: default_interval_seconds(),
            change_threshold: default_change_threshold(),
            min_area: default_min_area(),
            format: default_image_format(),
            resolution: None,
        }
    }
}

/// Audio section of a [`JobFile`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioSection {
    /// One of `mp3`, `wav`, `aac`, `m4a`, `flac`. Default: `mp3`.
    #[serde(default = "default_audio_format")]
    pub format: String,
    /// One of `64k`, `128k`, `192k`, `256k`, `320k`. Default: `192k`.
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            format: default_audio_format(),
            bitrate: default_audio_bitrate(),
        }
    }
}

/// A complete job described in JSON.
///
/// ```json
/// {
///   "input": "videos/",
///   "output": "out/",
///   "frames": { "method": "interval", "interval_seconds": 5, "format": "png" },
///   "audio": { "format": "flac" },
///   "chunk_minutes": 10
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    /// Input path, directory, list file or URL.
    #[serde(default)]
    pub input: Option<String>,
    /// Output root directory.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Frame sampling settings.
    #[serde(default)]
    pub frames: FramesSection,
    /// Audio settings; absent means no audio.
    #[serde(default)]
    pub audio: Option<AudioSection>,
    /// Chunk length in minutes. Default: 15.
    #[serde(default)]
    pub chunk_minutes: Option<f64>,
    /// Worker cap per source. Default: automatic.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Sources extracted concurrently. Default: 2.
    #[serde(default)]
    pub source_workers: Option<usize>,
    /// Transcoder watchdog in seconds. Default: 1800.
    #[serde(default)]
    pub transcode_timeout_seconds: Option<u64>,
}

impl JobFile {
    /// Read and parse a job file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SiftError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|reason| SiftError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse job file text. Unknown keys are an error.
    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|error| error.to_string())
    }

    /// Turn the file into a validated [`ExtractionConfig`].
    pub fn to_config(&self) -> Result<ExtractionConfig, SiftError> {
        let frames = &self.frames;
        let method = frames.method.into_method(
            frames.fps,
            frames.interval_seconds,
            frames.change_threshold,
            frames.min_area,
        )?;

        let resolution = frames
            .resolution
            .as_deref()
            .map(Resolution::from_str)
            .transpose()?;

        let mut config = ExtractionConfig::new()
            .with_method(method)
            .with_image_format(frames.format.parse()?)
            .with_resolution(resolution);

        if let Some(audio) = &self.audio {
            let audio =
                AudioConfig::new(audio.format.parse()?).with_bitrate(audio.bitrate.parse()?);
            config = config.with_audio(audio);
        }
        if let Some(minutes) = self.chunk_minutes {
            config = config.with_chunk_length(positive_seconds("chunk length", minutes * 60.0)?);
        }
        if let Some(workers) = self.workers {
            config = config.with_max_workers(workers);
        }
        if let Some(workers) = self.source_workers {
            config = config.with_source_workers(workers);
        }
        if let Some(seconds) = self.transcode_timeout_seconds {
            config = config.with_transcode_timeout(Duration::from_secs(seconds));
        }

        config.validate()?;
        Ok(config)
    }
}
