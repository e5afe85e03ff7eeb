//! Error types for the `framesift` crate.
//!
//! This module defines [`SiftError`], the unified error type returned by all
//! fallible operations in the crate. Variants are grouped by how far they
//! propagate: input and tooling errors abort a run before any work starts,
//! everything else is local to one source or one chunk and ends up in a
//! [`JobResult`](crate::JobResult) instead of unwinding the whole run.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `framesift` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SiftError {
    /// The input location is unreachable or of an unrecognised kind.
    #[error("Invalid input {input}: {reason}")]
    InvalidInput {
        /// The input as given by the user.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The input resolved to zero usable media sources.
    #[error("No valid input sources found in {0}")]
    NoSources(String),

    /// A required external program is not installed or not runnable.
    #[error("Required tool `{tool}` is not available: {reason}")]
    ExternalToolMissing {
        /// Program name, e.g. `ffmpeg`.
        tool: String,
        /// Underlying reason the probe failed.
        reason: String,
    },

    /// The decoder or transcoder refused to open a source.
    #[error("Failed to open media stream at {location}: {reason}")]
    StreamOpen {
        /// Path or URL that was opened.
        location: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// A parameter value outside the supported set.
    #[error("Unsupported {parameter}: {value}")]
    UnsupportedParameter {
        /// The parameter name (e.g. `audio format`).
        parameter: &'static str,
        /// The offending value.
        value: String,
    },

    /// A numeric parameter failed validation.
    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        /// The parameter name.
        parameter: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// One chunk of a job failed. Carries the chunk position and the
    /// rendered cause so the report outlives the original error.
    #[error("Chunk {index}/{total} failed: {message}")]
    ChunkFailure {
        /// One-based chunk index.
        index: usize,
        /// Number of chunks in the job.
        total: usize,
        /// Rendered cause (error text or panic payload).
        message: String,
    },

    /// The logger could not be installed.
    #[error("Failed to set up logging: {0}")]
    Logging(String),

    /// The worker pool could not be started.
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),

    /// The source has no video stream.
    #[error("No video stream found in {0}")]
    NoVideoStream(String),

    /// A video frame could not be decoded or converted.
    #[error("Failed to decode video frame: {0}")]
    VideoDecode(String),

    /// The external transcoder exited unsuccessfully.
    #[error("Transcoder failed for {output}: {reason}")]
    Transcoder {
        /// File the transcoder was writing.
        output: PathBuf,
        /// Exit status and the tail of its stderr.
        reason: String,
    },

    /// An external process exceeded its watchdog timeout and was killed.
    #[error("`{tool}` did not finish within {timeout:?} and was killed")]
    ProcessTimeout {
        /// Program name.
        tool: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// A remote page URL could not be resolved to a media stream.
    #[error("Failed to resolve {url}: {reason}")]
    Resolve {
        /// The page URL.
        url: String,
        /// Underlying reason.
        reason: String,
    },

    /// A job file could not be parsed.
    #[error("Invalid job file {path}: {reason}")]
    Config {
        /// Path of the job file.
        path: PathBuf,
        /// Parser message, naming the unknown key where applicable.
        reason: String,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// A JSON document could not be produced or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error from the `image` crate while encoding a frame.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for SiftError {
    fn from(error: FfmpegError) -> Self {
        SiftError::Ffmpeg(error.to_string())
    }
}

impl SiftError {
    /// Returns `true` for errors that must stop a run before dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SiftError::InvalidInput { .. }
                | SiftError::NoSources(_)
                | SiftError::ExternalToolMissing { .. }
                | SiftError::Config { .. }
        )
    }
}
