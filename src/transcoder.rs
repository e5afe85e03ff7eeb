//! Audio extraction through the external `ffmpeg` program.
//!
//! Each call spawns one `ffmpeg` process under the watchdog in
//! [`process`](crate::process). Progress is scraped from its stderr: the
//! `Duration:` banner gives the total when no range was requested, and the
//! `time=` stats line gives the position.
//!
//! # Example
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use framesift::{
//!     AudioConfig, AudioFormat, ChunkProgress, NoOpProgress, OperationType, Transcoder,
//! };
//!
//! let transcoder = Transcoder::default();
//! transcoder.check_available()?;
//! let mut progress = ChunkProgress::new(
//!     Arc::new(NoOpProgress),
//!     OperationType::AudioExtraction,
//!     "clip",
//!     1,
//!     1,
//!     0,
//! );
//! transcoder.extract_audio(
//!     "input.mp4",
//!     Path::new("clip.flac"),
//!     None,
//!     AudioConfig::new(AudioFormat::Flac),
//!     &mut progress,
//! )?;
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use crate::{
    audio::AudioConfig,
    configuration::DEFAULT_TRANSCODE_TIMEOUT,
    error::SiftError,
    process::{ProcessOutput, run_watched},
    progress::ChunkProgress,
};

/// Output sample rate for every audio file.
pub const SAMPLE_RATE: u32 = 44_100;

/// Output channel count for every audio file.
pub const CHANNELS: u32 = 2;

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse `HH:MM:SS.ss` into a duration.
fn parse_clock(text: &str) -> Option<Duration> {
    let mut parts = text.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if !(seconds.is_finite() && seconds >= 0.0) {
        return None;
    }
    let millis = (seconds * 1000.0).round() as u64;
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_millis(millis))
}

/// Input duration from ffmpeg's `  Duration: 00:01:02.50, start: …` line.
pub fn parse_duration_line(line: &str) -> Option<Duration> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    parse_clock(rest.split(',').next()?)
}

/// Output position from an ffmpeg stats line (`… time=00:00:04.20 …`).
///
/// Returns `None` for `time=N/A`, which ffmpeg prints before the first
/// packet.
pub fn parse_progress_time(line: &str) -> Option<Duration> {
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;
    parse_clock(value)
}

/// Command-line arguments for extracting `range` (start, length) of
/// `input`'s audio into `output`.
pub fn audio_arguments(
    input: &str,
    output: &Path,
    range: Option<(Duration, Duration)>,
    audio: AudioConfig,
) -> Vec<OsString> {
    let mut arguments: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];
    if let Some((start, _)) = range {
        arguments.push("-ss".into());
        arguments.push(format!("{:.3}", start.as_secs_f64()).into());
    }
    arguments.push("-i".into());
    arguments.push(input.into());
    if let Some((_, length)) = range {
        arguments.push("-t".into());
        arguments.push(format!("{:.3}", length.as_secs_f64()).into());
    }
    arguments.push("-vn".into());
    arguments.push("-acodec".into());
    arguments.push(audio.format.codec_name().into());
    if !audio.format.is_lossless() {
        arguments.push("-ab".into());
        arguments.push(audio.bitrate.to_string().into());
    }
    arguments.push("-ar".into());
    arguments.push(SAMPLE_RATE.to_string().into());
    arguments.push("-ac".into());
    arguments.push(CHANNELS.to_string().into());
    arguments.push(output.as_os_str().to_owned());
    arguments
}

/// Contents of a concat-demuxer list naming `parts` in order.
///
/// The demuxer resolves relative entries against the list file's directory,
/// so every entry is written as an absolute path.
///
/// # Errors
///
/// Returns [`SiftError::Io`] if the working directory cannot be read.
pub fn concat_list(parts: &[PathBuf]) -> Result<String, SiftError> {
    let mut list = String::new();
    for part in parts {
        let absolute = std::path::absolute(part)?;
        let escaped = absolute.display().to_string().replace('\'', r"'\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    Ok(list)
}

/// Handle on the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    timeout: Duration,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }
}

impl Transcoder {
    /// Use a specific executable instead of `ffmpeg` from `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill any single invocation after this long.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `ffmpeg -version` and return its first line.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::ExternalToolMissing`] if the program cannot be
    /// run or exits unsuccessfully.
    pub fn check_available(&self) -> Result<String, SiftError> {
        let missing = |reason: String| SiftError::ExternalToolMissing {
            tool: self.program.display().to_string(),
            reason,
        };

        let mut command = Command::new(&self.program);
        command.arg("-version");
        let output = match run_watched("ffmpeg", &mut command, VERSION_TIMEOUT, |_| {}) {
            Ok(output) => output,
            Err(SiftError::Io(error)) => return Err(missing(error.to_string())),
            Err(SiftError::ProcessTimeout { timeout, .. }) => {
                return Err(missing(format!("`-version` hung for {timeout:?}")));
            }
            Err(error) => return Err(error),
        };
        if !output.status.success() {
            return Err(missing(format!("`-version` exited with {}", output.status)));
        }

        let version = output.stdout.lines().next().unwrap_or_default().to_string();
        log::debug!("Found {version}");
        Ok(version)
    }

    /// Extract audio from `input` into `output`.
    ///
    /// With `range = Some((start, length))` only that span is transcoded.
    /// Progress is reported in milliseconds of output.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Transcoder`] on a non-zero exit and
    /// [`SiftError::ProcessTimeout`] if the watchdog fires.
    pub fn extract_audio(
        &self,
        input: &str,
        output: &Path,
        range: Option<(Duration, Duration)>,
        audio: AudioConfig,
        progress: &mut ChunkProgress,
    ) -> Result<(), SiftError> {
        if let Some((_, length)) = range {
            progress.set_total(length.as_millis() as u64);
        }
        let mut command = Command::new(&self.program);
        command.args(audio_arguments(input, output, range, audio));

        let known_total = range.is_some();
        let result = run_watched("ffmpeg", &mut command, self.timeout, |line| {
            if !known_total {
                if let Some(duration) = parse_duration_line(line) {
                    progress.set_total(duration.as_millis() as u64);
                    return;
                }
            }
            if let Some(position) = parse_progress_time(line) {
                progress.update(position.as_millis() as u64);
            }
        })?;

        self.check_exit(result, output)?;
        progress.finish();
        log::debug!("Wrote {}", output.display());
        Ok(())
    }

    /// Concatenate `parts` losslessly into `output` with the concat demuxer.
    ///
    /// The parts are left in place; the temporary list file is removed.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Transcoder`] on a non-zero exit and
    /// [`SiftError::Io`] if the list file cannot be written.
    pub fn concat(&self, parts: &[PathBuf], output: &Path) -> Result<(), SiftError> {
        let mut list_name = output.as_os_str().to_owned();
        list_name.push(".parts.txt");
        let list_path = PathBuf::from(list_name);
        fs::write(&list_path, concat_list(parts)?)?;

        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output);
        let result = run_watched("ffmpeg", &mut command, self.timeout, |_| {});
        let _ = fs::remove_file(&list_path);

        self.check_exit(result?, output)
    }

    fn check_exit(&self, result: ProcessOutput, output: &Path) -> Result<(), SiftError> {
        if result.status.success() {
            return Ok(());
        }
        Err(SiftError::Transcoder {
            output: output.to_path_buf(),
            reason: format!("{}: {}", result.status, result.stderr_tail),
        })
    }
}
