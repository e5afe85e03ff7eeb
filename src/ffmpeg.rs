//! FFmpeg log level configuration.
//!
//! FFmpeg prints its own diagnostics to stderr, separately from the `log`
//! records this crate emits. The CLI lowers it to [`FfmpegLogLevel::Error`]
//! so decoder chatter does not tear through progress bars.
//!
//! # Example
//!
//! ```no_run
//! use framesift::FfmpegLogLevel;
//!
//! framesift::set_ffmpeg_log_level(FfmpegLogLevel::Quiet);
//! ```

use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::SiftError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only conditions that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    #[default]
    Error,
    /// Warnings (FFmpeg's own default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = SiftError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            _ => Err(SiftError::UnsupportedParameter {
                parameter: "ffmpeg log level",
                value: value.to_string(),
            }),
        }
    }
}

/// Set FFmpeg's internal log verbosity. Does not affect `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("warn".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Warning);
        assert_eq!("QUIET".parse::<FfmpegLogLevel>().unwrap(), FfmpegLogLevel::Quiet);
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }
}
