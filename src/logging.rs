//! Logger setup for the command-line tool.
//!
//! Records go to stderr and, optionally, to a log file, each with its own
//! level. Library code only ever talks to the `log` facade; this module is
//! the one place a backend is chosen.

use std::{path::Path, time::SystemTime};

use log::LevelFilter;

use crate::error::SiftError;

/// Levels for the two log sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    /// Level written to stderr.
    pub stderr: LevelFilter,
    /// Level written to the log file.
    pub file: LevelFilter,
}

impl LogLevels {
    /// `warn` on stderr and `info` in the file, or `info` and `debug` when
    /// verbose.
    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self {
                stderr: LevelFilter::Info,
                file: LevelFilter::Debug,
            }
        } else {
            Self {
                stderr: LevelFilter::Warn,
                file: LevelFilter::Info,
            }
        }
    }
}

fn format_line(
    out: fern::FormatCallback,
    message: &std::fmt::Arguments,
    record: &log::Record,
) {
    out.finish(format_args!(
        "{} {:<5} {}: {}",
        humantime::format_rfc3339_seconds(SystemTime::now()),
        record.level(),
        record.target(),
        message
    ))
}

/// Install the global logger. May only succeed once per process.
///
/// # Errors
///
/// Returns [`SiftError::Io`] if the log file cannot be opened and
/// [`SiftError::Logging`] if a logger is already installed.
pub fn init_logger(levels: LogLevels, log_file: Option<&Path>) -> Result<(), SiftError> {
    let mut dispatch = fern::Dispatch::new()
        .level(levels.stderr.max(levels.file))
        .chain(
            fern::Dispatch::new()
                .level(levels.stderr)
                .format(format_line)
                .chain(std::io::stderr()),
        );

    if let Some(path) = log_file {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(levels.file)
                .format(format_line)
                .chain(fern::log_file(path)?),
        );
    }

    dispatch
        .apply()
        .map_err(|error| SiftError::Logging(error.to_string()))?;

    if let Some(path) = log_file {
        log::debug!("Logging to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_both_sinks() {
        let quiet = LogLevels::for_verbosity(false);
        let verbose = LogLevels::for_verbosity(true);
        assert!(verbose.stderr > quiet.stderr);
        assert!(verbose.file > quiet.file);
        assert!(quiet.file > quiet.stderr);
    }
}
