//! Running external programs under a watchdog.
//!
//! Both the transcoder and the URL resolver shell out. Their stderr is
//! streamed line by line (FFmpeg ends progress lines with `\r`, so both
//! `\r` and `\n` terminate a line) while the parent polls for exit and
//! kills the child once the timeout elapses.

use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, ErrorKind, Read},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::error::SiftError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 20;

/// What a finished process left behind.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    /// Last few stderr lines, newline-joined.
    pub stderr_tail: String,
}

/// Spawn `command`, feed each stderr line to `on_stderr_line` and wait at
/// most `timeout` for it to exit.
pub(crate) fn run_watched<F>(
    tool: &str,
    command: &mut Command,
    timeout: Duration,
    mut on_stderr_line: F,
) -> Result<ProcessOutput, SiftError>
where
    F: FnMut(&str) + Send,
{
    log::debug!("Running {command:?}");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| match error.kind() {
            ErrorKind::NotFound => SiftError::ExternalToolMissing {
                tool: tool.to_string(),
                reason: error.to_string(),
            },
            _ => SiftError::Io(error),
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| -> Result<ProcessOutput, SiftError> {
        let stdout_reader = scope.spawn(move || {
            let mut text = String::new();
            if let Some(mut pipe) = stdout {
                let _ = pipe.read_to_string(&mut text);
            }
            text
        });

        let stderr_reader = scope.spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(pipe) = stderr {
                let _ = for_each_line(pipe, |line| {
                    on_stderr_line(line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                });
            }
            Vec::from(tail).join("\n")
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                log::warn!("{tool} exceeded {timeout:?}; killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(SiftError::ProcessTimeout {
                    tool: tool.to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(ProcessOutput {
            status,
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr_tail: stderr_reader.join().unwrap_or_default(),
        })
    })
}

/// Split a byte stream on `\n` or `\r`, skipping empty lines.
fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        let consumed = available.len();
        for &byte in available {
            if byte == b'\n' || byte == b'\r' {
                if !line.is_empty() {
                    on_line(&String::from_utf8_lossy(&line));
                    line.clear();
                }
            } else {
                line.push(byte);
            }
        }
        reader.consume(consumed);
    }
    if !line.is_empty() {
        on_line(&String::from_utf8_lossy(&line));
    }
    Ok(())
}
