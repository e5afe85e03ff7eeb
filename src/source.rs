//! Turning an input specification into concrete media sources.
//!
//! An input is one of:
//!
//! - a video file, recognised by extension;
//! - a directory, walked recursively for video files;
//! - a `.txt` list (one path or URL per line, `#` starts a comment) or a
//!   `.csv` list (the `url` column, or the first column);
//! - a URL starting with `http://`, `https://` or `www.`.
//!
//! Remote page URLs are turned into direct stream URLs by a
//! [`UrlResolver`], `yt-dlp` by default.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use crate::{error::SiftError, process::run_watched};

/// Extensions recognised as video files, lowercase.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mkv", "mov", "flv", "wmv", "webm"];

/// Default watchdog for URL resolution.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

const UNSAFE_CHARACTERS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// One concrete thing to extract from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaSource {
    /// A file on disk.
    Local(PathBuf),
    /// A page or stream URL.
    Remote(String),
}

impl MediaSource {
    /// Path or URL for display.
    pub fn location(&self) -> String {
        match self {
            MediaSource::Local(path) => path.display().to_string(),
            MediaSource::Remote(url) => url.clone(),
        }
    }

    /// Directory name for this source under the output root.
    ///
    /// Local files use their file stem, URLs their whole text, both passed
    /// through [`safe_name`].
    pub fn name(&self) -> String {
        match self {
            MediaSource::Local(path) => {
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                safe_name(&stem)
            }
            MediaSource::Remote(url) => {
                let trimmed = url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/');
                safe_name(trimmed)
            }
        }
    }

    /// Whether the source must go through a [`UrlResolver`] first.
    pub fn is_remote(&self) -> bool {
        matches!(self, MediaSource::Remote(_))
    }
}

/// Replace characters that are invalid in file names with `_`.
///
/// Control characters are replaced too, surrounding whitespace and dots are
/// trimmed, and an empty result becomes `"video"`.
pub fn safe_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|character| {
            if UNSAFE_CHARACTERS.contains(&character) || character.is_control() {
                '_'
            } else {
                character
            }
        })
        .collect();
    let trimmed = replaced.trim().trim_matches('.');
    if trimmed.is_empty() {
        "video".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `input` looks like a URL.
pub fn is_url(input: &str) -> bool {
    let input = input.trim();
    input.starts_with("http://") || input.starts_with("https://") || input.starts_with("www.")
}

/// Whether `path` has a recognised video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|extension| VIDEO_EXTENSIONS.contains(&extension.as_str()))
}

/// Expand an input specification into sources, in a stable order.
///
/// # Errors
///
/// Returns [`SiftError::InvalidInput`] if the input does not exist or is
/// not a recognised kind, and [`SiftError::NoSources`] if a directory or
/// list contains nothing usable.
pub fn resolve_input(input: &str) -> Result<Vec<MediaSource>, SiftError> {
    let trimmed = input.trim();
    if is_url(trimmed) {
        return Ok(vec![MediaSource::Remote(normalize_url(trimmed))]);
    }

    let path = Path::new(trimmed);
    let invalid = |reason: &str| SiftError::InvalidInput {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let sources = if path.is_dir() {
        let mut files = Vec::new();
        walk_videos(path, &mut files)?;
        files.sort();
        files.into_iter().map(MediaSource::Local).collect()
    } else if path.is_file() {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase());
        match extension.as_deref() {
            Some("txt") => parse_text_list(&fs::read_to_string(path)?, list_base(path)),
            Some("csv") => parse_csv_list(&fs::read_to_string(path)?, list_base(path))?,
            _ if is_video_file(path) => vec![MediaSource::Local(path.to_path_buf())],
            _ => return Err(invalid("not a video file, list file or directory")),
        }
    } else {
        return Err(invalid("no such file, directory or URL"));
    };

    if sources.is_empty() {
        return Err(SiftError::NoSources(input.to_string()));
    }
    log::info!("Resolved {input} to {} source(s)", sources.len());
    Ok(sources)
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("www.") {
        format!("https://{url}")
    } else {
        url.to_string()
    }
}

fn list_base(list: &Path) -> &Path {
    list.parent().unwrap_or_else(|| Path::new(""))
}

fn walk_videos(directory: &Path, found: &mut Vec<PathBuf>) -> Result<(), SiftError> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_videos(&path, found)?;
        } else if is_video_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn list_entry(entry: &str, base: &Path) -> Option<MediaSource> {
    let entry = entry.trim().trim_matches('"').trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }
    if is_url(entry) {
        return Some(MediaSource::Remote(normalize_url(entry)));
    }

    let path = Path::new(entry);
    let path = if path.is_relative() { base.join(path) } else { path.to_path_buf() };
    if path.is_file() && is_video_file(&path) {
        Some(MediaSource::Local(path))
    } else {
        log::warn!("Skipping list entry {entry}: not an existing video file or URL");
        None
    }
}

/// Parse a plain list: one path or URL per line.
///
/// Relative paths are resolved against `base`. Blank lines and lines
/// starting with `#` are skipped; entries that are neither URLs nor
/// existing video files are skipped with a warning.
pub fn parse_text_list(text: &str, base: &Path) -> Vec<MediaSource> {
    text.lines().filter_map(|line| list_entry(line, base)).collect()
}

/// Parse a CSV list with a header row.
///
/// Uses the column named `url` (any case) when present, otherwise the first
/// column.
///
/// # Errors
///
/// Returns [`SiftError::InvalidInput`] if the CSV is malformed.
pub fn parse_csv_list(text: &str, base: &Path) -> Result<Vec<MediaSource>, SiftError> {
    let malformed = |error: csv::Error| SiftError::InvalidInput {
        input: "CSV list".to_string(),
        reason: error.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let column = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .position(|header| header.eq_ignore_ascii_case("url"))
        .unwrap_or(0);

    let mut sources = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        if let Some(source) = record.get(column).and_then(|field| list_entry(field, base)) {
            sources.push(source);
        }
    }
    Ok(sources)
}

/// Turns a page URL into something the decoder can open.
pub trait UrlResolver: Send + Sync {
    /// Resolve `url` to a direct media URL or path.
    fn resolve(&self, url: &str) -> Result<String, SiftError>;
}

/// Resolves page URLs with `yt-dlp -g`, preferring an MP4 rendition.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    timeout: Duration,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

impl YtDlpResolver {
    /// Use a specific `yt-dlp` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the resolver after this long.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl UrlResolver for YtDlpResolver {
    fn resolve(&self, url: &str) -> Result<String, SiftError> {
        // Links that already point at a media file need no resolving.
        let path_part = url.split(['?', '#']).next().unwrap_or(url);
        if is_video_file(Path::new(path_part)) {
            return Ok(url.to_string());
        }

        let mut command = Command::new(&self.program);
        command.args(["-f", "best[ext=mp4]/best", "-g", url]);
        let output = run_watched("yt-dlp", &mut command, self.timeout, |line| {
            log::debug!("yt-dlp: {line}");
        })?;

        if !output.status.success() {
            return Err(SiftError::Resolve {
                url: url.to_string(),
                reason: format!("{}: {}", output.status, output.stderr_tail),
            });
        }

        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| SiftError::Resolve {
                url: url.to_string(),
                reason: "no stream URL printed".to_string(),
            })
    }
}
