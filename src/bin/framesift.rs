use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{Arc, Mutex},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use framesift::{
    AudioBitrate, AudioFormat, Extractor, FfmpegLogLevel, ImageFormat, JobFile, MediaSource,
    MethodKind, OperationType, ProgressCallback, ProgressInfo, Resolution, RunSummary,
    SourceMetadata, UrlResolver, YtDlpResolver,
    configuration::AudioSection,
    logging::{LogLevels, init_logger},
    resolve_input,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framesift extract lecture.mp4 out --method interval --interval-seconds 5\n  framesift extract videos/ out --method change --change-threshold 0.05 --format png\n  framesift extract urls.txt out --extract-audio --audio-format flac --progress\n  framesift extract --config job.json\n  framesift probe lecture.mp4 --json\n  framesift completions zsh > _framesift";

const LOG_FILE_NAME: &str = "framesift.log";

#[derive(Debug, Parser)]
#[command(
    name = "framesift",
    version,
    about = "Sample still frames and audio out of videos",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show informational logging on stderr and debug logging in the log file.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show one progress bar per chunk.
    #[arg(long, global = true)]
    progress: bool,

    /// Write the log here instead of <OUTPUT>/framesift.log.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    ffmpeg_log_level: Option<FfmpegLogLevel>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sample frames (and optionally audio) from every resolved source.
    #[command(
        about = "Extract frames and audio",
        after_help = "Examples:\n  framesift extract input.mp4 out --fps 2\n  framesift extract list.csv out --method change --min-area 800"
    )]
    Extract(ExtractArgs),

    /// Print metadata for every resolved source.
    #[command(
        about = "Print source metadata",
        visible_alias = "info",
        after_help = "Examples:\n  framesift probe input.mp4\n  framesift probe videos/ --json"
    )]
    Probe {
        /// Video file, directory, list file or URL.
        input: String,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Default, clap::Args)]
struct ExtractArgs {
    /// Video file, directory, .txt/.csv list or URL.
    input: Option<String>,

    /// Output root directory.
    output: Option<PathBuf>,

    /// JSON job file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling method: fps, interval or change. [default: fps]
    #[arg(long)]
    method: Option<MethodKind>,

    /// Frames per second to keep with --method fps. [default: 1]
    #[arg(long)]
    fps: Option<f64>,

    /// Seconds between kept frames with --method interval. [default: 1]
    #[arg(long)]
    interval_seconds: Option<f64>,

    /// Changed-area fraction that triggers a frame with --method change. [default: 0.1]
    #[arg(long)]
    change_threshold: Option<f64>,

    /// Minimum changed pixels with --method change. [default: 500]
    #[arg(long)]
    min_area: Option<u64>,

    /// Image format: jpg or png. [default: jpg]
    #[arg(long)]
    format: Option<ImageFormat>,

    /// Resize frames to WIDTHxHEIGHT.
    #[arg(long)]
    resolution: Option<Resolution>,

    /// Also extract the audio track.
    #[arg(long)]
    extract_audio: bool,

    /// Audio format: mp3, wav, aac, m4a or flac. [default: mp3]
    #[arg(long)]
    audio_format: Option<AudioFormat>,

    /// Audio bitrate: 64k, 128k, 192k, 256k or 320k. [default: 192k]
    #[arg(long)]
    audio_bitrate: Option<AudioBitrate>,

    /// Chunk length in minutes. [default: 15]
    #[arg(long)]
    chunk_minutes: Option<f64>,

    /// Upper bound on concurrent workers per source.
    #[arg(long)]
    workers: Option<usize>,

    /// Sources extracted at the same time. [default: 2]
    #[arg(long)]
    source_workers: Option<usize>,

    /// Kill a single ffmpeg run after this many seconds. [default: 1800]
    #[arg(long)]
    transcode_timeout: Option<u64>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

/// Fold command-line flags over a job file. Flags win.
fn apply_overrides(job: &mut JobFile, args: &ExtractArgs) {
    if let Some(input) = &args.input {
        job.input = Some(input.clone());
    }
    if let Some(output) = &args.output {
        job.output = Some(output.clone());
    }

    let frames = &mut job.frames;
    if let Some(method) = args.method {
        frames.method = method;
    }
    if let Some(fps) = args.fps {
        frames.fps = fps;
    }
    if let Some(seconds) = args.interval_seconds {
        frames.interval_seconds = seconds;
    }
    if let Some(threshold) = args.change_threshold {
        frames.change_threshold = threshold;
    }
    if let Some(min_area) = args.min_area {
        frames.min_area = min_area;
    }
    if let Some(format) = args.format {
        frames.format = format.to_string();
    }
    if let Some(resolution) = args.resolution {
        frames.resolution = Some(resolution.to_string());
    }

    let wants_audio =
        args.extract_audio || args.audio_format.is_some() || args.audio_bitrate.is_some();
    if wants_audio {
        let audio = job.audio.get_or_insert_with(AudioSection::default);
        if let Some(format) = args.audio_format {
            audio.format = format.to_string();
        }
        if let Some(bitrate) = args.audio_bitrate {
            audio.bitrate = bitrate.to_string();
        }
    }

    if args.chunk_minutes.is_some() {
        job.chunk_minutes = args.chunk_minutes;
    }
    if args.workers.is_some() {
        job.workers = args.workers;
    }
    if args.source_workers.is_some() {
        job.source_workers = args.source_workers;
    }
    if args.transcode_timeout.is_some() {
        job.transcode_timeout_seconds = args.transcode_timeout;
    }
}

/// One progress bar per chunk, created on first report.
struct TerminalProgress {
    bars: MultiProgress,
    active: Mutex<HashMap<(OperationType, String, usize), ProgressBar>>,
    style: ProgressStyle,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let style = ProgressStyle::with_template(
            "{spinner:.green} {prefix:.bold} {bar:40.cyan/blue} {percent:>3}% {msg}",
        )?
        .progress_chars("##-");
        Ok(Self {
            bars: MultiProgress::new(),
            active: Mutex::new(HashMap::new()),
            style,
        })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        let key = (info.operation, info.label.clone(), info.chunk_index);
        let bar = active.entry(key.clone()).or_insert_with(|| {
            let bar = self.bars.add(ProgressBar::new(1000));
            bar.set_style(self.style.clone());
            let kind = match info.operation {
                OperationType::FrameExtraction => "frames",
                OperationType::AudioExtraction => "audio",
                OperationType::AudioMerge => "merge",
                _ => "work",
            };
            bar.set_prefix(format!(
                "{} {kind} {}/{}",
                info.label, info.chunk_index, info.chunk_total
            ));
            bar
        });

        bar.set_position((info.fraction * 1000.0) as u64);
        if info.fraction >= 1.0 {
            bar.finish_with_message(format!("{:.1}s", info.elapsed.as_secs_f64()));
            active.remove(&key);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.sources {
        let line = format!(
            "{}: {} frame(s) in {}{}",
            report.name,
            report.frames_written,
            report.frames_directory.display(),
            report
                .audio_file
                .as_ref()
                .map(|path| format!(", audio {}", path.display()))
                .unwrap_or_default()
        );
        if report.has_failures() {
            eprintln!("{} {}", "partial:".yellow().bold(), line);
            for error in &report.errors {
                eprintln!("  {}", error.yellow());
            }
        } else {
            println!("{} {}", "success:".green().bold(), line);
        }
    }
    for failed in &summary.failed {
        eprintln!("{} {}: {}", "failed:".red().bold(), failed.location, failed.error);
    }
}

fn print_metadata(metadata: &SourceMetadata) {
    println!("{}", metadata.location.bold());
    println!("  container: {}", metadata.container);
    println!("  duration:  {:.3}s", metadata.duration.as_secs_f64());
    match &metadata.video {
        Some(video) => println!(
            "  video:     {}x{} {} at {:.3} fps, {} frames",
            video.width, video.height, video.codec, video.frames_per_second, video.frame_count
        ),
        None => println!("  video:     none"),
    }
    match &metadata.audio {
        Some(audio) => println!(
            "  audio:     {} {} Hz, {} channel(s), {} kb/s",
            audio.codec,
            audio.sample_rate,
            audio.channels,
            audio.bit_rate / 1000
        ),
        None => println!("  audio:     none"),
    }
}

fn setup_logging(
    global: &GlobalOptions,
    default_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = global.log_file.as_deref().or(default_file);
    init_logger(LogLevels::for_verbosity(global.verbose), log_file)?;
    framesift::set_ffmpeg_log_level(global.ffmpeg_log_level.unwrap_or_default());
    Ok(())
}

fn run_extract(
    global: &GlobalOptions,
    args: &ExtractArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut job = match &args.config {
        Some(path) => JobFile::load(path)?,
        None => JobFile::default(),
    };
    apply_overrides(&mut job, args);

    let input = job.input.clone().ok_or("missing <INPUT> (give it here or in --config)")?;
    let output = job.output.clone().ok_or("missing <OUTPUT> (give it here or in --config)")?;

    fs::create_dir_all(&output)?;
    setup_logging(global, Some(&output.join(LOG_FILE_NAME)))?;

    let mut config = job.to_config()?;
    if global.progress {
        config = config.with_progress(Arc::new(TerminalProgress::new()?));
    }

    let extractor = Extractor::new(&output, config);
    extractor.preflight()?;
    let sources = resolve_input(&input)?;
    log::info!("Extracting {} source(s) into {}", sources.len(), output.display());

    let summary = extractor.run(&sources);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if run_failed(&summary) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// A run fails when nothing was processed or a source hit a fatal error.
fn run_failed(summary: &RunSummary) -> bool {
    summary.sources.is_empty() || summary.failed.iter().any(|failed| failed.fatal)
}

type ProbeEntry = Result<SourceMetadata, (String, framesift::SiftError)>;

fn probe_sources(sources: &[MediaSource], resolver: &dyn UrlResolver) -> Vec<ProbeEntry> {
    sources
        .iter()
        .map(|source| {
            let location = match source {
                MediaSource::Local(path) => path.display().to_string(),
                MediaSource::Remote(url) => resolver
                    .resolve(url)
                    .map_err(|error| (source.location(), error))?,
            };
            framesift::probe(&location).map_err(|error| (source.location(), error))
        })
        .collect()
}

fn run_probe(
    global: &GlobalOptions,
    input: &str,
    as_json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    setup_logging(global, None)?;
    let entries = probe_sources(&resolve_input(input)?, &YtDlpResolver::default());

    if as_json {
        let payload: Vec<_> = entries
            .iter()
            .map(|entry| match entry {
                Ok(metadata) => serde_json::to_value(metadata).unwrap_or_default(),
                Err((location, error)) => json!({
                    "location": location,
                    "error": error.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for entry in &entries {
            match entry {
                Ok(metadata) => print_metadata(metadata),
                Err((location, error)) => {
                    eprintln!("{} {location}: {error}", "failed:".red().bold())
                }
            }
        }
    }

    if entries.iter().all(Result::is_err) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract(args) => run_extract(&cli.global, args),
        Commands::Probe { input, json } => run_probe(&cli.global, input, *json),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "framesift", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framesift::{FailedSource, SourceReport};

    use super::*;

    fn extract_args(arguments: &[&str]) -> ExtractArgs {
        let cli = Cli::try_parse_from(arguments).unwrap();
        match cli.command {
            Commands::Extract(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_job_file() {
        let mut job = JobFile::parse(
            r#"{
                "input": "a.mp4",
                "output": "out",
                "frames": { "method": "interval", "interval_seconds": 5 }
            }"#,
        )
        .unwrap();
        let args = extract_args(&[
            "framesift", "extract", "b.mp4", "--interval-seconds", "2", "--format", "png",
        ]);
        apply_overrides(&mut job, &args);

        assert_eq!(job.input.as_deref(), Some("b.mp4"));
        assert_eq!(job.output.as_deref(), Some(Path::new("out")));
        assert_eq!(job.frames.method, MethodKind::Interval);
        assert_eq!(job.frames.interval_seconds, 2.0);
        assert_eq!(job.frames.format, "png");
        assert!(job.audio.is_none());
    }

    #[test]
    fn audio_flags_enable_audio() {
        let mut job = JobFile::default();
        let args = extract_args(&[
            "framesift", "extract", "a.mp4", "out", "--audio-format", "flac",
        ]);
        apply_overrides(&mut job, &args);
        let audio = job.audio.unwrap();
        assert_eq!(audio.format, "flac");
        assert_eq!(audio.bitrate, "192k");
    }

    #[test]
    fn rejects_unsupported_values() {
        for (flag, value) in [
            ("--audio-bitrate", "96k"),
            ("--resolution", "0x10"),
            ("--method", "random"),
        ] {
            let arguments = ["framesift", "extract", "a.mp4", "out", flag, value];
            assert!(Cli::try_parse_from(arguments).is_err(), "{flag} {value}");
        }
    }

    #[test]
    fn source_workers_flag_reaches_the_job() {
        let mut job = JobFile::default();
        let args = extract_args(&["framesift", "extract", "a.mp4", "out", "--source-workers", "4"]);
        apply_overrides(&mut job, &args);
        assert_eq!(job.source_workers, Some(4));
    }

    #[test]
    fn fatal_source_failure_fails_the_run() {
        let failed = |fatal| FailedSource {
            location: "https://example.com/a".to_string(),
            error: "boom".to_string(),
            fatal,
        };
        let mut summary = RunSummary::default();
        assert!(run_failed(&summary));

        summary.sources.push(SourceReport {
            name: "a".to_string(),
            location: "a.mp4".to_string(),
            frames_directory: PathBuf::from("out/a/frames"),
            frames_written: 3,
            frame_chunks_succeeded: 1,
            frame_chunks_failed: 0,
            audio_file: None,
            audio_chunks_succeeded: 0,
            audio_chunks_failed: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        });
        summary.failed.push(failed(false));
        assert!(!run_failed(&summary));

        summary.failed.push(failed(true));
        assert!(run_failed(&summary));
    }

    #[test]
    fn resolve_failure_does_not_end_the_listing() {
        let resolver = YtDlpResolver::default().with_program("framesift-missing-yt-dlp");
        let sources = [
            MediaSource::Remote("https://example.com/watch?v=1".to_string()),
            MediaSource::Local(PathBuf::from("framesift-missing-clip.mp4")),
        ];
        let entries = probe_sources(&sources, &resolver);

        assert_eq!(entries.len(), 2);
        match &entries[0] {
            Err((location, framesift::SiftError::ExternalToolMissing { .. })) => {
                assert_eq!(location, "https://example.com/watch?v=1");
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        assert!(entries[1].is_err());
    }

    #[test]
    fn resolution_accepts_star_separator() {
        let args = extract_args(&[
            "framesift", "extract", "a.mp4", "out", "--resolution", "640*360",
        ]);
        assert_eq!(args.resolution, Some(Resolution { width: 640, height: 360 }));
    }
}
