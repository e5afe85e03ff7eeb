//! Running a whole extraction job.
//!
//! [`Extractor`] takes resolved [`MediaSource`]s, runs a bounded number of
//! them side by side, and for each one:
//!
//! 1. resolves remote URLs to a stream location,
//! 2. probes the source and plans frame chunks,
//! 3. dispatches the chunks to workers, each of which opens its own
//!    decoder, seeks to the chunk start, samples and writes frames,
//! 4. optionally transcodes the audio in time chunks and concatenates them.
//!
//! Failures inside a source are recorded in its [`SourceReport`]; failures
//! of a whole source are recorded in the [`RunSummary`]. Only the checks in
//! [`Extractor::preflight`] abort a run.
//!
//! # Example
//!
//! ```no_run
//! use framesift::{Extractor, ExtractionConfig, SamplingMethod, resolve_input};
//!
//! let config = ExtractionConfig::new().with_method(SamplingMethod::ChangeDetection {
//!     threshold: 0.1,
//!     min_area: 500,
//! });
//! let extractor = Extractor::new("out", config);
//! extractor.preflight()?;
//! let summary = extractor.run(&resolve_input("videos/")?);
//! println!("{} frames written", summary.frames_written());
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use serde::Serialize;

use crate::{
    audio::AudioConfig,
    chunking::{ChunkRange, frames_per_chunk, split, split_duration, worker_count},
    configuration::ExtractionConfig,
    decoder::{VideoDecoder, probe},
    dispatch::{DispatchCoordinator, JobContext, JobResult},
    error::SiftError,
    export::FrameWriter,
    frame::FrameSource,
    metadata::serialize_seconds,
    progress::{ChunkProgress, OperationType},
    sampler::{FrameSampler, SampledFrames},
    source::{MediaSource, UrlResolver, YtDlpResolver},
    transcoder::Transcoder,
};

/// What one frame chunk produced.
#[derive(Debug, Clone, Copy)]
pub struct FrameChunkReport {
    /// The range that was processed.
    pub chunk: ChunkRange,
    /// Frames decoded inside the range.
    pub frames_seen: u64,
    /// Frames kept and written.
    pub frames_written: u64,
}

/// Outcome of processing one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    /// Directory name under the output root.
    pub name: String,
    /// Path or URL as given.
    pub location: String,
    /// Where frames were written.
    pub frames_directory: PathBuf,
    /// Frames written across all chunks.
    pub frames_written: u64,
    /// Frame chunks that succeeded.
    pub frame_chunks_succeeded: usize,
    /// Frame chunks that failed.
    pub frame_chunks_failed: usize,
    /// Final audio file, when audio was requested and fully extracted.
    pub audio_file: Option<PathBuf>,
    /// Audio chunks that succeeded.
    pub audio_chunks_succeeded: usize,
    /// Audio chunks that failed.
    pub audio_chunks_failed: usize,
    /// Every error recorded for this source, rendered.
    pub errors: Vec<String>,
    /// Wall-clock time spent on the source.
    #[serde(serialize_with = "serialize_seconds")]
    pub elapsed: Duration,
}

impl SourceReport {
    /// Whether any chunk of this source failed.
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A source that could not be processed at all.
#[derive(Debug, Clone, Serialize)]
pub struct FailedSource {
    /// Path or URL as given.
    pub location: String,
    /// Why it failed.
    pub error: String,
    /// Whether the cause is fatal, like a missing external tool or an
    /// unwritable output root, rather than a problem with this source.
    pub fatal: bool,
}

impl FailedSource {
    fn new(location: String, error: &SiftError) -> Self {
        Self {
            location,
            error: error.to_string(),
            fatal: error.is_fatal(),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Sources that were processed, possibly with chunk failures.
    pub sources: Vec<SourceReport>,
    /// Sources that failed before any chunk ran.
    pub failed: Vec<FailedSource>,
}

impl RunSummary {
    /// Total frames written.
    pub fn frames_written(&self) -> u64 {
        self.sources.iter().map(|report| report.frames_written).sum()
    }

    /// Whether every source and chunk succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.sources.iter().all(|report| !report.has_failures())
    }
}

/// Runs extraction jobs into one output root.
pub struct Extractor {
    output_root: PathBuf,
    config: ExtractionConfig,
    resolver: Box<dyn UrlResolver>,
    transcoder: Transcoder,
}

impl Extractor {
    /// Extract into `output_root` with `config`.
    pub fn new(output_root: impl Into<PathBuf>, config: ExtractionConfig) -> Self {
        let transcoder = Transcoder::default().with_timeout(config.transcode_timeout);
        Self {
            output_root: output_root.into(),
            config,
            resolver: Box::new(YtDlpResolver::default()),
            transcoder,
        }
    }

    /// Use a different URL resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn UrlResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a different transcoder.
    #[must_use]
    pub fn with_transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Checks that must pass before any work starts: the configuration is
    /// valid, the output root can be created, and the transcoder runs when
    /// audio is requested.
    ///
    /// # Errors
    ///
    /// Returns the first failing check. All of these are fatal.
    pub fn preflight(&self) -> Result<(), SiftError> {
        self.config.validate()?;
        fs::create_dir_all(&self.output_root)?;
        if self.config.audio.is_some() {
            let version = self.transcoder.check_available()?;
            log::info!("Using {version}");
        }
        Ok(())
    }

    /// Process `sources`, up to the configured number of sources at once.
    ///
    /// Reports and failures keep the order of `sources`. Call
    /// [`preflight`](Self::preflight) first.
    pub fn run(&self, sources: &[MediaSource]) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = sources.len();
        let context = JobContext::new("run");
        let mut coordinator =
            DispatchCoordinator::new(self.config.concurrency, self.config.source_workers);

        let items: Vec<_> = sources.iter().enumerate().collect();
        let result = coordinator.run(&context, items, |(position, source)| {
            log::info!("Source {}/{total}: {}", position + 1, source.location());
            // Source errors stay typed so their fatality survives.
            Ok(self.process_source(source).map_err(|error| {
                log::error!("{}: {error}", source.location());
                FailedSource::new(source.location(), &error)
            }))
        });

        let outcomes = match result {
            Ok(result) => result.into_outcomes(),
            Err(error) => {
                log::error!("{error}");
                summary.failed.extend(
                    sources
                        .iter()
                        .map(|source| FailedSource::new(source.location(), &error)),
                );
                return summary;
            }
        };

        for (outcome, source) in outcomes.into_iter().zip(sources) {
            match outcome.result {
                Ok(Ok(report)) => summary.sources.push(report),
                Ok(Err(failed)) => summary.failed.push(failed),
                Err(error) => summary.failed.push(FailedSource::new(source.location(), &error)),
            }
        }
        summary
    }

    /// Extract frames (and audio, if configured) from one source.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be resolved, opened or
    /// planned. Chunk failures are recorded in the report instead.
    pub fn process_source(&self, source: &MediaSource) -> Result<SourceReport, SiftError> {
        let name = source.name();
        let context = JobContext::new(&name);
        log::info!("{name}: starting");

        let location = match source {
            MediaSource::Local(path) => path.display().to_string(),
            MediaSource::Remote(url) => self.resolver.resolve(url)?,
        };

        let metadata = probe(&location)?;
        let video = metadata
            .video
            .clone()
            .ok_or_else(|| SiftError::NoVideoStream(source.location()))?;

        let source_root = self.output_root.join(&name);
        let frames_directory = source_root.join("frames");
        fs::create_dir_all(&frames_directory)?;

        let mut report = SourceReport {
            name: name.clone(),
            location: source.location(),
            frames_directory: frames_directory.clone(),
            frames_written: 0,
            frame_chunks_succeeded: 0,
            frame_chunks_failed: 0,
            audio_file: None,
            audio_chunks_succeeded: 0,
            audio_chunks_failed: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        };

        let frames = self.extract_frames(
            &context,
            &location,
            video.frames_per_second,
            video.frame_count,
            metadata.duration,
            &frames_directory,
        )?;
        report.frame_chunks_succeeded = frames.succeeded();
        report.frame_chunks_failed = frames.failed();
        report.errors.extend(frames.errors().map(ToString::to_string));
        report.frames_written = frames.values().map(|chunk| chunk.frames_written).sum();

        if let Some(audio) = self.config.audio {
            if metadata.audio.is_none() {
                log::warn!("{name}: no audio stream, skipping audio");
                report.errors.push("no audio stream".to_string());
            } else {
                let audio_directory = source_root.join("audio");
                fs::create_dir_all(&audio_directory)?;
                self.extract_audio(
                    &context,
                    &location,
                    metadata.duration,
                    &audio_directory,
                    audio,
                    &mut report,
                )?;
            }
        }

        report.elapsed = context.elapsed();
        log::info!(
            "{name}: wrote {} frame(s) in {:.1}s ({} failed chunk(s))",
            report.frames_written,
            report.elapsed.as_secs_f64(),
            report.frame_chunks_failed + report.audio_chunks_failed
        );
        Ok(report)
    }

    fn workers_for(&self, duration: Duration, chunks: usize) -> usize {
        let available = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        worker_count(duration, available, chunks, self.config.max_workers)
    }

    fn extract_frames(
        &self,
        context: &JobContext,
        location: &str,
        frames_per_second: f64,
        frame_count: u64,
        duration: Duration,
        directory: &Path,
    ) -> Result<JobResult<FrameChunkReport>, SiftError> {
        let chunk_size = frames_per_chunk(frames_per_second, self.config.chunk_length);
        let chunks = if frame_count == 0 {
            // Unknown length: decode everything in one chunk.
            vec![ChunkRange {
                start: 0,
                end: u64::MAX,
                index: 0,
                total: 1,
            }]
        } else {
            split(frame_count, chunk_size)?
        };

        let workers = self.workers_for(duration, chunks.len());
        log::info!(
            "{}: {} frame chunk(s) of up to {chunk_size} frames on {workers} worker(s), {}",
            context.label(),
            chunks.len(),
            self.config.method.name()
        );

        let writer = FrameWriter::new(directory, self.config.image_format)
            .with_resolution(self.config.resolution);
        let mut coordinator = DispatchCoordinator::new(self.config.concurrency, workers);
        coordinator.run(context, chunks, |chunk| {
            self.extract_frame_chunk(context.label(), location, chunk, &writer)
        })
    }

    fn extract_frame_chunk(
        &self,
        label: &str,
        location: &str,
        chunk: ChunkRange,
        writer: &FrameWriter,
    ) -> Result<FrameChunkReport, SiftError> {
        let mut decoder = VideoDecoder::open(location)?;
        decoder.seek_to_frame(chunk.start)?;

        let sampler =
            FrameSampler::new(self.config.method, decoder.frames_per_second(), chunk.start);
        let mut progress = ChunkProgress::new(
            self.config.progress.clone(),
            OperationType::FrameExtraction,
            label,
            chunk.index + 1,
            chunk.total,
            chunk.len(),
        );

        let mut frames_written = 0;
        let frames_seen;
        {
            let mut frames = SampledFrames::new(&mut decoder, sampler)
                .observe(|frame| progress.update(frame.index - chunk.start + 1));
            // The frame count is an estimate, so the last chunk runs to the
            // end of the stream.
            if chunk.index + 1 < chunk.total {
                frames = frames.until(chunk.end);
            }
            for (frame, _) in frames.by_ref() {
                writer.write(&frame)?;
                frames_written += 1;
            }
            frames_seen = frames.sampler().frames_seen();
        }
        progress.finish();

        log::debug!(
            "{label}: chunk {}/{} [{}, {}) kept {frames_written} of {frames_seen} frame(s)",
            chunk.index + 1,
            chunk.total,
            chunk.start,
            chunk.end
        );
        Ok(FrameChunkReport {
            chunk,
            frames_seen,
            frames_written,
        })
    }

    fn extract_audio(
        &self,
        context: &JobContext,
        location: &str,
        duration: Duration,
        directory: &Path,
        audio: AudioConfig,
        report: &mut SourceReport,
    ) -> Result<(), SiftError> {
        let name = context.label();
        let extension = audio.format.extension();
        let final_path = directory.join(format!("{name}.{extension}"));

        let ranges = if duration > self.config.chunk_length {
            split_duration(duration, self.config.chunk_length)?
        } else {
            Vec::new()
        };

        if ranges.len() <= 1 {
            let mut progress = ChunkProgress::new(
                self.config.progress.clone(),
                OperationType::AudioExtraction,
                name,
                1,
                1,
                duration.as_millis() as u64,
            );
            match self
                .transcoder
                .extract_audio(location, &final_path, None, audio, &mut progress)
            {
                Ok(()) => {
                    report.audio_chunks_succeeded = 1;
                    report.audio_file = Some(final_path);
                }
                Err(error) => {
                    log::warn!("{name}: audio extraction failed: {error}");
                    report.audio_chunks_failed = 1;
                    report.errors.push(error.to_string());
                }
            }
            return Ok(());
        }

        let workers = self.workers_for(duration, ranges.len());
        log::info!("{name}: {} audio chunk(s) on {workers} worker(s)", ranges.len());

        let mut coordinator = DispatchCoordinator::new(self.config.concurrency, workers);
        let parts = coordinator.run(context, ranges, |range| {
            let part = directory.join(format!("{name}_chunk{}.{extension}", range.index));
            let mut progress = ChunkProgress::new(
                self.config.progress.clone(),
                OperationType::AudioExtraction,
                name,
                range.index + 1,
                range.total,
                range.duration().as_millis() as u64,
            );
            self.transcoder.extract_audio(
                location,
                &part,
                Some((range.start(), range.duration())),
                audio,
                &mut progress,
            )?;
            Ok(part)
        })?;

        report.audio_chunks_succeeded = parts.succeeded();
        report.audio_chunks_failed = parts.failed();
        report.errors.extend(parts.errors().map(ToString::to_string));

        if !parts.is_success() {
            log::warn!("{name}: keeping {} audio chunk(s) unmerged", parts.succeeded());
            return Ok(());
        }

        let parts = parts.into_values();
        let mut progress = ChunkProgress::new(
            self.config.progress.clone(),
            OperationType::AudioMerge,
            name,
            1,
            1,
            parts.len() as u64,
        );
        match self.transcoder.concat(&parts, &final_path) {
            Ok(()) => {
                for part in &parts {
                    if let Err(error) = fs::remove_file(part) {
                        log::warn!("Could not remove {}: {error}", part.display());
                    }
                }
                progress.finish();
                report.audio_file = Some(final_path);
            }
            Err(error) => {
                log::warn!("{name}: audio merge failed: {error}");
                report.errors.push(error.to_string());
            }
        }
        Ok(())
    }
}
