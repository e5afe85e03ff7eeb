//! Per-chunk progress reporting.
//!
//! Every chunk reports on its own: a [`ProgressCallback`] receives
//! [`ProgressInfo`] snapshots carrying the chunk position and a completion
//! fraction in `[0, 1]`. Nothing here merges chunks into one global
//! percentage; renderers that want that can do it themselves.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{ExtractionConfig, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!(
//!             "[{:?}] {} chunk {}/{}: {:.0}%",
//!             info.operation,
//!             info.label,
//!             info.chunk_index,
//!             info.chunk_total,
//!             info.fraction * 100.0,
//!         );
//!     }
//! }
//!
//! let config = ExtractionConfig::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of work a chunk is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding, sampling and writing frames.
    FrameExtraction,
    /// Transcoding one audio time range.
    AudioExtraction,
    /// Concatenating audio chunks into one file.
    AudioMerge,
}

/// A snapshot of one chunk's progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Source name the chunk belongs to.
    pub label: String,
    /// One-based chunk index.
    pub chunk_index: usize,
    /// Number of chunks for this source and operation.
    pub chunk_total: usize,
    /// Completion of this chunk, clamped to `[0, 1]`.
    pub fraction: f32,
    /// Units processed so far (frames, or milliseconds of audio).
    pub current: u64,
    /// Units expected in this chunk.
    pub total: u64,
    /// Wall-clock time since the chunk started.
    pub elapsed: Duration,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because chunks report from
/// worker threads. Callbacks observe but cannot halt the operation.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever a chunk advances by at least one percent, and once
    /// more when it finishes.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. This is the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks one chunk and throttles callbacks to one-percent steps.
pub struct ChunkProgress {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    label: String,
    chunk_index: usize,
    chunk_total: usize,
    total: u64,
    current: u64,
    last_reported: Option<f32>,
    start_time: Instant,
}

impl ChunkProgress {
    /// Start tracking a chunk of `total` units.
    pub fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        label: impl Into<String>,
        chunk_index: usize,
        chunk_total: usize,
        total: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            label: label.into(),
            chunk_index,
            chunk_total,
            total,
            current: 0,
            last_reported: None,
            start_time: Instant::now(),
        }
    }

    /// Change the expected total, e.g. once the transcoder reports the
    /// input duration.
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    /// Current completion fraction.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f32 / self.total as f32).clamp(0.0, 1.0)
    }

    /// Record that `current` units are done.
    ///
    /// Values beyond the total are clamped; going backwards is ignored.
    pub fn update(&mut self, current: u64) {
        let current = current.min(self.total);
        if current <= self.current && self.last_reported.is_some() {
            return;
        }
        self.current = current;

        let fraction = self.fraction();
        let due = match self.last_reported {
            None => true,
            Some(last) => fraction - last >= 0.01,
        };
        if due {
            self.report(fraction);
        }
    }

    /// Report completion unconditionally.
    pub fn finish(&mut self) {
        self.current = self.total;
        self.report(1.0);
    }

    fn report(&mut self, fraction: f32) {
        self.last_reported = Some(fraction);
        let info = ProgressInfo {
            operation: self.operation,
            label: self.label.clone(),
            chunk_index: self.chunk_index,
            chunk_total: self.chunk_total,
            fraction,
            current: self.current,
            total: self.total,
            elapsed: self.start_time.elapsed(),
        };
        self.callback.on_progress(&info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        fractions: Mutex<Vec<f32>>,
    }

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.fractions.lock().unwrap().push(info.fraction);
        }
    }

    #[test]
    fn throttles_to_one_percent_steps() {
        let recorder = Arc::new(Recorder::default());
        let mut progress = ChunkProgress::new(
            recorder.clone(),
            OperationType::FrameExtraction,
            "clip",
            1,
            1,
            1000,
        );
        for current in 1..=1000 {
            progress.update(current);
        }
        let fractions = recorder.fractions.lock().unwrap();
        assert!(fractions.len() <= 101, "got {} reports", fractions.len());
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn finish_always_reports_one() {
        let recorder = Arc::new(Recorder::default());
        let mut progress = ChunkProgress::new(
            recorder.clone(),
            OperationType::AudioExtraction,
            "clip",
            2,
            3,
            0,
        );
        progress.finish();
        assert_eq!(*recorder.fractions.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn fraction_is_clamped() {
        let mut progress = ChunkProgress::new(
            Arc::new(NoOpProgress),
            OperationType::FrameExtraction,
            "clip",
            1,
            1,
            10,
        );
        progress.update(50);
        assert_eq!(progress.fraction(), 1.0);
    }
}
