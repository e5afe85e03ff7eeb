//! Splitting a source into independently processable ranges.
//!
//! Frame work is split by frame index, audio work by time. Both produce
//! contiguous, non-overlapping ranges in order whose union is exactly the
//! requested span.

use std::time::Duration;

use crate::error::SiftError;

/// A half-open range of frame indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// First frame index, inclusive.
    pub start: u64,
    /// Last frame index, exclusive.
    pub end: u64,
    /// Zero-based position in the plan.
    pub index: usize,
    /// Number of chunks in the plan.
    pub total: usize,
}

impl ChunkRange {
    /// Number of frames in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range covers no frames.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A half-open time range `[start, end)`, stored with millisecond
/// resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start_ms: u64,
    end_ms: u64,
    /// Zero-based position in the plan.
    pub index: usize,
    /// Number of chunks in the plan.
    pub total: usize,
}

impl TimeRange {
    /// Start offset.
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    /// End offset.
    pub fn end(&self) -> Duration {
        Duration::from_millis(self.end_ms)
    }

    /// Length of the range.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.end_ms - self.start_ms)
    }
}

/// Split `total` frames into chunks of at most `chunk_size`.
///
/// The last chunk may be short. Zero frames yields an empty plan; a zero
/// chunk size is rejected.
///
/// # Errors
///
/// Returns [`SiftError::InvalidParameter`] when `chunk_size` is zero.
///
/// # Example
///
/// ```
/// use framesift::chunking::split;
///
/// let chunks = split(1000, 300)?;
/// let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
/// assert_eq!(spans, vec![(0, 300), (300, 600), (600, 900), (900, 1000)]);
/// # Ok::<(), framesift::SiftError>(())
/// ```
pub fn split(total: u64, chunk_size: u64) -> Result<Vec<ChunkRange>, SiftError> {
    if chunk_size == 0 {
        return Err(SiftError::InvalidParameter {
            parameter: "chunk size",
            reason: "must be at least one frame".to_string(),
        });
    }

    let count = total.div_ceil(chunk_size) as usize;
    Ok((0..count)
        .map(|index| {
            let start = index as u64 * chunk_size;
            ChunkRange {
                start,
                end: (start + chunk_size).min(total),
                index,
                total: count,
            }
        })
        .collect())
}

/// Split a stream of `duration` into time ranges of at most `chunk_length`.
///
/// # Errors
///
/// Returns [`SiftError::InvalidParameter`] when `chunk_length` rounds to
/// zero milliseconds.
pub fn split_duration(
    duration: Duration,
    chunk_length: Duration,
) -> Result<Vec<TimeRange>, SiftError> {
    let step = chunk_length.as_millis() as u64;
    if step == 0 {
        return Err(SiftError::InvalidParameter {
            parameter: "chunk length",
            reason: "must be at least one millisecond".to_string(),
        });
    }

    let total = duration.as_millis() as u64;
    let count = total.div_ceil(step) as usize;
    Ok((0..count)
        .map(|index| {
            let start_ms = index as u64 * step;
            TimeRange {
                start_ms,
                end_ms: (start_ms + step).min(total),
                index,
                total: count,
            }
        })
        .collect())
}

/// Number of frames covering `length` of a stream at `fps`, never below one.
pub fn frames_per_chunk(fps: f64, length: Duration) -> u64 {
    let frames = (fps * length.as_secs_f64()).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

/// Workers to use for a source of the given duration.
///
/// Short sources get few workers, long ones more, and the result never
/// exceeds the machine's parallelism, the number of chunks or the optional
/// user cap. It is at least one.
pub fn worker_count(
    duration: Duration,
    available: usize,
    chunks: usize,
    cap: Option<usize>,
) -> usize {
    let policy = match duration.as_secs() {
        0..300 => 2,
        300..1800 => 4,
        _ => 8,
    };
    let mut workers = policy.min(available).min(chunks);
    if let Some(cap) = cap {
        workers = workers.min(cap);
    }
    workers.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_leaves_a_short_tail() {
        let chunks = split(1000, 300).unwrap();
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 300), (300, 600), (600, 900), (900, 1000)]);
        assert!(chunks.iter().all(|c| c.total == 4));
    }

    #[test]
    fn split_exact_multiple_has_one_chunk() {
        let chunks = split(300, 300).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start, chunks[0].end), (0, 300));
    }

    #[test]
    fn split_empty_and_zero_size() {
        assert!(split(0, 10).unwrap().is_empty());
        assert!(split(10, 0).is_err());
    }

    #[test]
    fn split_partitions_exactly() {
        for total in 0..200u64 {
            for size in 1..40u64 {
                let chunks = split(total, size).unwrap();
                let mut cursor = 0;
                for (position, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.index, position);
                    assert_eq!(chunk.start, cursor);
                    assert!(!chunk.is_empty());
                    assert!(chunk.len() <= size);
                    cursor = chunk.end;
                }
                assert_eq!(cursor, total);
            }
        }
    }

    #[test]
    fn split_duration_covers_stream() {
        let ranges =
            split_duration(Duration::from_secs(2000), Duration::from_secs(900)).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2].start(), Duration::from_secs(1800));
        assert_eq!(ranges[2].duration(), Duration::from_secs(200));
        assert!(split_duration(Duration::from_secs(1), Duration::ZERO).is_err());
    }

    #[test]
    fn frames_per_chunk_rounds() {
        assert_eq!(frames_per_chunk(30.0, Duration::from_secs(900)), 27_000);
        assert_eq!(frames_per_chunk(29.97, Duration::from_secs(60)), 1798);
        assert_eq!(frames_per_chunk(0.0, Duration::from_secs(60)), 1);
    }

    #[test]
    fn worker_count_respects_every_bound() {
        let hour = Duration::from_secs(3600);
        assert_eq!(worker_count(hour, 16, 4, None), 4);
        assert_eq!(worker_count(hour, 16, 20, None), 8);
        assert_eq!(worker_count(hour, 2, 20, None), 2);
        assert_eq!(worker_count(hour, 16, 20, Some(3)), 3);
        assert_eq!(worker_count(Duration::from_secs(60), 16, 20, None), 2);
        assert_eq!(worker_count(Duration::from_secs(600), 16, 20, None), 4);
        assert_eq!(worker_count(hour, 16, 0, None), 1);
    }
}
