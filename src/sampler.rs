//! Frame sampling policies.
//!
//! A [`FrameSampler`] looks at every frame coming off a decode cursor and
//! decides whether to keep it. The decision depends only on the current
//! frame, the per-stream [`SamplingState`] and the configured
//! [`SamplingMethod`]:
//!
//! - **Fixed FPS** keeps every `round(source_fps / target_fps)`-th frame,
//!   counted from the first frame of the range.
//! - **Fixed interval** keeps a frame when at least `interval` of stream time
//!   has passed since the last kept frame. The first frame is always kept.
//! - **Change detection** keeps a frame when enough of it differs from the
//!   previous frame. The previous frame is the last one *seen*, kept or not,
//!   and the first frame only seeds that state.
//!
//! [`SampledFrames`] wraps a [`FrameSource`] and a sampler into a lazy
//! iterator of `(frame, output_index)` pairs.
//!
//! # Example
//!
//! ```no_run
//! use framesift::{FrameSampler, SampledFrames, SamplingMethod, VideoDecoder};
//!
//! let mut decoder = VideoDecoder::open("input.mp4")?;
//! let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 1.0 }, 30.0, 0);
//! for (frame, output_index) in SampledFrames::new(&mut decoder, sampler) {
//!     println!("keep #{output_index}: source frame {}", frame.index);
//! }
//! # Ok::<(), framesift::SiftError>(())
//! ```

use std::time::Duration;

use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::Norm,
    morphology::dilate,
    region_labelling::{Connectivity, connected_components},
};

use crate::{
    configuration::{CHANGE_PIXEL_DELTA, SamplingMethod},
    frame::{FrameSample, FrameSource},
};

/// Number of 3×3 dilation passes applied to the change mask.
const DILATE_ITERATIONS: usize = 2;

/// Per-stream memory used by the sampling policies.
///
/// One instance lives inside each [`FrameSampler`]; it is never shared
/// between streams or workers.
#[derive(Debug, Clone, Default)]
pub struct SamplingState {
    /// Timestamp of the last kept frame.
    pub last_emit_timestamp: Option<Duration>,
    /// Grayscale copy of the last seen frame (change detection only).
    pub previous_gray: Option<GrayImage>,
    /// Frames offered to the sampler so far.
    pub frames_seen: u64,
    /// Frames kept so far. Also the next output index.
    pub frames_emitted: u64,
}

/// How far one frame differs from its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeMeasurement {
    /// Pixels inside changed regions after dilation.
    pub changed_area: u64,
    /// Width × height of the frame.
    pub frame_area: u64,
    /// Number of 8-connected changed regions.
    pub regions: u32,
}

impl ChangeMeasurement {
    /// Changed area as a fraction of the frame.
    pub fn changed_fraction(&self) -> f64 {
        if self.frame_area == 0 {
            return 0.0;
        }
        self.changed_area as f64 / self.frame_area as f64
    }
}

/// Frame step for the fixed-FPS policy, never below one.
pub fn frame_interval(source_fps: f64, target_fps: f64) -> u64 {
    if !(source_fps.is_finite() && target_fps.is_finite()) || target_fps <= 0.0 {
        return 1;
    }
    let step = (source_fps / target_fps).round();
    if step < 1.0 { 1 } else { step as u64 }
}

/// Compare two equally sized grayscale frames.
///
/// Pixels whose intensity differs by more than
/// [`CHANGE_PIXEL_DELTA`] are marked, the mask is dilated twice with a
/// 3×3 kernel, and the areas of the resulting 8-connected regions are
/// summed.
pub fn measure_change(previous: &GrayImage, current: &GrayImage) -> ChangeMeasurement {
    let (width, height) = current.dimensions();
    let frame_area = u64::from(width) * u64::from(height);

    let mut mask = GrayImage::new(width, height);
    let mut any_changed = false;
    for ((out, before), after) in mask.pixels_mut().zip(previous.pixels()).zip(current.pixels()) {
        if before[0].abs_diff(after[0]) > CHANGE_PIXEL_DELTA {
            *out = Luma([u8::MAX]);
            any_changed = true;
        }
    }

    if !any_changed {
        return ChangeMeasurement {
            changed_area: 0,
            frame_area,
            regions: 0,
        };
    }

    for _ in 0..DILATE_ITERATIONS {
        mask = dilate(&mask, Norm::LInf, 1);
    }

    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
    let mut changed_area = 0u64;
    let mut regions = 0u32;
    for label in labels.pixels() {
        if label[0] > 0 {
            changed_area += 1;
            regions = regions.max(label[0]);
        }
    }

    ChangeMeasurement {
        changed_area,
        frame_area,
        regions,
    }
}

/// Decides, frame by frame, which frames to keep.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    method: SamplingMethod,
    frame_step: u64,
    start_index: u64,
    state: SamplingState,
}

impl FrameSampler {
    /// Create a sampler for a stream (or chunk) starting at `start_index`.
    ///
    /// `source_fps` is only used by the fixed-FPS policy.
    pub fn new(method: SamplingMethod, source_fps: f64, start_index: u64) -> Self {
        let frame_step = match method {
            SamplingMethod::FixedFps { fps } => frame_interval(source_fps, fps),
            _ => 1,
        };
        Self {
            method,
            frame_step,
            start_index,
            state: SamplingState::default(),
        }
    }

    /// The configured method.
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    /// First source index of the range this sampler covers.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// Read-only view of the running state.
    pub fn state(&self) -> &SamplingState {
        &self.state
    }

    /// Frames kept so far.
    pub fn frames_emitted(&self) -> u64 {
        self.state.frames_emitted
    }

    /// Frames offered so far.
    pub fn frames_seen(&self) -> u64 {
        self.state.frames_seen
    }

    /// Offer a frame. Returns `true` when it should be kept.
    pub fn decide(&mut self, frame: &FrameSample) -> bool {
        self.state.frames_seen += 1;

        let keep = match self.method {
            SamplingMethod::FixedFps { .. } => {
                frame.index.saturating_sub(self.start_index) % self.frame_step == 0
            }
            SamplingMethod::FixedInterval { interval } => match self.state.last_emit_timestamp {
                None => true,
                Some(last) => frame
                    .timestamp
                    .checked_sub(last)
                    .is_some_and(|elapsed| elapsed >= interval),
            },
            SamplingMethod::ChangeDetection {
                threshold,
                min_area,
            } => self.decide_change(frame, threshold, min_area),
        };

        if keep {
            self.state.last_emit_timestamp = Some(frame.timestamp);
            self.state.frames_emitted += 1;
        }
        keep
    }

    fn decide_change(&mut self, frame: &FrameSample, threshold: f64, min_area: u64) -> bool {
        let gray = image::imageops::grayscale(&frame.image);

        let Some(previous) = self.state.previous_gray.take() else {
            self.state.previous_gray = Some(gray);
            return false;
        };

        if previous.dimensions() != gray.dimensions() {
            log::debug!(
                "Frame {} changed size from {:?} to {:?}; reseeding change detection",
                frame.index,
                previous.dimensions(),
                gray.dimensions()
            );
            self.state.previous_gray = Some(gray);
            return false;
        }

        let measurement = measure_change(&previous, &gray);
        self.state.previous_gray = Some(gray);

        log::trace!(
            "Frame {}: changed {} of {} px in {} region(s)",
            frame.index,
            measurement.changed_area,
            measurement.frame_area,
            measurement.regions
        );

        measurement.changed_area > 0
            && measurement.changed_area >= min_area
            && measurement.changed_fraction() >= threshold
    }
}

/// Lazy iterator of kept frames paired with their output index.
///
/// Decoding stops at the end of the stream, at the first frame whose index
/// reaches `end` (when set), or at the first decode error, which is logged
/// and otherwise treated as the end of the stream. The iterator cannot be
/// restarted.
pub struct SampledFrames<'a, S: FrameSource> {
    source: S,
    sampler: FrameSampler,
    end: Option<u64>,
    observer: Option<Box<dyn FnMut(&FrameSample) + 'a>>,
    done: bool,
}

impl<'a, S: FrameSource> SampledFrames<'a, S> {
    /// Sample `source` until it runs out.
    pub fn new(source: S, sampler: FrameSampler) -> Self {
        Self {
            source,
            sampler,
            end: None,
            observer: None,
            done: false,
        }
    }

    /// Stop before the first frame whose index is `end` or later.
    #[must_use]
    pub fn until(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    /// Call `observer` for every decoded frame inside the range, kept or not.
    #[must_use]
    pub fn observe(mut self, observer: impl FnMut(&FrameSample) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// The sampler, for its counters.
    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }
}

impl<S: FrameSource> Iterator for SampledFrames<'_, S> {
    type Item = (FrameSample, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let frame = match self.source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(error) => {
                    log::warn!(
                        "Decode stopped after {} frame(s): {error}",
                        self.sampler.frames_seen()
                    );
                    self.done = true;
                    break;
                }
            };

            if frame.index < self.sampler.start_index {
                continue;
            }
            if self.end.is_some_and(|end| frame.index >= end) {
                self.done = true;
                break;
            }

            if let Some(observer) = self.observer.as_mut() {
                observer(&frame);
            }

            if self.sampler.decide(&frame) {
                let output_index = self.sampler.frames_emitted() - 1;
                return Some((frame, output_index));
            }
        }
        None
    }
}
