//! Sampling policies driven end to end through `SampledFrames`.

mod common;

use std::time::Duration;

use common::{SyntheticVideo, square};
use framesift::{FrameSampler, FrameSource, SampledFrames, SamplingMethod};
use image::RgbImage;

fn kept_indices<S: FrameSource>(source: S, sampler: FrameSampler) -> Vec<u64> {
    SampledFrames::new(source, sampler)
        .map(|(frame, _)| frame.index)
        .collect()
}

// ── Fixed FPS ────────────────────────────────────────────────────

#[test]
fn fixed_fps_keeps_every_thirtieth_frame() {
    let video = SyntheticVideo::solid(30.0, 300, 128);
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 1.0 }, 30.0, 0);
    let kept: Vec<_> = SampledFrames::new(video, sampler).collect();

    let indices: Vec<u64> = kept.iter().map(|(frame, _)| frame.index).collect();
    assert_eq!(indices, (0..300).step_by(30).collect::<Vec<_>>());

    let outputs: Vec<u64> = kept.iter().map(|(_, output)| *output).collect();
    assert_eq!(outputs, (0..10).collect::<Vec<_>>());
}

#[test]
fn fixed_fps_above_source_rate_keeps_everything() {
    let video = SyntheticVideo::solid(30.0, 45, 10);
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 60.0 }, 30.0, 0);
    assert_eq!(kept_indices(video, sampler), (0..45).collect::<Vec<_>>());
}

#[test]
fn fixed_fps_counts_from_chunk_start() {
    let mut video = SyntheticVideo::solid(30.0, 300, 0);
    video.seek_to_frame(100).expect("seek");
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 1.0 }, 30.0, 100);
    let indices = SampledFrames::new(&mut video, sampler)
        .until(200)
        .map(|(frame, _)| frame.index)
        .collect::<Vec<_>>();
    assert_eq!(indices, vec![100, 130, 160, 190]);
}

#[test]
fn frames_before_start_are_skipped() {
    // A decoder that lands before the requested frame after seeking.
    let video = SyntheticVideo::solid(10.0, 50, 0);
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 10.0 }, 10.0, 40);
    assert_eq!(kept_indices(video, sampler), (40..50).collect::<Vec<_>>());
}

// ── Fixed interval ───────────────────────────────────────────────

#[test]
fn interval_keeps_first_frame_then_every_five_seconds() {
    let video = SyntheticVideo::solid(1.0, 20, 0);
    let sampler = FrameSampler::new(
        SamplingMethod::FixedInterval {
            interval: Duration::from_secs(5),
        },
        1.0,
        0,
    );
    let timestamps: Vec<Duration> = SampledFrames::new(video, sampler)
        .map(|(frame, _)| frame.timestamp)
        .collect();
    assert_eq!(
        timestamps,
        [0, 5, 10, 15].map(Duration::from_secs).to_vec()
    );
}

#[test]
fn interval_longer_than_stream_keeps_one_frame() {
    let video = SyntheticVideo::solid(25.0, 100, 0);
    let sampler = FrameSampler::new(
        SamplingMethod::FixedInterval {
            interval: Duration::from_secs(60),
        },
        25.0,
        0,
    );
    assert_eq!(kept_indices(video, sampler), vec![0]);
}

// ── Change detection ─────────────────────────────────────────────

#[test]
fn static_stream_emits_nothing() {
    let video = SyntheticVideo::solid(30.0, 90, 0);
    let sampler = FrameSampler::new(
        SamplingMethod::ChangeDetection {
            threshold: 0.0,
            min_area: 0,
        },
        30.0,
        0,
    );
    assert!(kept_indices(video, sampler).is_empty());
}

#[test]
fn appearing_square_emits_once() {
    let video = SyntheticVideo::new(
        10.0,
        20,
        Box::new(|index| {
            if index < 5 {
                RgbImage::new(64, 64)
            } else {
                square(20, 20, 10)
            }
        }),
    );
    let sampler = FrameSampler::new(
        SamplingMethod::ChangeDetection {
            threshold: 0.01,
            min_area: 25,
        },
        10.0,
        0,
    );
    assert_eq!(kept_indices(video, sampler), vec![5]);
}

#[test]
fn moving_square_emits_on_every_move() {
    let video = SyntheticVideo::new(
        10.0,
        6,
        Box::new(|index| square(index as u32 * 8, 10, 8)),
    );
    let sampler = FrameSampler::new(
        SamplingMethod::ChangeDetection {
            threshold: 0.01,
            min_area: 25,
        },
        10.0,
        0,
    );
    assert_eq!(kept_indices(video, sampler), vec![1, 2, 3, 4, 5]);
}

#[test]
fn small_change_below_min_area_is_ignored() {
    let video = SyntheticVideo::new(
        10.0,
        10,
        Box::new(|index| if index < 5 { RgbImage::new(64, 64) } else { square(0, 0, 1) }),
    );
    let sampler = FrameSampler::new(
        SamplingMethod::ChangeDetection {
            threshold: 0.0,
            min_area: 500,
        },
        10.0,
        0,
    );
    assert!(kept_indices(video, sampler).is_empty());
}

// ── Iterator behaviour ───────────────────────────────────────────

#[test]
fn decode_error_ends_the_stream() {
    let video = SyntheticVideo::solid(10.0, 100, 0).failing_at(42);
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 10.0 }, 10.0, 0);
    assert_eq!(kept_indices(video, sampler), (0..42).collect::<Vec<_>>());
}

#[test]
fn observer_sees_every_frame_in_range() {
    let mut seen = 0u64;
    let video = SyntheticVideo::solid(30.0, 120, 0);
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps: 1.0 }, 30.0, 0);
    let kept = SampledFrames::new(video, sampler)
        .until(90)
        .observe(|_| seen += 1)
        .count();
    assert_eq!(kept, 3);
    assert_eq!(seen, 90);
}
