//! End-to-end extraction against a real video.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and are skipped when those are missing.

mod common;

use std::{collections::BTreeSet, fs, path::Path, time::Duration};

use common::sample_video_path;
use framesift::{
    ExtractionConfig, Extractor, FrameSampler, FrameSource, ImageFormat, MediaSource,
    Resolution, SampledFrames, SamplingMethod, VideoDecoder, probe,
};

fn frame_files(directory: &Path) -> BTreeSet<String> {
    fs::read_dir(directory)
        .expect("Failed to read frames directory")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn probe_reports_video_stream() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let metadata = probe(path).expect("Failed to probe fixture");
    let video = metadata.video.expect("fixture has video");
    assert!(video.width > 0 && video.height > 0);
    assert!(video.frames_per_second > 0.0);
    assert!(metadata.duration > Duration::ZERO);
}

#[test]
fn decoder_frames_are_in_order() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut decoder = VideoDecoder::open(path).expect("Failed to open fixture");
    let fps = decoder.frames_per_second();
    let sampler = FrameSampler::new(SamplingMethod::FixedFps { fps }, fps, 0);
    let indices: Vec<u64> = SampledFrames::new(&mut decoder, sampler)
        .take(20)
        .map(|(frame, _)| frame.index)
        .collect();
    assert!(!indices.is_empty());
    assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn seek_lands_on_requested_frame() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut decoder = VideoDecoder::open(path).expect("Failed to open fixture");
    let target = decoder.frame_count() / 2;
    decoder.seek_to_frame(target).expect("Failed to seek");
    let frame = decoder
        .read_frame()
        .expect("Failed to decode")
        .expect("frame after seek");
    assert!(frame.index >= target);
}

#[test]
fn extraction_is_idempotent_across_chunkings() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let run = |output: &Path, chunk_length: Duration| {
        let config = ExtractionConfig::new()
            .with_method(SamplingMethod::FixedFps { fps: 1.0 })
            .with_image_format(ImageFormat::Png)
            .with_resolution(Some(Resolution {
                width: 160,
                height: 90,
            }))
            .with_chunk_length(chunk_length);
        let extractor = Extractor::new(output, config);
        extractor.preflight().expect("preflight");
        extractor.run(&[MediaSource::Local(path.into())])
    };

    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let whole = directory.path().join("whole");
    let chunked = directory.path().join("chunked");

    let summary = run(&whole, Duration::from_secs(3600));
    assert!(summary.is_complete(), "{summary:?}");
    let report = &summary.sources[0];
    assert_eq!(report.frame_chunks_succeeded, 1);
    assert!(report.frames_written > 0);

    let first = frame_files(&report.frames_directory);
    assert_eq!(first.len() as u64, report.frames_written);
    assert!(first.iter().all(|name| name.starts_with("frame_") && name.ends_with(".png")));

    let again = run(&whole, Duration::from_secs(3600));
    assert_eq!(frame_files(&again.sources[0].frames_directory), first);

    let split = run(&chunked, Duration::from_secs(2));
    let report = &split.sources[0];
    assert!(report.frame_chunks_succeeded > 1);
    assert_eq!(report.frames_written as usize, first.len());

    let image = image::open(report.frames_directory.join(first.iter().next().expect("one frame")))
        .expect("Failed to read frame");
    assert_eq!((image.width(), image.height()), (160, 90));
}
