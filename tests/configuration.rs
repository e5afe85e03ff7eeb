//! Job files and configuration validation.

use std::{fs, time::Duration};

use framesift::{
    AudioBitrate, AudioFormat, ExtractionConfig, Extractor, ImageFormat, JobFile, Resolution,
    SamplingMethod, SiftError,
};

// ── Job files ────────────────────────────────────────────────────

#[test]
fn job_file_loads_from_disk() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = directory.path().join("job.json");
    fs::write(
        &path,
        r#"{
            "input": "lectures/",
            "output": "frames/",
            "frames": { "method": "interval", "interval_seconds": 2.5, "format": "png" },
            "audio": { "format": "m4a", "bitrate": "128k" },
            "transcode_timeout_seconds": 60
        }"#,
    )
    .expect("write job");

    let job = JobFile::load(&path).expect("load");
    assert_eq!(job.input.as_deref(), Some("lectures/"));

    let config = job.to_config().expect("config");
    assert_eq!(
        config.method(),
        SamplingMethod::FixedInterval {
            interval: Duration::from_millis(2500)
        }
    );
    assert_eq!(config.image_format(), ImageFormat::Png);
    let audio = config.audio().expect("audio enabled");
    assert_eq!(audio.format, AudioFormat::M4a);
    assert_eq!(audio.bitrate, AudioBitrate::K128);
}

#[test]
fn unknown_key_names_the_file() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = directory.path().join("job.json");
    fs::write(&path, r#"{ "output": "out", "chunk_size": 10 }"#).expect("write job");

    let error = JobFile::load(&path).unwrap_err();
    assert!(matches!(error, SiftError::Config { .. }));
    assert!(error.is_fatal());
    let message = error.to_string();
    assert!(message.contains("chunk_size"), "{message}");
    assert!(message.contains("job.json"), "{message}");
}

#[test]
fn bad_method_parameters_are_rejected() {
    for text in [
        r#"{ "frames": { "method": "fps", "fps": 0 } }"#,
        r#"{ "frames": { "method": "interval", "interval_seconds": -1 } }"#,
        r#"{ "frames": { "method": "change", "change_threshold": 2 } }"#,
        r#"{ "frames": { "resolution": "wide" } }"#,
        r#"{ "frames": { "format": "bmp" } }"#,
    ] {
        let job = JobFile::parse(text).expect("parses");
        assert!(job.to_config().is_err(), "{text} should be rejected");
    }
}

// ── Builder ──────────────────────────────────────────────────────

#[test]
fn preflight_rejects_invalid_config_before_touching_disk() {
    let directory = tempfile::tempdir().expect("tempdir");
    let output = directory.path().join("never-created");
    let config = ExtractionConfig::new().with_chunk_length(Duration::ZERO);

    let error = Extractor::new(&output, config).preflight().unwrap_err();
    assert!(matches!(error, SiftError::InvalidParameter { .. }));
    assert!(!output.exists());
}

#[test]
fn zero_sized_resolution_is_rejected() {
    let config = ExtractionConfig::new().with_resolution(Some(Resolution {
        width: 0,
        height: 720,
    }));
    assert!(matches!(
        config.validate(),
        Err(SiftError::UnsupportedParameter { .. })
    ));
}

#[test]
fn preflight_creates_output_root() {
    let directory = tempfile::tempdir().expect("tempdir");
    let output = directory.path().join("out/nested");
    Extractor::new(&output, ExtractionConfig::new())
        .preflight()
        .expect("preflight");
    assert!(output.is_dir());
}

#[test]
fn source_workers_never_drop_below_one() {
    assert_eq!(ExtractionConfig::new().source_workers(), 2);
    assert_eq!(ExtractionConfig::new().with_source_workers(0).source_workers(), 1);
}
