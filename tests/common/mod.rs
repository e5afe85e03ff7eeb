//! In-memory frame sources shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use framesift::{FrameSample, FrameSource, SiftError};
use image::{Rgb, RgbImage};

/// Produces the picture for a given frame index.
pub type Painter = Box<dyn Fn(u64) -> RgbImage>;

/// A fake decoder over `count` frames at `fps`, painted on demand.
pub struct SyntheticVideo {
    fps: f64,
    count: u64,
    cursor: u64,
    fail_at: Option<u64>,
    painter: Painter,
}

impl SyntheticVideo {
    pub fn new(fps: f64, count: u64, painter: Painter) -> Self {
        Self {
            fps,
            count,
            cursor: 0,
            fail_at: None,
            painter,
        }
    }

    /// Uniform frames of one color.
    pub fn solid(fps: f64, count: u64, value: u8) -> Self {
        Self::new(
            fps,
            count,
            Box::new(move |_| RgbImage::from_pixel(16, 16, Rgb([value; 3]))),
        )
    }

    /// Report a decode error instead of frame `index`.
    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl FrameSource for SyntheticVideo {
    fn frames_per_second(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.count
    }

    fn seek_to_frame(&mut self, index: u64) -> Result<(), SiftError> {
        self.cursor = index.min(self.count);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<FrameSample>, SiftError> {
        if self.cursor >= self.count {
            return Ok(None);
        }
        let index = self.cursor;
        if self.fail_at == Some(index) {
            return Err(SiftError::VideoDecode(format!("corrupt packet at frame {index}")));
        }
        self.cursor += 1;
        Ok(Some(FrameSample {
            index,
            timestamp: Duration::from_secs_f64(index as f64 / self.fps),
            image: (self.painter)(index),
        }))
    }
}

/// A black 64×64 frame with a white `size`×`size` square at (`x`, `y`).
pub fn square(x: u32, y: u32, size: u32) -> RgbImage {
    let mut image = RgbImage::new(64, 64);
    for row in y..y + size {
        for column in x..x + size {
            image.put_pixel(column, row, Rgb([255, 255, 255]));
        }
    }
    image
}

pub fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}
