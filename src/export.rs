//! Writing sampled frames to disk.
//!
//! File names are derived from the frame's index in the source, so names
//! never collide across chunks and re-running a job overwrites the same
//! set of files.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{
    RgbImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType as PngFilter, PngEncoder},
    },
    imageops::{self, FilterType},
};

use crate::{
    configuration::{ImageFormat, Resolution},
    error::SiftError,
    frame::FrameSample,
};

/// JPEG quality used for every exported frame.
pub const JPEG_QUALITY: u8 = 95;

/// File name for the frame at `index`: `frame_000042.jpg`.
///
/// Indices are padded to six digits, so names sort in timeline order up to
/// frame 999 999 (over nine hours at 30 fps). Later indices get a seventh
/// digit and only sort correctly when compared numerically.
pub fn frame_file_name(index: u64, format: ImageFormat) -> String {
    format!("frame_{index:06}.{}", format.extension())
}

/// Encodes frames into one directory.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    directory: PathBuf,
    format: ImageFormat,
    resolution: Option<Resolution>,
}

impl FrameWriter {
    /// Write into `directory`, which must already exist.
    pub fn new(directory: impl Into<PathBuf>, format: ImageFormat) -> Self {
        Self {
            directory: directory.into(),
            format,
            resolution: None,
        }
    }

    /// Resize every frame to exactly this size before encoding.
    #[must_use]
    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Target directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where the frame at `index` is written.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.directory.join(frame_file_name(index, self.format))
    }

    /// Encode one frame, replacing any existing file of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Io`] if the file cannot be created and
    /// [`SiftError::Image`] if encoding fails.
    pub fn write(&self, frame: &FrameSample) -> Result<PathBuf, SiftError> {
        let path = self.path_for(frame.index);

        let resized;
        let image: &RgbImage = match self.resolution {
            Some(Resolution { width, height })
                if (width, height) != frame.image.dimensions() =>
            {
                resized = imageops::resize(&frame.image, width, height, FilterType::Triangle);
                &resized
            }
            _ => &frame.image,
        };

        encode_to(image, self.format, &path)?;

        log::trace!("Wrote {}", path.display());
        Ok(path)
    }
}

/// Encode `image` into `path`, including the final flush.
fn encode_to(image: &RgbImage, format: ImageFormat, path: &Path) -> Result<(), SiftError> {
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        ImageFormat::Jpg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?
        }
        ImageFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
            &mut writer,
            CompressionType::Best,
            PngFilter::Adaptive,
        ))?,
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::Rgb;

    use super::*;

    fn sample(index: u64) -> FrameSample {
        FrameSample {
            index,
            timestamp: Duration::ZERO,
            image: RgbImage::from_pixel(32, 24, Rgb([10, 200, 30])),
        }
    }

    #[test]
    fn names_are_zero_padded() {
        assert_eq!(frame_file_name(42, ImageFormat::Jpg), "frame_000042.jpg");
        assert_eq!(frame_file_name(1_234_567, ImageFormat::Png), "frame_1234567.png");
    }

    #[test]
    fn names_sort_in_timeline_order_below_a_million() {
        let mut names: Vec<String> = [999_999, 10, 100_000, 0, 99_999]
            .iter()
            .map(|&index| frame_file_name(index, ImageFormat::Jpg))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "frame_000000.jpg",
                "frame_000010.jpg",
                "frame_099999.jpg",
                "frame_100000.jpg",
                "frame_999999.jpg",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn full_disk_is_an_error() {
        let image = sample(0).image;
        for format in [ImageFormat::Jpg, ImageFormat::Png] {
            let result = encode_to(&image, format, Path::new("/dev/full"));
            assert!(result.is_err(), "{format} write to a full device reported success");
        }
    }

    #[test]
    fn writes_and_resizes() {
        let directory = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(directory.path(), ImageFormat::Png)
            .with_resolution(Some(Resolution { width: 16, height: 8 }));
        let path = writer.write(&sample(7)).unwrap();
        assert_eq!(path, directory.path().join("frame_000007.png"));
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn rewriting_replaces_the_file() {
        let directory = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(directory.path(), ImageFormat::Jpg);
        writer.write(&sample(3)).unwrap();
        writer.write(&sample(3)).unwrap();
        assert_eq!(std::fs::read_dir(directory.path()).unwrap().count(), 1);
    }
}
