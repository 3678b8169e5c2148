use crate::components::acquisition::parameters::ParameterSet;
use crate::devices::hardware::camera::Buffer;
use crate::error::Result;
use crate::utils::image::CapturedImage;
use chrono::{DateTime, TimeZone};
use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Writes buffers of one session as numbered PNG files into a single
/// directory. File names are `<prefix>_<index>.png` with the index zero
/// padded to four digits, so a path only depends on the directory, the
/// prefix and the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWriter {
    /// Session directory, created on the first write.
    directory: PathBuf,
    /// File name prefix.
    prefix: String,
}

impl ImageWriter {
    /// Writer for an explicit directory.
    ///
    /// * `directory`: where the images go, created recursively when missing.
    /// * `prefix`: file name prefix.
    pub fn new<P: Into<PathBuf>>(directory: P, prefix: &str) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.to_string(),
        }
    }

    /// Writer for the session directory of a session started at `started`.
    pub fn for_session<Tz>(parameters: &ParameterSet, started: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self::new(parameters.session_directory(started), &parameters.image_prefix)
    }

    /// Directory the images are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the image with number `index`.
    pub fn image_path(&self, index: usize) -> PathBuf {
        self.directory
            .join(format!("{}_{:04}.png", self.prefix, index))
    }

    /// Reshape `buffer` and write it as image number `index`. Conversion
    /// problems come back as `InvalidBuffer`/`UnsupportedPixelFormat`,
    /// filesystem and codec problems as `Io`/`Image`.
    pub fn persist(&self, buffer: &Buffer, index: usize) -> Result<PathBuf> {
        debug!("Converting frame {} to an image array", buffer.frame_id);
        let image = CapturedImage::from_buffer(buffer)?;

        create_dir_all(&self.directory)?;
        let path = self.image_path(index);
        image.save_png(&path)?;
        info!(
            "Saved {}x{} image path is: {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::hardware::camera::PixelFormat;
    use crate::error::CaptureError;
    use chrono::Utc;
    use rstest::rstest;

    fn mono8(width: u32, height: u32, data: Vec<u8>, has_chunk_data: bool) -> Buffer {
        Buffer {
            frame_id: 0,
            width,
            height,
            bits_per_pixel: 8,
            pixel_format: PixelFormat::Mono8,
            has_chunk_data,
            data,
        }
    }

    #[rstest]
    #[case(0, "capture_0000.png")]
    #[case(7, "capture_0007.png")]
    #[case(42, "capture_0042.png")]
    #[case(9999, "capture_9999.png")]
    fn test_image_names_are_zero_padded(#[case] index: usize, #[case] name: &str) {
        let writer = ImageWriter::new("/data/session", "capture");
        assert_eq!(writer.image_path(index), PathBuf::from("/data/session").join(name));
    }

    #[test]
    fn test_session_writer_uses_parameters() {
        let parameters = ParameterSet {
            image_prefix: String::from("bench"),
            ..Default::default()
        };
        let started = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("valid date");
        let writer = ImageWriter::for_session(&parameters, &started);
        assert_eq!(
            writer.image_path(3),
            PathBuf::from("./captured_images/_2024_01_02_03_04/bench_0003.png")
        );
    }

    #[test]
    fn test_persist_then_read_back_is_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path().join("nested/session"), "capture");
        let pixels: Vec<u8> = (0..48).map(|v| (v * 5) as u8).collect();

        let path = writer
            .persist(&mono8(8, 6, pixels.clone(), false), 1)
            .expect("persist");
        assert!(path.ends_with("capture_0001.png"));

        let read = image::open(&path).expect("png").into_luma8();
        assert_eq!(read.dimensions(), (8, 6));
        assert_eq!(read.into_raw(), pixels);
    }

    #[test]
    fn test_chunk_trailer_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let mut data: Vec<u8> = (0..12).collect();
        data.extend_from_slice(&[0xEE; 5]);

        let path = writer.persist(&mono8(4, 3, data, true), 0).expect("persist");
        let read = image::open(&path).expect("png").into_luma8();
        assert_eq!(read.into_raw(), (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_sixteen_bit_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let samples: Vec<u16> = vec![0, 1, 1023, 4095, 65535, 300];
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let buffer = Buffer {
            frame_id: 0,
            width: 3,
            height: 2,
            bits_per_pixel: 16,
            pixel_format: PixelFormat::Mono16,
            has_chunk_data: false,
            data,
        };

        let path = writer.persist(&buffer, 0).expect("persist");
        let read = image::open(&path).expect("png").into_luma16();
        assert_eq!(read.into_raw(), samples);
    }

    #[test]
    fn test_unwritable_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("not_a_directory");
        std::fs::write(&blocker, b"file").expect("blocker file");
        let writer = ImageWriter::new(&blocker, "capture");

        let result = writer.persist(&mono8(2, 2, vec![0; 4], false), 0);
        match result {
            Err(e) => assert!(e.is_persistence_failure(), "unexpected error {e}"),
            Ok(path) => panic!("persisted into a file path {path:?}"),
        }
    }

    #[test]
    fn test_conversion_failure_is_not_a_persistence_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ImageWriter::new(dir.path(), "capture");
        let result = writer.persist(&mono8(4, 4, vec![0; 3], false), 0);
        assert!(matches!(result, Err(CaptureError::InvalidBuffer(_))));
    }
}
