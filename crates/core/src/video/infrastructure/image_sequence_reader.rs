use std::path::{Path, PathBuf};

use crate::shared::constants::{DEFAULT_SEQUENCE_FPS, IMAGE_EXTENSIONS};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::{FrameResult, MonotonicClock, VideoReader};

/// Reads a directory of still images as a video at a fixed frame rate.
///
/// Files are ordered by name; frame `i` is stamped `i / fps`. Images are
/// decoded lazily so long sequences never sit in memory at once.
pub struct ImageSequenceReader {
    fps: f64,
    paths: Vec<PathBuf>,
    metadata: Option<VideoMetadata>,
}

impl ImageSequenceReader {
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            DEFAULT_SEQUENCE_FPS
        };
        Self {
            fps,
            paths: Vec::new(),
            metadata: None,
        }
    }
}

impl Default for ImageSequenceReader {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_FPS)
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn load_rgb(path: &Path, index: usize, timestamp_sec: f64) -> FrameResult {
    let img = image::open(path)
        .map_err(|e| format!("{}: {e}", path.display()))?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(
        img.into_raw(),
        width,
        height,
        3,
        index,
        timestamp_sec,
    ))
}

impl VideoReader for ImageSequenceReader {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        let paths = list_images(path)?;
        let first = paths
            .first()
            .ok_or_else(|| format!("no images in {}", path.display()))?;
        let (width, height) = image::image_dimensions(first)?;

        let metadata = VideoMetadata {
            width,
            height,
            fps: self.fps,
            total_frames: paths.len(),
            codec: String::new(),
            source_path: Some(path.to_path_buf()),
            rotation: 0,
        };
        log::debug!(
            "opened image sequence {} ({} frames @ {} fps)",
            path.display(),
            paths.len(),
            self.fps
        );
        self.paths = paths;
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        if self.metadata.is_none() {
            return Box::new(std::iter::once(Err(
                "ImageSequenceReader: not opened".into()
            )));
        }
        let mut clock = MonotonicClock::new(self.fps);
        Box::new(
            self.paths
                .iter()
                .enumerate()
                .map(move |(i, path)| load_rgb(path, i, clock.next(None, i))),
        )
    }

    fn close(&mut self) {
        self.paths.clear();
        self.metadata = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn write_sequence(dir: &Path, count: usize) {
        for i in 0..count {
            let img = image::RgbImage::from_pixel(8, 6, image::Rgb([10 * i as u8, 100, 200]));
            img.save(dir.join(format!("frame_{i:03}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }

    #[test]
    fn test_open_counts_images_only() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 4);

        let mut reader = ImageSequenceReader::new(20.0);
        let meta = reader.open(dir.path()).unwrap();
        assert_eq!(meta.total_frames, 4);
        assert_eq!((meta.width, meta.height), (8, 6));
        assert_eq!(meta.fps, 20.0);
        assert_eq!(meta.duration_sec(), Some(0.2));
    }

    #[test]
    fn test_frames_ordered_and_stamped() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 3);

        let mut reader = ImageSequenceReader::new(10.0);
        reader.open(dir.path()).unwrap();
        let frames: Vec<Frame> = reader.frames().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_relative_eq!(frame.timestamp_sec(), i as f64 * 0.1);
            assert_eq!(frame.data()[0], 10 * i as u8);
        }
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = ImageSequenceReader::default();
        assert!(reader.open(dir.path()).is_err());
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = ImageSequenceReader::default();
        assert!(reader.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_invalid_rate_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 1);
        let mut reader = ImageSequenceReader::new(f64::NAN);
        assert_eq!(reader.open(dir.path()).unwrap().fps, DEFAULT_SEQUENCE_FPS);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b/face.PNG")));
        assert!(is_image_file(Path::new("shot.jpeg")));
        assert!(!is_image_file(Path::new("clip.mp4")));
        assert!(!is_image_file(Path::new("README")));
    }
}
