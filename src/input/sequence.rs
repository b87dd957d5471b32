// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 图片序列输入 - 目录内按文件名排序的帧
//!
//! 读完最后一帧返回流结束, 由流水线决定重新打开 (循环回放)

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{is_image_path, Frame, FrameSource};
use crate::error::SourceError;

pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            descriptor: dir.display().to_string(),
            reason,
        };

        let entries = fs::read_dir(dir).map_err(|e| open_err(e.to_string()))?;
        let mut frames = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| open_err(e.to_string()))?.path();
            if path.is_file() && is_image_path(&path) {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(open_err("no image frames in directory".to_string()));
        }
        frames.sort();
        debug!(dir = %dir.display(), frames = frames.len(), "image sequence opened");

        Ok(Self { frames, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        let sequence = self.cursor as u64;
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        Ok(Some(Frame::new(image, sequence)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("002.png", 2u8), ("000.png", 0), ("001.png", 1)] {
            RgbImage::from_pixel(4, 4, Rgb([shade, 0, 0]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        for expected in 0..3u8 {
            let frame = source.read().unwrap().unwrap();
            assert_eq!(frame.sequence, expected as u64);
            assert_eq!(frame.image.get_pixel(0, 0)[0], expected);
        }
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(SourceError::Open { .. })
        ));
    }
}
