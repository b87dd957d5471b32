// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单张图片输入 - 读出一帧后结束

use std::path::Path;

use tracing::debug;

use super::{Frame, FrameSource};
use crate::error::SourceError;

pub struct StillImageSource {
    frame: Option<Frame>,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let image = image::open(path)
            .map_err(|source| SourceError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        debug!(path = %path.display(), width = image.width(), height = image.height(), "still image opened");

        Ok(Self {
            frame: Some(Frame::new(image, 0)),
        })
    }
}

impl FrameSource for StillImageSource {
    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frame.take())
    }
}
