// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Frame Source)
///
/// 流水线只依赖两个接口:
/// - SourceOpener: open(descriptor) → 输入源
/// - FrameSource:  read() → 帧 / 流结束; 释放即 Drop
///
/// 内置实现:
/// - StillImageSource:    单张图片
/// - ImageSequenceSource: 图片序列目录 (文件回放)
///
/// 摄像头与视频容器解码由外部 SourceOpener 提供
pub mod frame;
pub mod sequence;
pub mod still;

use std::fmt;
use std::path::{Path, PathBuf};

pub use frame::Frame;
pub use sequence::ImageSequenceSource;
pub use still::StillImageSource;

use crate::error::SourceError;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// 输入源描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// 本地摄像头设备索引
    Camera(u32),
    /// 文件输入 (流结束后重新打开)
    File(PathBuf),
    /// 单张图片 (只处理一次)
    Image(PathBuf),
}

impl SourceDescriptor {
    /// 解析命令行输入: 纯数字 → 摄像头, 图片扩展名 → 单张图片, 其他 → 文件
    pub fn parse(input: &str) -> Self {
        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = input.parse() {
                return Self::Camera(index);
            }
        }
        let path = PathBuf::from(input);
        if is_image_path(&path) {
            Self::Image(path)
        } else {
            Self::File(path)
        }
    }

    pub fn is_still(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera:{}", index),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Image(path) => write!(f, "image:{}", path.display()),
        }
    }
}

/// 帧输入源
pub trait FrameSource: Send {
    /// 读取下一帧; `Ok(None)` 表示流结束
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// 输入源打开器
pub trait SourceOpener: Send + Sync {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// 内置打开器: 单张图片 + 图片序列目录
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceOpener;

impl SourceOpener for FileSourceOpener {
    fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, SourceError> {
        match descriptor {
            SourceDescriptor::Image(path) => Ok(Box::new(StillImageSource::open(path)?)),
            SourceDescriptor::File(path) if path.is_dir() => {
                Ok(Box::new(ImageSequenceSource::open(path)?))
            }
            SourceDescriptor::File(path) if !path.exists() => Err(SourceError::Open {
                descriptor: descriptor.to_string(),
                reason: "no such file or directory".to_string(),
            }),
            SourceDescriptor::File(_) | SourceDescriptor::Camera(_) => {
                Err(SourceError::Unsupported(descriptor.to_string()))
            }
        }
    }
}

pub(crate) fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        assert_eq!(SourceDescriptor::parse("0"), SourceDescriptor::Camera(0));
        assert_eq!(
            SourceDescriptor::parse("shots/box.JPG"),
            SourceDescriptor::Image(PathBuf::from("shots/box.JPG"))
        );
        assert_eq!(
            SourceDescriptor::parse("line3/frames"),
            SourceDescriptor::File(PathBuf::from("line3/frames"))
        );
        assert!(SourceDescriptor::parse("a.tiff").is_still());
    }

    #[test]
    fn test_opener_rejects_camera_and_missing_files() {
        let opener = FileSourceOpener;
        assert!(matches!(
            opener.open(&SourceDescriptor::Camera(0)),
            Err(SourceError::Unsupported(_))
        ));
        assert!(matches!(
            opener.open(&SourceDescriptor::File(PathBuf::from("/definitely/not/here"))),
            Err(SourceError::Open { .. })
        ));
    }
}
