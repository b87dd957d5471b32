// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频帧与预处理
/// Frame buffer and resize
use fast_image_resize as fr;
use image::RgbImage;

use crate::error::SourceError;

/// 单帧图像 (一次循环内产生并消费)
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// 本次打开输入源后的帧序号 (从0开始)
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 缩放到目标尺寸 (fast_image_resize, 双线性插值)
    pub fn resized(self, width: u32, height: u32) -> Result<Frame, SourceError> {
        if self.width() == width && self.height() == height {
            return Ok(self);
        }

        let (src_w, src_h) = (self.width(), self.height());
        let src_image =
            fr::images::Image::from_vec_u8(src_w, src_h, self.image.into_raw(), fr::PixelType::U8x3)
                .map_err(|e| SourceError::Read(format!("frame buffer: {}", e)))?;

        let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(
                &src_image,
                &mut dst_image,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| SourceError::Read(format!("resize {}x{} -> {}x{}: {}", src_w, src_h, width, height, e)))?;

        let image = RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
            .ok_or_else(|| SourceError::Read("resized buffer size mismatch".to_string()))?;

        Ok(Frame::new(image, self.sequence))
    }
}
