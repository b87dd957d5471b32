// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧标注: 判定线 + 检测框 + 类别标签

use std::fs;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::types::Detection;
use crate::error::ConfigError;

/// 判定线颜色 (黄)
const LINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_SCALE: f32 = 18.0;

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::plain()
    }
}

impl Annotator {
    /// 不带字体: 只画线和框
    pub fn plain() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    /// 加载 TTF/OTF 字体用于标签
    pub fn with_font(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| ConfigError::Invalid {
            field: "font_path",
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(Self {
            font: Some(font),
            scale: PxScale::from(LABEL_SCALE),
        })
    }

    pub fn annotate(&self, image: &mut RgbImage, detections: &[Detection], line_y: i32) {
        let width = image.width() as f32;

        // 判定线 (2px)
        for dy in 0..2 {
            let y = (line_y + dy) as f32;
            draw_line_segment_mut(image, (0.0, y), (width, y), LINE_COLOR);
        }

        for det in detections {
            let color = Rgb(det.class.color());
            let x = det.bbox.x1 as i32;
            let y = det.bbox.y1 as i32;
            let w = (det.bbox.width() as u32).max(1);
            let h = (det.bbox.height() as u32).max(1);
            draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), color);

            if let Some(font) = &self.font {
                let label = format!("{}: {:.2}", det.class.label(), det.confidence);
                let text_y = (y - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(image, color, x, text_y, self.scale, font, &label);
            }
        }
    }
}
