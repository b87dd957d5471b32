// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 越线检测 (Line-crossing detection)
//!
//! crossed = previous_bottom_y < line_y && bottom_y >= line_y
//!
//! 跟踪器在判定后覆盖位置,所以目标越线后停留在线下不会重复触发;
//! 首次出现即在线下的目标不会补发事件。

use chrono::NaiveDateTime;

use super::tracker::Observation;
use super::types::ClassificationEvent;

/// 判定线位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinePlacement {
    /// 固定像素
    Fixed(i32),
    /// 帧高比例
    Ratio(f32),
}

impl LinePlacement {
    pub fn resolve(&self, frame_height: u32) -> i32 {
        match *self {
            LinePlacement::Fixed(y) => y,
            LinePlacement::Ratio(ratio) => (frame_height as f32 * ratio) as i32,
        }
    }
}

/// 越线检测器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCrossingDetector {
    line_y: i32,
}

impl LineCrossingDetector {
    pub fn new(line_y: i32) -> Self {
        Self { line_y }
    }

    pub fn line_y(&self) -> i32 {
        self.line_y
    }

    pub fn crossed(&self, observation: &Observation) -> bool {
        match observation.previous_bottom_y {
            Some(previous) => previous < self.line_y && observation.bottom_y >= self.line_y,
            None => false,
        }
    }

    /// 本帧越线事件 (顺序同观测)
    pub fn detect(
        &self,
        observations: &[Observation],
        timestamp: NaiveDateTime,
    ) -> Vec<ClassificationEvent> {
        observations
            .iter()
            .filter(|o| self.crossed(o))
            .map(|o| ClassificationEvent::new(timestamp, o.detection.class))
            .collect()
    }
}
