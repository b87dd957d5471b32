// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 质检系统数据结构定义
/// Data structures for the inspection pipeline
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

// ========== 枚举类型 ==========

/// 质检类别 (模型类别ID: 0=Damaged-Open, 1=Damaged-Deformed, 2=Intact)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefectClass {
    DamagedOpen,
    DamagedDeformed,
    Intact,
}

impl DefectClass {
    pub const ALL: [DefectClass; 3] = [
        DefectClass::DamagedOpen,
        DefectClass::DamagedDeformed,
        DefectClass::Intact,
    ];

    pub fn from_class_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Self::DamagedOpen),
            1 => Some(Self::DamagedDeformed),
            2 => Some(Self::Intact),
            _ => None,
        }
    }

    pub fn class_id(&self) -> u32 {
        match self {
            Self::DamagedOpen => 0,
            Self::DamagedDeformed => 1,
            Self::Intact => 2,
        }
    }

    /// 显示/存储用标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::DamagedOpen => "Damaged-Open",
            Self::DamagedDeformed => "Damaged-Deformed",
            Self::Intact => "Intact",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    pub fn is_defective(&self) -> bool {
        !matches!(self, Self::Intact)
    }

    /// 事件描述 (写入事件日志)
    pub fn details(&self) -> &'static str {
        match self {
            Self::DamagedOpen => "Box is improperly sealed or open.",
            Self::DamagedDeformed => "Box is deformed or punctured.",
            Self::Intact => "Box is intact and properly sealed.",
        }
    }

    /// 标注颜色 (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            Self::DamagedOpen => [255, 0, 0],
            Self::DamagedDeformed => [0, 0, 255],
            Self::Intact => [0, 255, 0],
        }
    }
}

impl std::fmt::Display for DefectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ========== 数据结构 ==========

/// 坐标绝对值上限 (像素); 超出视为异常输出
pub const MAX_COORDINATE: f32 = 1.0e6;

/// 检测框 (x1, y1) 左上, (x2, y2) 右下
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 底边 (整数像素)
    pub fn bottom(&self) -> i32 {
        self.y2 as i32
    }

    fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite() && v.abs() <= MAX_COORDINATE)
            && self.x1 <= self.x2
            && self.y1 <= self.y2
    }
}

/// 推理引擎原始输出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
    pub class_id: u32,
    pub confidence: f32,
}

/// 已校验的检测结果 (每帧新建,不可变)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub class: DefectClass,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class: DefectClass, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
        }
    }

    /// 校验原始输出
    ///
    /// 未知类别返回 `Ok(None)` (逐框丢弃); 几何或置信度异常返回 `Malformed` (整帧跳过)
    pub fn from_raw(raw: &RawDetection) -> Result<Option<Self>, InferenceError> {
        let [x1, y1, x2, y2] = raw.bbox;
        let bbox = BBox::new(x1, y1, x2, y2);
        if !bbox.is_well_formed() {
            return Err(InferenceError::Malformed(format!(
                "invalid box {:?}",
                raw.bbox
            )));
        }
        if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
            return Err(InferenceError::Malformed(format!(
                "confidence {} out of range",
                raw.confidence
            )));
        }
        Ok(DefectClass::from_class_id(raw.class_id)
            .map(|class| Self::new(bbox, class, raw.confidence)))
    }
}

/// 分类事件 (每次越线恰好产生一次)
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationEvent {
    pub timestamp: NaiveDateTime,
    pub class: DefectClass,
    pub details: String,
}

impl ClassificationEvent {
    pub fn new(timestamp: NaiveDateTime, class: DefectClass) -> Self {
        Self {
            timestamp,
            class,
            details: class.details().to_string(),
        }
    }
}

/// 各类别计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub intact: u64,
    pub damaged_deformed: u64,
    pub damaged_open: u64,
}

impl ClassCounts {
    pub fn add(&mut self, class: DefectClass) {
        match class {
            DefectClass::Intact => self.intact += 1,
            DefectClass::DamagedDeformed => self.damaged_deformed += 1,
            DefectClass::DamagedOpen => self.damaged_open += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.intact + self.damaged_deformed + self.damaged_open
    }

    pub fn defective(&self) -> u64 {
        self.damaged_deformed + self.damaged_open
    }

    pub fn get(&self, class: DefectClass) -> u64 {
        match class {
            DefectClass::Intact => self.intact,
            DefectClass::DamagedDeformed => self.damaged_deformed,
            DefectClass::DamagedOpen => self.damaged_open,
        }
    }
}

impl FromIterator<DefectClass> for ClassCounts {
    fn from_iter<I: IntoIterator<Item = DefectClass>>(iter: I) -> Self {
        let mut counts = Self::default();
        for class in iter {
            counts.add(class);
        }
        counts
    }
}
