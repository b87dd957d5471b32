// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测流水线 (Detection Pipeline)
///
/// 单工作线程架构, 通过 crossbeam 通道向消费端发送事件:
/// - Controller: start / stop / toggle_pause (调用方线程)
/// - Worker:     读帧 → 推理 → 跟踪 → 越线 → 看门狗 (独立线程)
/// - Consumer:   按产生顺序处理事件 (见 `crate::consumer`)
///
/// 状态机: Idle → Running ⇄ Paused → Stopped
pub mod annotate;
pub mod control;
pub mod controller;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

pub use annotate::Annotator;
pub use control::Control;
pub use controller::Pipeline;
pub use worker::Worker;

use crate::detection::types::{ClassCounts, ClassificationEvent};

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Paused,
    /// 终态, 重新 start 会创建新的工作线程
    Stopped,
}

// ========== 事件定义 ==========

/// 单帧统计 (工作线程 → 消费端)
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSummary {
    pub frame_index: u64,
    pub objects_detected: usize,
    pub processing_time: Duration,
    pub counts: ClassCounts,
}

/// 流水线事件
///
/// 同一通道按产生顺序投递, 每类事件内部顺序与产生顺序一致
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// 标注后的帧
    FrameReady(Arc<RgbImage>),
    /// 越线分类结果
    Classification(ClassificationEvent),
    /// 日志文本
    Log(String),
    /// 单帧统计
    Summary(DetectionSummary),
    /// 阈值告警
    Warning(String),
    /// 暂停状态变化 (true = 已暂停)
    PauseChanged(bool),
}
