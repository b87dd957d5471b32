// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理引擎统一接口
///
/// # 架构说明
///
/// 流水线不实现推理算法, 只消费推理引擎的预测结果:
/// ```text
/// 帧 → predict(frame, confidence) → Vec<RawDetection>
/// ```
/// 原始输出由 `Detection::from_raw` 校验后才进入跟踪器。
///
/// 同一帧 + 同一阈值必须得到相同结果 (可测试性)。
///
/// ## 实现
/// - **ReplayEngine**: 回放预先计算好的检测结果 (JSON Lines), 用于演示与测试
/// - 其他引擎 (ONNX/YOLO 等) 在外部实现本 trait
///
/// ## 使用示例
/// ```no_run
/// use qualiscan_rs::models::ReplayEngine;
///
/// let engine = ReplayEngine::load("detections.jsonl")?;
/// # Ok::<(), qualiscan_rs::error::InferenceError>(())
/// ```
pub mod replay;

pub use replay::ReplayEngine;

use crate::detection::types::RawDetection;
use crate::error::InferenceError;
use crate::input::Frame;

/// 推理引擎
pub trait InferenceEngine: Send {
    /// 预测: 帧 → 检测结果
    ///
    /// # Arguments
    /// * `frame` - 预处理后的帧
    /// * `confidence` - 置信度阈值, 低于阈值的结果不返回
    fn predict(&mut self, frame: &Frame, confidence: f32)
        -> Result<Vec<RawDetection>, InferenceError>;

    /// 引擎名称 (日志用)
    fn name(&self) -> &str {
        "engine"
    }
}

/// 引擎工厂: 每次启动新建一个引擎实例, 加载失败时拒绝启动
pub type EngineFactory =
    Box<dyn Fn() -> Result<Box<dyn InferenceEngine>, InferenceError> + Send + Sync>;
