// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 流水线配置参数
pub mod consumer; // 事件消费端
pub mod detection; // 跟踪 / 越线 / 看门狗
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod models; // 推理引擎接口
pub mod pipeline; // 检测流水线
pub mod store; // 质检结果存储

pub use crate::config::PipelineConfig;
pub use crate::consumer::{EventDispatcher, EventHandler, LogForwarder, SessionTally, StoreRecorder};
pub use crate::detection::{ClassificationEvent, DefectClass, Detection};
pub use crate::error::{ConfigError, InferenceError, PipelineError, SourceError, StoreError};
pub use crate::input::{FileSourceOpener, Frame, FrameSource, SourceDescriptor, SourceOpener};
pub use crate::models::{EngineFactory, InferenceEngine, ReplayEngine};
pub use crate::pipeline::{DetectionSummary, Pipeline, PipelineEvent, PipelineState};
pub use crate::store::AggregationStore;
