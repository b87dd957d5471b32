// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// 流水线工作线程内的单帧逻辑
/// - Detector:  推理 + 校验 + 跟踪 + 越线
/// - Tracker:   水平中点身份跟踪
/// - Crossing:  越线判定
/// - Watchdog:  连续缺陷看门狗
pub mod detector;
pub mod line_crossing;
pub mod tracker;
pub mod types;
pub mod watchdog;

pub use detector::{Detector, FrameAnalysis};
pub use line_crossing::{LineCrossingDetector, LinePlacement};
pub use tracker::{IdentityAssigner, MidpointIdentity, ObjectId, ObjectTracker, Observation, TrackedObject};
pub use types::{BBox, ClassCounts, ClassificationEvent, DefectClass, Detection, RawDetection};
pub use watchdog::{DefectWatchdog, WatchdogVerdict};
