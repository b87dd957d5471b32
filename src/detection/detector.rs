// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//! 职责: 帧 → 推理引擎 → 校验 → 跟踪器 → 越线判定 → 分类事件

use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use tracing::debug;

use super::line_crossing::{LineCrossingDetector, LinePlacement};
use super::tracker::{IdentityAssigner, MidpointIdentity, ObjectTracker};
use super::types::{ClassCounts, ClassificationEvent, Detection};
use crate::error::InferenceError;
use crate::input::Frame;
use crate::models::InferenceEngine;

/// 单帧分析结果
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    /// 本帧越线产生的分类事件
    pub events: Vec<ClassificationEvent>,
    /// 本帧所有检测框的类别计数
    pub counts: ClassCounts,
    pub line_y: i32,
    pub inference_time: Duration,
    /// 因未知类别丢弃的检测框数
    pub dropped: usize,
}

pub struct Detector<A = MidpointIdentity> {
    engine: Box<dyn InferenceEngine>,
    confidence: f32,
    placement: LinePlacement,
    crossing: Option<LineCrossingDetector>,
    tracker: ObjectTracker<A>,
}

impl Detector<MidpointIdentity> {
    pub fn new(engine: Box<dyn InferenceEngine>, confidence: f32, placement: LinePlacement) -> Self {
        Self::with_tracker(engine, confidence, placement, ObjectTracker::new())
    }
}

impl<A: IdentityAssigner> Detector<A> {
    pub fn with_tracker(
        engine: Box<dyn InferenceEngine>,
        confidence: f32,
        placement: LinePlacement,
        tracker: ObjectTracker<A>,
    ) -> Self {
        Self {
            engine,
            confidence,
            placement,
            crossing: None,
            tracker,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// 判定线 (首帧之前为 None)
    pub fn line_y(&self) -> Option<i32> {
        self.crossing.map(|c| c.line_y())
    }

    /// 显式移动判定线: 同时清空跟踪器, 避免旧位置在新线下误判
    pub fn reset_line(&mut self, line_y: i32) {
        self.placement = LinePlacement::Fixed(line_y);
        self.crossing = Some(LineCrossingDetector::new(line_y));
        self.tracker.reset();
    }

    /// 处理单帧
    ///
    /// 推理失败或输出异常时返回错误, 跟踪状态保持不变 (调用方跳过该帧)
    pub fn analyze(
        &mut self,
        frame: &Frame,
        timestamp: NaiveDateTime,
    ) -> Result<FrameAnalysis, InferenceError> {
        let placement = self.placement;
        let crossing = *self
            .crossing
            .get_or_insert_with(|| LineCrossingDetector::new(placement.resolve(frame.height())));

        // 1. 推理
        let start = Instant::now();
        let raw = self.engine.predict(frame, self.confidence)?;
        let inference_time = start.elapsed();

        // 2. 校验
        let mut detections = Vec::with_capacity(raw.len());
        let mut dropped = 0;
        for r in &raw {
            match Detection::from_raw(r)? {
                Some(d) => detections.push(d),
                None => {
                    dropped += 1;
                    debug!(class_id = r.class_id, "unknown class dropped");
                }
            }
        }

        // 3. 跟踪 + 越线
        let observations = self.tracker.update(&detections);
        let events = crossing.detect(&observations, timestamp);
        let counts = detections.iter().map(|d| d.class).collect();

        Ok(FrameAnalysis {
            detections,
            events,
            counts,
            line_y: crossing.line_y(),
            inference_time,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{DefectClass, RawDetection};
    use image::RgbImage;
    use std::collections::VecDeque;

    /// 按调用顺序返回预设结果
    struct Scripted(VecDeque<Result<Vec<RawDetection>, InferenceError>>);

    impl InferenceEngine for Scripted {
        fn predict(&mut self, _: &Frame, _: f32) -> Result<Vec<RawDetection>, InferenceError> {
            self.0.pop_front().unwrap_or(Ok(Vec::new()))
        }
    }

    fn raw(x: f32, y2: f32, class_id: u32) -> RawDetection {
        RawDetection {
            bbox: [x, y2 - 40.0, x + 50.0, y2],
            class_id,
            confidence: 0.9,
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(800, 600), 0)
    }

    fn detector(script: Vec<Result<Vec<RawDetection>, InferenceError>>) -> Detector {
        Detector::new(
            Box::new(Scripted(script.into())),
            0.5,
            LinePlacement::Ratio(0.35),
        )
    }

    #[test]
    fn test_default_line_from_frame_height() {
        let mut det = detector(vec![Ok(vec![])]);
        assert_eq!(det.line_y(), None);
        let analysis = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert_eq!(analysis.line_y, 210);
        assert_eq!(det.line_y(), Some(210));
    }

    #[test]
    fn test_crossing_produces_event() {
        let mut det = detector(vec![
            Ok(vec![raw(100.0, 200.0, 0), raw(400.0, 100.0, 2)]),
            Ok(vec![raw(100.0, 215.0, 0), raw(400.0, 120.0, 2)]),
        ]);
        let first = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert!(first.events.is_empty());
        assert_eq!(first.counts.total(), 2);

        let second = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].class, DefectClass::DamagedOpen);
    }

    #[test]
    fn test_unknown_class_dropped_not_fatal() {
        let mut det = detector(vec![Ok(vec![raw(100.0, 200.0, 9), raw(300.0, 200.0, 2)])]);
        let analysis = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert_eq!(analysis.dropped, 1);
        assert_eq!(analysis.detections.len(), 1);
    }

    #[test]
    fn test_engine_error_leaves_tracker_untouched() {
        let mut det = detector(vec![
            Ok(vec![raw(100.0, 200.0, 1)]),
            Err(InferenceError::Engine("gpu lost".to_string())),
            Ok(vec![raw(100.0, 230.0, 1)]),
        ]);
        det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert!(det.analyze(&frame(), NaiveDateTime::default()).is_err());
        let third = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        assert_eq!(third.events.len(), 1);
    }

    #[test]
    fn test_malformed_output_skips_frame() {
        let mut bad = raw(100.0, 200.0, 2);
        bad.confidence = 2.0;
        let mut det = detector(vec![Ok(vec![bad])]);
        assert!(matches!(
            det.analyze(&frame(), NaiveDateTime::default()),
            Err(InferenceError::Malformed(_))
        ));
    }

    #[test]
    fn test_reset_line_clears_tracks() {
        let mut det = detector(vec![
            Ok(vec![raw(100.0, 200.0, 2)]),
            Ok(vec![raw(100.0, 260.0, 2)]),
        ]);
        det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        det.reset_line(250);
        let analysis = det.analyze(&frame(), NaiveDateTime::default()).unwrap();
        // 重置后首次出现, 不补发
        assert!(analysis.events.is_empty());
        assert_eq!(analysis.line_y, 250);
    }
}
