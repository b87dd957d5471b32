// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测工作线程 (Detection Worker)
//! 职责: 读帧 → 抽帧 → 缩放 → 检测 → 越线事件 → 看门狗 → 发送事件
//!
//! 每次 start 新建一个 Worker, 跟踪表与看门狗计数随 Worker 销毁。

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, SubsecRound};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::annotate::Annotator;
use super::control::Control;
use super::{DetectionSummary, PipelineEvent};
use crate::config::PipelineConfig;
use crate::detection::{DefectWatchdog, Detector, WatchdogVerdict};
use crate::error::SourceError;
use crate::input::{Frame, FrameSource, SourceDescriptor, SourceOpener};
use crate::models::InferenceEngine;

const END_OF_STREAM: &str = "End of video or failed to grab frame.";
const REOPEN_FAILED: &str = "Error: Could not reopen video source.";
const RELEASED: &str = "Video source released. Detection thread stopped.";

/// 单次循环结果
enum Step {
    Continue,
    Finished,
}

/// 工作线程退出 (含 panic 展开) 时置为 Stopped
struct FinishOnDrop(Arc<Control>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("detection worker panicked, marking pipeline stopped");
        }
        self.0.finish();
    }
}

pub struct Worker {
    config: PipelineConfig,
    descriptor: SourceDescriptor,
    opener: Arc<dyn SourceOpener>,
    source: Option<Box<dyn FrameSource>>,
    /// 当前输入源是重连得到的且尚未读出帧
    fresh_source: bool,
    detector: Detector,
    watchdog: DefectWatchdog,
    annotator: Option<Annotator>,
    control: Arc<Control>,
    events: Sender<PipelineEvent>,
    /// 运行中移动判定线的请求
    line_updates: Receiver<i32>,

    // 统计
    frame_count: u64,
    reconnect_failures: u32,
}

impl Worker {
    pub fn new(
        config: &PipelineConfig,
        descriptor: SourceDescriptor,
        opener: Arc<dyn SourceOpener>,
        source: Box<dyn FrameSource>,
        engine: Box<dyn InferenceEngine>,
        control: Arc<Control>,
        events: Sender<PipelineEvent>,
        line_updates: Receiver<i32>,
    ) -> Self {
        let annotator = config.annotate_frames.then(|| match &config.font_path {
            Some(path) => Annotator::with_font(path).unwrap_or_else(|e| {
                warn!(error = %e, "label font unavailable, drawing boxes only");
                Annotator::plain()
            }),
            None => Annotator::plain(),
        });

        Self {
            detector: Detector::new(engine, config.confidence, config.line_placement()),
            watchdog: DefectWatchdog::new(config.defect_threshold),
            config: config.clone(),
            descriptor,
            opener,
            source: Some(source),
            fresh_source: false,
            annotator,
            control,
            events,
            line_updates,
            frame_count: 0,
            reconnect_failures: 0,
        }
    }

    /// 工作线程主循环, 返回时输入源已释放且状态为 Stopped
    pub fn run(mut self) {
        let _finish = FinishOnDrop(self.control.clone());
        info!(
            source = %self.descriptor,
            engine = self.detector.engine_name(),
            "detection worker started"
        );

        while self.control.wait_runnable() {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Finished) => break,
                Err(e) => {
                    error!(error = %e, "video source lost, stopping detection");
                    self.emit(PipelineEvent::Warning(format!("Video source lost: {}", e)));
                    break;
                }
            }
        }

        self.source = None;
        self.control.finish();
        info!(frames = self.frame_count, "detection worker stopped");
        self.emit_log(RELEASED);
    }

    fn step(&mut self) -> Result<Step, SourceError> {
        let frame = match self.next_frame()? {
            Some(frame) => frame,
            None => return Ok(Step::Finished),
        };

        // 抽帧: 处理序号 0, N, 2N ...
        let index = self.frame_count;
        self.frame_count += 1;
        if index % u64::from(self.config.frame_skip) != 0 {
            return Ok(Step::Continue);
        }

        if let Some(line_y) = self.line_updates.try_iter().last() {
            self.detector.reset_line(line_y);
            info!(line_y, "decision line moved, tracks cleared");
            self.emit_log(format!("Decision line moved to y={}.", line_y));
        }

        let frame = match self.config.frame_size {
            Some([w, h]) => match frame.resized(w, h) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "frame resize failed, frame skipped");
                    self.emit_log(format!("Error: {}. Frame skipped.", e));
                    return Ok(Step::Continue);
                }
            },
            None => frame,
        };

        self.process(frame, index);

        if self.descriptor.is_still() {
            return Ok(Step::Finished);
        }
        Ok(Step::Continue)
    }

    /// 读取下一帧; 文件结束或读失败时重新打开输入源
    ///
    /// 连续重连失败达到上限时返回错误 (本次运行终止)
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            if let Some(source) = self.source.as_mut() {
                let reason = match source.read() {
                    Ok(Some(frame)) => {
                        self.fresh_source = false;
                        self.reconnect_failures = 0;
                        return Ok(Some(frame));
                    }
                    Ok(None) if self.descriptor.is_still() => return Ok(None),
                    Ok(None) => {
                        self.emit_log(END_OF_STREAM);
                        SourceError::Read("source ended before yielding a frame".to_string())
                    }
                    Err(e) => {
                        warn!(error = %e, "frame read failed");
                        self.emit_log(format!("Error: {}", e));
                        e
                    }
                };

                // 重连后一帧未读出即结束, 视为一次重连失败
                let fresh = std::mem::replace(&mut self.fresh_source, false);
                self.source = None;
                if fresh {
                    self.reconnect_failed(reason)?;
                }
            }

            if self.control.state() == super::PipelineState::Stopped {
                return Ok(None);
            }

            match self.opener.open(&self.descriptor) {
                Ok(source) => {
                    debug!(source = %self.descriptor, "video source reopened");
                    self.source = Some(source);
                    self.fresh_source = true;
                }
                Err(e) => {
                    self.emit_log(REOPEN_FAILED);
                    self.reconnect_failed(e)?;
                }
            }
        }
    }

    fn reconnect_failed(&mut self, reason: SourceError) -> Result<(), SourceError> {
        self.reconnect_failures += 1;
        warn!(
            failures = self.reconnect_failures,
            limit = self.config.max_reconnect_failures,
            error = %reason,
            "reconnect failed"
        );
        if self.reconnect_failures >= self.config.max_reconnect_failures {
            return Err(reason);
        }
        Ok(())
    }

    fn process(&mut self, frame: Frame, index: u64) {
        let start = Instant::now();
        let timestamp = now();

        let analysis = match self.detector.analyze(&frame, timestamp) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "inference failed, frame skipped");
                self.emit_log(format!("Error during detection: {}", e));
                return;
            }
        };
        if analysis.dropped > 0 {
            debug!(dropped = analysis.dropped, "unknown classes ignored");
        }

        // 1. 越线事件
        for event in &analysis.events {
            info!(class = %event.class, "object crossed the line");
            self.emit_log(format!("{} object crossed the line.", event.class.label()));
            self.emit(PipelineEvent::Classification(event.clone()));
        }

        // 2. 标注帧
        if let Some(annotator) = &self.annotator {
            let mut image = frame.image;
            annotator.annotate(&mut image, &analysis.detections, analysis.line_y);
            self.emit(PipelineEvent::FrameReady(Arc::new(image)));
        }

        // 3. 看门狗
        if let WatchdogVerdict::Tripped { count } = self.watchdog.observe(&analysis.events) {
            let message = self.watchdog.warning_message();
            warn!(count, "consecutive defect threshold reached");
            self.emit(PipelineEvent::Warning(message));
            if self.control.pause() {
                self.emit(PipelineEvent::PauseChanged(true));
            }
        }

        // 4. 单帧统计
        let (frame_index, processing_time) = if self.descriptor.is_still() {
            (1, Duration::ZERO)
        } else {
            (index, start.elapsed())
        };
        self.emit(PipelineEvent::Summary(DetectionSummary {
            frame_index,
            objects_detected: analysis.detections.len(),
            processing_time,
            counts: analysis.counts,
        }));
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn emit_log(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Log(message.into()));
    }
}

/// 本地时间, 秒精度
fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}
