// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 事件消费端 (Event Consumer)
///
/// 单线程按产生顺序分发流水线事件, 每个处理器依次收到同一事件:
/// - StoreRecorder:  分类事件写入存储
/// - SessionTally:   本次会话计数
/// - LogForwarder:   事件转为 tracing 日志
///
/// 存储失败只记录日志, 不影响检测线程。
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::detection::types::ClassCounts;
use crate::pipeline::PipelineEvent;
use crate::store::AggregationStore;

const CONSUMER_THREAD_NAME: &str = "qualiscan-consumer";

/// 事件处理器
pub trait EventHandler: Send {
    fn handle(&mut self, event: &PipelineEvent);
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn dispatch(&mut self, event: &PipelineEvent) {
        for handler in &mut self.handlers {
            handler.handle(event);
        }
    }

    /// 消费直到所有发送端关闭, 返回处理的事件数
    pub fn run(mut self, events: Receiver<PipelineEvent>) -> u64 {
        let mut handled = 0;
        for event in events.iter() {
            self.dispatch(&event);
            handled += 1;
        }
        debug!(handled, "event channel closed");
        handled
    }

    pub fn spawn(self, events: Receiver<PipelineEvent>) -> std::io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || self.run(events))
    }
}

/// 分类事件持久化
pub struct StoreRecorder {
    store: AggregationStore,
}

impl StoreRecorder {
    pub fn new(store: AggregationStore) -> Self {
        Self { store }
    }
}

impl EventHandler for StoreRecorder {
    fn handle(&mut self, event: &PipelineEvent) {
        if let PipelineEvent::Classification(classification) = event {
            match self.store.record(classification) {
                Ok(id) => debug!(id, class = %classification.class, "stored"),
                Err(e) => {
                    error!(error = %e, "failed to persist classification, detection continues")
                }
            }
        }
    }
}

/// 会话计数 (总数 / 完好 / 变形 / 开口)
#[derive(Clone, Default)]
pub struct SessionTally {
    counts: Arc<Mutex<ClassCounts>>,
}

impl SessionTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前计数快照 (可在其他线程读取)
    pub fn snapshot(&self) -> ClassCounts {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reset(&self) {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner) = ClassCounts::default();
    }
}

impl EventHandler for SessionTally {
    fn handle(&mut self, event: &PipelineEvent) {
        if let PipelineEvent::Classification(classification) = event {
            self.counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add(classification.class);
        }
    }
}

/// 事件 → tracing 日志
#[derive(Default)]
pub struct LogForwarder {
    summaries: bool,
}

impl LogForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时输出每帧统计 (debug 级别)
    pub fn with_summaries(mut self) -> Self {
        self.summaries = true;
        self
    }
}

impl EventHandler for LogForwarder {
    fn handle(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Log(message) => info!(target: "qualiscan::pipeline", "{}", message),
            PipelineEvent::Warning(message) => warn!(target: "qualiscan::pipeline", "{}", message),
            PipelineEvent::PauseChanged(paused) => {
                info!(target: "qualiscan::pipeline", paused, "pause state changed")
            }
            PipelineEvent::Summary(summary) if self.summaries => debug!(
                target: "qualiscan::pipeline",
                frame = summary.frame_index,
                objects = summary.objects_detected,
                ms = summary.processing_time.as_secs_f64() * 1000.0,
                intact = summary.counts.intact,
                deformed = summary.counts.damaged_deformed,
                open = summary.counts.damaged_open,
                "frame processed"
            ),
            _ => {}
        }
    }
}
