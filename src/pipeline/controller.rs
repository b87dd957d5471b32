// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线控制器
//!
//! 持有事件通道发送端与当前工作线程; start 前总是先 stop + join 上一次运行,
//! 保证两次运行的输入源生命周期不重叠。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, info};

use super::control::Control;
use super::worker::Worker;
use super::{PipelineEvent, PipelineState};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::input::{SourceDescriptor, SourceOpener};
use crate::models::EngineFactory;

const WORKER_THREAD_NAME: &str = "qualiscan-detector";

/// 一次运行 (join 后保留状态, 供 state() 查询)
struct Run {
    control: Arc<Control>,
    line_updates: Sender<i32>,
    handle: Option<JoinHandle<()>>,
}

impl Run {
    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("detection worker panicked");
            }
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    opener: Arc<dyn SourceOpener>,
    engines: EngineFactory,
    events: Sender<PipelineEvent>,
    run: Option<Run>,
}

impl Pipeline {
    /// 创建控制器, 返回事件接收端 (交给消费端)
    pub fn new(
        config: PipelineConfig,
        opener: Arc<dyn SourceOpener>,
        engines: EngineFactory,
    ) -> (Self, Receiver<PipelineEvent>) {
        let (events, receiver) = unbounded();
        let pipeline = Self {
            config,
            opener,
            engines,
            events,
            run: None,
        };
        (pipeline, receiver)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 启动检测: Idle → Running
    ///
    /// 已在运行时先停止上一次运行。引擎加载失败或输入源打开失败时拒绝启动。
    pub fn start(&mut self, descriptor: SourceDescriptor) -> Result<(), PipelineError> {
        self.stop();

        let engine = (self.engines)().map_err(|e| {
            error!(error = %e, "inference engine failed to load");
            self.emit_log("Detection cannot start. Model not loaded.");
            PipelineError::EngineUnavailable(e)
        })?;

        let source = self.opener.open(&descriptor).map_err(|e| {
            error!(source = %descriptor, error = %e, "could not open video source");
            self.emit_log(format!("Error: Could not open video source. {}", e));
            PipelineError::Source(e)
        })?;

        let control = Arc::new(Control::new());
        control.begin()?;
        let (line_updates, line_requests) = unbounded();

        info!(source = %descriptor, engine = engine.name(), "starting detection");
        let worker = Worker::new(
            &self.config,
            descriptor,
            self.opener.clone(),
            source,
            engine,
            control.clone(),
            self.events.clone(),
            line_requests,
        );
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(PipelineError::Spawn)?;

        self.emit_log("Detection thread started.");
        self.run = Some(Run {
            control,
            line_updates,
            handle: Some(handle),
        });
        Ok(())
    }

    /// 停止检测并等待工作线程退出 (输入源已释放)
    ///
    /// Idle 时为空操作
    pub fn stop(&mut self) {
        if let Some(run) = self.run.as_mut() {
            if run.control.stop() {
                info!("stopping detection");
            }
            run.join();
        }
    }

    /// 等待当前运行自行结束 (单张图片或输入源丢失)
    pub fn join(&mut self) {
        if let Some(run) = self.run.as_mut() {
            run.join();
        }
    }

    /// Running ⇄ Paused, 返回切换后是否处于暂停
    pub fn toggle_pause(&self) -> Result<bool, PipelineError> {
        let run = self.run.as_ref().ok_or(PipelineError::InvalidTransition {
            action: "toggle pause",
            state: PipelineState::Idle,
        })?;
        let paused = run.control.toggle()?;
        info!(paused, "pause toggled");
        self.emit_log(if paused {
            "Detection thread paused."
        } else {
            "Detection thread resumed."
        });
        self.send(PipelineEvent::PauseChanged(paused));
        Ok(paused)
    }

    /// 移动判定线 (像素), 并清空跟踪器避免旧位置误判
    ///
    /// 运行中在下一处理帧生效; 同时作为之后 start 的判定线
    pub fn set_line(&mut self, line_y: i32) -> Result<(), PipelineError> {
        let mut config = self.config.clone();
        config.line_y = Some(line_y);
        config.validate()?;
        self.config = config;
        if let Some(run) = &self.run {
            if run.handle.is_some() && run.line_updates.send(line_y).is_err() {
                debug!("worker already exited, line applies to the next run");
            }
        }
        info!(line_y, "decision line set");
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.run
            .as_ref()
            .map(|run| run.control.state())
            .unwrap_or(PipelineState::Idle)
    }

    /// 工作线程是否已退出
    pub fn is_finished(&self) -> bool {
        self.run
            .as_ref()
            .and_then(|run| run.handle.as_ref())
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    fn send(&self, event: PipelineEvent) {
        // 接收端关闭只影响事件投递, 不影响控制
        let _ = self.events.send(event);
    }

    fn emit_log(&self, message: impl Into<String>) {
        self.send(PipelineEvent::Log(message.into()));
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
