// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 流水线状态机 + 暂停等待
//!
//! 工作线程在每帧开始前调用 `wait_runnable`: 暂停时阻塞在条件变量上 (不空转),
//! 恢复或停止时被唤醒。

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::PipelineState;
use crate::error::PipelineError;

#[derive(Debug)]
pub struct Control {
    state: Mutex<PipelineState>,
    changed: Condvar,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Idle),
            changed: Condvar::new(),
        }
    }

    // 状态是 Copy 枚举, 锁中毒时直接取回内部值
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, guard: &mut MutexGuard<'_, PipelineState>, next: PipelineState) {
        debug!(from = ?**guard, to = ?next, "pipeline state");
        **guard = next;
        self.changed.notify_all();
    }

    pub fn state(&self) -> PipelineState {
        *self.lock()
    }

    /// Idle → Running
    pub fn begin(&self) -> Result<(), PipelineError> {
        let mut state = self.lock();
        match *state {
            PipelineState::Idle => {
                self.set(&mut state, PipelineState::Running);
                Ok(())
            }
            other => Err(PipelineError::InvalidTransition {
                action: "start",
                state: other,
            }),
        }
    }

    /// 阻塞直到可以处理下一帧; 返回 false 表示已停止
    pub fn wait_runnable(&self) -> bool {
        let state = self.lock();
        let state = self
            .changed
            .wait_while(state, |s| *s == PipelineState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *state == PipelineState::Running
    }

    /// Running ⇄ Paused, 返回切换后是否处于暂停
    pub fn toggle(&self) -> Result<bool, PipelineError> {
        let mut state = self.lock();
        match *state {
            PipelineState::Running => {
                self.set(&mut state, PipelineState::Paused);
                Ok(true)
            }
            PipelineState::Paused => {
                self.set(&mut state, PipelineState::Running);
                Ok(false)
            }
            other => Err(PipelineError::InvalidTransition {
                action: "toggle pause",
                state: other,
            }),
        }
    }

    /// 看门狗触发的暂停; 仅在 Running 时生效, 返回是否发生切换
    pub fn pause(&self) -> bool {
        let mut state = self.lock();
        if *state == PipelineState::Running {
            self.set(&mut state, PipelineState::Paused);
            true
        } else {
            false
        }
    }

    /// Running | Paused → Stopped; 返回是否发生切换
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        match *state {
            PipelineState::Running | PipelineState::Paused => {
                self.set(&mut state, PipelineState::Stopped);
                true
            }
            _ => false,
        }
    }

    /// 工作线程退出时调用, 无论当前状态
    pub fn finish(&self) {
        let mut state = self.lock();
        if *state != PipelineState::Stopped {
            self.set(&mut state, PipelineState::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        let control = Control::new();
        assert_eq!(control.state(), PipelineState::Idle);
        assert!(control.toggle().is_err());
        assert!(!control.stop());

        control.begin().unwrap();
        assert!(control.begin().is_err());
        assert!(control.toggle().unwrap());
        assert_eq!(control.state(), PipelineState::Paused);
        assert!(!control.pause());
        assert!(!control.toggle().unwrap());
        assert!(control.pause());

        assert!(control.stop());
        assert_eq!(control.state(), PipelineState::Stopped);
        assert!(matches!(
            control.toggle(),
            Err(PipelineError::InvalidTransition { state: PipelineState::Stopped, .. })
        ));
    }

    #[test]
    fn test_paused_worker_blocks_until_resume() {
        let control = Arc::new(Control::new());
        control.begin().unwrap();
        control.toggle().unwrap();

        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait_runnable())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        control.toggle().unwrap();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_stop_wakes_paused_worker() {
        let control = Arc::new(Control::new());
        control.begin().unwrap();
        control.pause();

        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait_runnable())
        };
        thread::sleep(Duration::from_millis(20));
        control.stop();
        assert!(!waiter.join().unwrap());
    }
}
