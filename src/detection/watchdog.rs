// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 连续缺陷看门狗 (Consecutive-defect watchdog)
//!
//! 以帧为粒度累加: 一帧内多个缺陷事件一次性计入,可一次越过阈值。
//! - 本帧含缺陷: 计数 += 缺陷数
//! - 本帧只有 Intact: 计数清零
//! - 本帧无事件: 计数不变
//! 达到阈值时触发 (告警 + 暂停) 并清零。

use super::types::ClassificationEvent;

/// 看门狗判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Clear,
    Tripped { count: u32 },
}

#[derive(Debug, Clone)]
pub struct DefectWatchdog {
    threshold: u32,
    consecutive: u32,
}

impl DefectWatchdog {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// 处理一帧的事件批次
    pub fn observe(&mut self, batch: &[ClassificationEvent]) -> WatchdogVerdict {
        let defective = batch.iter().filter(|e| e.class.is_defective()).count() as u32;

        if defective > 0 {
            self.consecutive = self.consecutive.saturating_add(defective);
            if self.consecutive >= self.threshold {
                let count = self.consecutive;
                self.consecutive = 0;
                return WatchdogVerdict::Tripped { count };
            }
        } else if !batch.is_empty() {
            self.consecutive = 0;
        }

        WatchdogVerdict::Clear
    }

    pub fn warning_message(&self) -> String {
        format!(
            "Warning: {} consecutive defective items detected. Pausing detection.",
            self.threshold
        )
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::DefectClass;
    use chrono::NaiveDateTime;

    fn events(classes: &[DefectClass]) -> Vec<ClassificationEvent> {
        classes
            .iter()
            .map(|&c| ClassificationEvent::new(NaiveDateTime::default(), c))
            .collect()
    }

    const OPEN: DefectClass = DefectClass::DamagedOpen;
    const DEFORMED: DefectClass = DefectClass::DamagedDeformed;
    const INTACT: DefectClass = DefectClass::Intact;

    #[test]
    fn test_one_defect_per_frame_trips_on_tenth() {
        let mut watchdog = DefectWatchdog::new(10);
        let mut trips = Vec::new();
        for frame in 1..=10 {
            let class = if frame % 2 == 0 { OPEN } else { DEFORMED };
            if watchdog.observe(&events(&[class])) != WatchdogVerdict::Clear {
                trips.push(frame);
            }
        }
        assert_eq!(trips, vec![10]);
        assert_eq!(watchdog.consecutive(), 0);
    }

    #[test]
    fn test_single_frame_batch_trips() {
        let mut watchdog = DefectWatchdog::new(10);
        let verdict = watchdog.observe(&events(&[OPEN; 10]));
        assert_eq!(verdict, WatchdogVerdict::Tripped { count: 10 });
        assert_eq!(watchdog.consecutive(), 0);
    }

    #[test]
    fn test_batches_sum_past_threshold() {
        let mut watchdog = DefectWatchdog::new(10);
        assert_eq!(watchdog.observe(&events(&[OPEN; 7])), WatchdogVerdict::Clear);
        assert_eq!(
            watchdog.observe(&events(&[DEFORMED; 5])),
            WatchdogVerdict::Tripped { count: 12 }
        );
    }

    #[test]
    fn test_intact_at_nine_resets() {
        let mut watchdog = DefectWatchdog::new(10);
        for _ in 0..9 {
            watchdog.observe(&events(&[OPEN]));
        }
        assert_eq!(watchdog.consecutive(), 9);

        watchdog.observe(&events(&[INTACT]));
        assert_eq!(watchdog.consecutive(), 0);

        for i in 1..=10 {
            let verdict = watchdog.observe(&events(&[OPEN]));
            assert_eq!(verdict != WatchdogVerdict::Clear, i == 10);
        }
    }

    #[test]
    fn test_empty_batch_keeps_count() {
        let mut watchdog = DefectWatchdog::new(10);
        watchdog.observe(&events(&[OPEN, OPEN]));
        watchdog.observe(&[]);
        assert_eq!(watchdog.consecutive(), 2);
    }

    #[test]
    fn test_mixed_batch_counts_defects() {
        let mut watchdog = DefectWatchdog::new(10);
        watchdog.observe(&events(&[OPEN; 3]));
        watchdog.observe(&events(&[INTACT, OPEN]));
        assert_eq!(watchdog.consecutive(), 4);
    }

    #[test]
    fn test_warning_message() {
        let watchdog = DefectWatchdog::new(10);
        assert_eq!(
            watchdog.warning_message(),
            "Warning: 10 consecutive defective items detected. Pausing detection."
        );
    }
}
