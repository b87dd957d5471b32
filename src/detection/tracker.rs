// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 目标跟踪 (Object tracking)
//!
//! 以检测框水平中点作为身份: 同一帧内水平路径不交叉的目标才能区分。
//! 身份分配通过 [`IdentityAssigner`] 抽象,可替换为 IoU 匹配等更强的跟踪器,
//! 越线判定与看门狗逻辑无需改动。

use std::collections::HashMap;

use super::types::Detection;

/// 目标身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub i32);

/// 身份分配接口
pub trait IdentityAssigner {
    fn assign(&self, detection: &Detection) -> ObjectId;
}

/// 水平中点身份: id = (x1 + x2) / 2
#[derive(Debug, Clone, Copy, Default)]
pub struct MidpointIdentity;

impl IdentityAssigner for MidpointIdentity {
    fn assign(&self, detection: &Detection) -> ObjectId {
        // i64 求和, 两端饱和到 i32 时也不溢出
        let x1 = i64::from(detection.bbox.x1 as i32);
        let x2 = i64::from(detection.bbox.x2 as i32);
        ObjectId((x1 + x2).div_euclid(2) as i32)
    }
}

/// 跟踪对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedObject {
    pub id: ObjectId,
    /// 上一次观测到的底边 y2
    pub last_bottom_y: i32,
}

/// 单帧观测: 新旧底边位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub id: ObjectId,
    /// 上一帧存储的底边 (首次出现为 None)
    pub previous_bottom_y: Option<i32>,
    pub bottom_y: i32,
    pub detection: Detection,
}

/// 目标跟踪器
///
/// 每帧: 先读旧位置再覆盖,不在本帧的身份立即移除 (无遮挡容忍)
#[derive(Debug, Default)]
pub struct ObjectTracker<A = MidpointIdentity> {
    assigner: A,
    objects: HashMap<ObjectId, TrackedObject>,
}

impl ObjectTracker<MidpointIdentity> {
    pub fn new() -> Self {
        Self::with_assigner(MidpointIdentity)
    }
}

impl<A: IdentityAssigner> ObjectTracker<A> {
    pub fn with_assigner(assigner: A) -> Self {
        Self {
            assigner,
            objects: HashMap::new(),
        }
    }

    /// 更新跟踪器
    ///
    /// # 返回
    /// 本帧每个检测的观测 (顺序同输入)
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(detections.len());

        for detection in detections {
            let id = self.assigner.assign(detection);
            let bottom_y = detection.bbox.bottom();
            let previous = self
                .objects
                .insert(
                    id,
                    TrackedObject {
                        id,
                        last_bottom_y: bottom_y,
                    },
                )
                .map(|obj| obj.last_bottom_y);

            observations.push(Observation {
                id,
                previous_bottom_y: previous,
                bottom_y,
                detection: *detection,
            });
        }

        // 移除本帧缺席的身份
        self.objects
            .retain(|id, _| observations.iter().any(|o| o.id == *id));

        observations
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    /// 当前活跃的身份 (升序)
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// 清除所有跟踪
    pub fn reset(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, DefectClass};

    fn det(x1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(
            BBox::new(x1, y2 - 40.0, x2, y2),
            DefectClass::Intact,
            0.9,
        )
    }

    #[test]
    fn test_midpoint_identity() {
        let id = MidpointIdentity.assign(&det(100.0, 151.0, 80.0));
        assert_eq!(id, ObjectId(125));
        let id = MidpointIdentity.assign(&det(100.7, 150.9, 80.0));
        assert_eq!(id, ObjectId(125));
    }

    #[test]
    fn test_midpoint_of_saturated_box() {
        let id = MidpointIdentity.assign(&det(3.0e9, 3.0e9, 80.0));
        assert_eq!(id, ObjectId(i32::MAX));
        let id = MidpointIdentity.assign(&det(-3.0e9, 3.0e9, 80.0));
        assert_eq!(id, ObjectId(-1));
    }

    #[test]
    fn test_first_sighting_has_no_previous() {
        let mut tracker = ObjectTracker::new();
        let obs = tracker.update(&[det(100.0, 150.0, 80.0)]);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].previous_bottom_y, None);
        assert_eq!(obs[0].bottom_y, 80);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_update_reports_old_position_then_overwrites() {
        let mut tracker = ObjectTracker::new();
        tracker.update(&[det(100.0, 150.0, 80.0)]);
        let obs = tracker.update(&[det(100.0, 150.0, 95.0)]);
        assert_eq!(obs[0].previous_bottom_y, Some(80));
        assert_eq!(tracker.get(obs[0].id).map(|o| o.last_bottom_y), Some(95));
    }

    #[test]
    fn test_absent_identity_evicted_immediately() {
        let mut tracker = ObjectTracker::new();
        tracker.update(&[det(100.0, 150.0, 80.0), det(300.0, 350.0, 80.0)]);
        assert_eq!(tracker.ids(), vec![ObjectId(125), ObjectId(325)]);

        tracker.update(&[det(300.0, 350.0, 90.0)]);
        assert_eq!(tracker.ids(), vec![ObjectId(325)]);

        // 重新出现视为新目标
        let obs = tracker.update(&[det(100.0, 150.0, 100.0)]);
        assert_eq!(obs[0].previous_bottom_y, None);
    }

    #[test]
    fn test_empty_frame_clears_tracker() {
        let mut tracker = ObjectTracker::new();
        tracker.update(&[det(100.0, 150.0, 80.0)]);
        assert!(tracker.update(&[]).is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_custom_assigner() {
        struct ByClass;
        impl IdentityAssigner for ByClass {
            fn assign(&self, detection: &Detection) -> ObjectId {
                ObjectId(detection.class.class_id() as i32)
            }
        }

        let mut tracker = ObjectTracker::with_assigner(ByClass);
        tracker.update(&[det(0.0, 10.0, 50.0)]);
        let obs = tracker.update(&[det(500.0, 510.0, 60.0)]);
        assert_eq!(obs[0].previous_bottom_y, Some(50));
    }
}
