// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 摄像头注册表 (Camera registry)
//!
//! 摄像头ID → 状态记录. 每条记录独立加锁, 推理线程的计数更新与控制通道的
//! 绊线修改在单个摄像头粒度上互斥.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_skiplist::SkipMap;
use tracing::debug;

use crate::tripwire::{CameraState, Counts, Direction, Side, TripwireConfig};
use crate::types::{CameraId, Centroid};

/// 状态快照, 用于标注与上报
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraSnapshot {
    pub counts: Counts,
    pub tripwire: Option<TripwireConfig>,
    pub last_side: Option<Side>,
}

impl From<&CameraState> for CameraSnapshot {
    fn from(state: &CameraState) -> Self {
        Self {
            counts: state.counts(),
            tripwire: state.tripwire().copied(),
            last_side: state.last_side(),
        }
    }
}

/// 一帧质心处理结果
#[derive(Clone, Debug, PartialEq)]
pub struct FrameObservation {
    pub crossings: Vec<Direction>,
    pub snapshot: CameraSnapshot,
}

#[derive(Default)]
pub struct CameraRegistry {
    cameras: SkipMap<CameraId, Arc<Mutex<CameraState>>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 (必要时创建) 摄像头状态
    pub fn entry(&self, camera_id: &CameraId) -> Arc<Mutex<CameraState>> {
        let entry = self.cameras.get_or_insert_with(camera_id.clone(), || {
            debug!(camera = %camera_id, "注册摄像头状态");
            Arc::new(Mutex::new(CameraState::new()))
        });
        Arc::clone(entry.value())
    }

    pub fn contains(&self, camera_id: &CameraId) -> bool {
        self.cameras.contains_key(camera_id)
    }

    pub fn cameras(&self) -> Vec<CameraId> {
        self.cameras.iter().map(|e| e.key().clone()).collect()
    }

    pub fn snapshot(&self, camera_id: &CameraId) -> Option<CameraSnapshot> {
        let entry = self.cameras.get(camera_id)?;
        let state = lock(entry.value());
        Some(CameraSnapshot::from(&*state))
    }

    /// 一次加锁处理一帧的全部质心
    pub fn observe(&self, camera_id: &CameraId, centroids: &[Centroid]) -> FrameObservation {
        let record = self.entry(camera_id);
        let mut state = lock(&record);
        let crossings = state.observe_all(centroids.iter().copied());
        FrameObservation {
            crossings,
            snapshot: CameraSnapshot::from(&*state),
        }
    }

    /// 原子地替换或清除绊线
    pub fn set_tripwire(
        &self,
        camera_id: &CameraId,
        config: Option<TripwireConfig>,
    ) -> CameraSnapshot {
        let record = self.entry(camera_id);
        let mut state = lock(&record);
        state.set_tripwire(config);
        CameraSnapshot::from(&*state)
    }
}

fn lock(record: &Mutex<CameraState>) -> MutexGuard<'_, CameraState> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}
