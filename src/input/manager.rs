// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 采集管理器 - 每个摄像头一个采集守护线程, 各自持有取消信号
/// Capture manager: starts/stops per-camera supervisors on demand
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use anyhow::Result;
use tracing::{info, warn};

use super::frame_buffer::FrameBuffer;
use super::source::FrameSource;
use super::supervisor::{Backoff, CaptureSupervisor};
use crate::shutdown::{self, ShutdownTrigger};
use crate::types::CameraId;

struct RunningCapture {
    trigger: ShutdownTrigger,
    handle: JoinHandle<()>,
}

pub struct CaptureManager {
    source: Arc<dyn FrameSource>,
    buffer: Arc<FrameBuffer>,
    backoff: Backoff,
    running: Mutex<HashMap<CameraId, RunningCapture>>,
}

impl CaptureManager {
    pub fn new(source: Arc<dyn FrameSource>, buffer: Arc<FrameBuffer>, backoff: Backoff) -> Self {
        Self {
            source,
            buffer,
            backoff,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// 启动摄像头采集; 已在运行时返回 false
    pub fn start(&self, camera_id: &CameraId) -> Result<bool> {
        let mut running = self.lock();
        if let Some(existing) = running.get(camera_id) {
            if !existing.handle.is_finished() {
                return Ok(false);
            }
            warn!(camera = %camera_id, "采集线程已退出, 重新启动");
        }

        let (trigger, shutdown) = shutdown::channel();
        let handle = CaptureSupervisor::new(
            camera_id.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.buffer),
            self.backoff,
            shutdown,
        )
        .spawn()?;
        running.insert(camera_id.clone(), RunningCapture { trigger, handle });
        Ok(true)
    }

    /// 停止单个摄像头; 不等待线程结束
    pub fn stop(&self, camera_id: &CameraId) -> bool {
        match self.lock().remove(camera_id) {
            Some(capture) => {
                capture.trigger.trigger();
                info!(camera = %camera_id, "🛑 已请求停止采集");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, camera_id: &CameraId) -> bool {
        self.lock()
            .get(camera_id)
            .map(|c| !c.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn cameras(&self) -> Vec<CameraId> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 停止全部摄像头并等待线程退出
    pub fn stop_all(&self) {
        let captures: Vec<_> = self.lock().drain().collect();
        for (_, capture) in &captures {
            capture.trigger.trigger();
        }
        for (camera_id, capture) in captures {
            if capture.handle.join().is_err() {
                warn!(camera = %camera_id, "采集线程异常退出");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CameraId, RunningCapture>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        for capture in self.lock().values() {
            capture.trigger.trigger();
        }
    }
}
