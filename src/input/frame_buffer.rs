// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 帧缓冲 (Frame buffer)
//!
//! 全局缓冲, 每个摄像头最多保留一帧未消费的最新帧. 新帧到达时丢弃同一摄像头
//! 的旧帧 (新鲜度优先于完整性), 从而限制端到端延迟.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::Frame;

/// 缓冲统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub dropped: u64,
    pub popped: u64,
}

#[derive(Default)]
struct Slots {
    pending: VecDeque<Frame>,
    stats: BufferStats,
}

#[derive(Default)]
pub struct FrameBuffer {
    slots: Mutex<Slots>,
    ready: Condvar,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入新帧; 同一摄像头尚未消费的旧帧被丢弃. 返回是否发生丢帧.
    pub fn push(&self, frame: Frame) -> bool {
        let mut slots = self.lock();
        let stale = slots
            .pending
            .iter()
            .position(|f| f.camera_id == frame.camera_id);
        if let Some(idx) = stale {
            slots.pending.remove(idx);
            slots.stats.dropped += 1;
        }
        slots.pending.push_back(frame);
        slots.stats.pushed += 1;
        drop(slots);

        self.ready.notify_one();
        stale.is_some()
    }

    /// 取出下一帧; 缓冲为空时最多等待 `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.lock();
        loop {
            if let Some(frame) = slots.pending.pop_front() {
                slots.stats.popped += 1;
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slots = self
                .ready
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// 非阻塞取帧
    pub fn try_pop(&self) -> Option<Frame> {
        self.pop_timeout(Duration::ZERO)
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BufferStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
