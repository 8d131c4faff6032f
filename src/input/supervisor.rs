// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 采集守护 (Capture supervisor)
//!
//! 每个摄像头一个线程: 打开视频流 → 持续读帧写入帧缓冲 → 断流后释放资源、
//! 退避并从打开步骤重新开始. 打开失败无限重试, 只有取消信号能让它退出.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::frame_buffer::FrameBuffer;
use super::source::{FrameSource, FrameStream};
use crate::config::PipelineConfig;
use crate::shutdown::Shutdown;
use crate::types::{CameraId, Frame};

/// 退避策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// 打开失败后的等待
    pub open_retry: Duration,
    /// 断流后重连前的等待
    pub reconnect: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            open_retry: Duration::from_secs(5),
            reconnect: Duration::from_secs(3),
        }
    }
}

impl From<&PipelineConfig> for Backoff {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            open_retry: Duration::from_secs(config.open_retry_secs),
            reconnect: Duration::from_secs(config.reconnect_secs),
        }
    }
}

/// 一次连接的结束原因
enum StreamEnd {
    Cancelled,
    Failed(anyhow::Error),
}

pub struct CaptureSupervisor {
    camera_id: CameraId,
    source: Arc<dyn FrameSource>,
    buffer: Arc<FrameBuffer>,
    backoff: Backoff,
    shutdown: Shutdown,
    seq: u64,
}

impl CaptureSupervisor {
    pub fn new(
        camera_id: CameraId,
        source: Arc<dyn FrameSource>,
        buffer: Arc<FrameBuffer>,
        backoff: Backoff,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            camera_id,
            source,
            buffer,
            backoff,
            shutdown,
            seq: 0,
        }
    }

    /// 在独立线程中运行
    pub fn spawn(mut self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("capture-{}", self.camera_id))
            .spawn(move || self.run())
            .context("failed to spawn capture thread")
    }

    /// 采集主循环; 仅在取消后返回
    pub fn run(&mut self) {
        info!(camera = %self.camera_id, "🎬 采集守护启动");
        while !self.shutdown.is_cancelled() {
            let stream = match self.source.open(&self.camera_id) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(
                        camera = %self.camera_id,
                        "❌ 连接失败: {:#}, {:?}后重试", e, self.backoff.open_retry
                    );
                    if self.shutdown.wait(self.backoff.open_retry) {
                        break;
                    }
                    continue;
                }
            };

            info!(camera = %self.camera_id, "✅ 视频流已连接");
            match self.pump(stream) {
                StreamEnd::Cancelled => break,
                StreamEnd::Failed(e) => {
                    warn!(
                        camera = %self.camera_id,
                        "⚠️ 视频流中断: {:#}, {:?}后重连", e, self.backoff.reconnect
                    );
                    if self.shutdown.wait(self.backoff.reconnect) {
                        break;
                    }
                }
            }
        }
        info!(camera = %self.camera_id, "🛑 采集守护退出");
    }

    /// 持续读帧直到出错或取消; 返回时流已被释放
    fn pump(&mut self, mut stream: Box<dyn FrameStream>) -> StreamEnd {
        loop {
            if self.shutdown.is_cancelled() {
                return StreamEnd::Cancelled;
            }
            match stream.read() {
                Ok(image) => {
                    self.seq += 1;
                    self.buffer
                        .push(Frame::new(self.camera_id.clone(), image, self.seq));
                }
                Err(e) => return StreamEnd::Failed(e),
            }
        }
    }
}
