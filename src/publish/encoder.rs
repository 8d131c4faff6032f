// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 帧发布器 (Frame publisher)
/// 推理线程 → 有界队列 → 编码线程 (JPEG + base64) → EventHub
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::{DateTime, Local, SecondsFormat};
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, info, warn};

use super::hub::EventHub;
use super::Publisher;
use crate::control::OutboundEvent;
use crate::shutdown::Shutdown;
use crate::tripwire::Counts;
use crate::types::{AnnotatedFrame, CameraId};

/// JPEG 编码后做标准 base64
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String> {
    let mut jpeg = Cursor::new(Vec::with_capacity(64 * 1024));
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(image)
        .context("jpeg encoding failed")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg.get_ref()))
}

pub fn format_timestamp(ts: SystemTime) -> String {
    DateTime::<Local>::from(ts).to_rfc3339_opts(SecondsFormat::Millis, false)
}

pub struct FramePublisher {
    tx: Sender<AnnotatedFrame>,
    hub: Arc<EventHub>,
    dropped: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FramePublisher {
    /// 启动编码线程
    pub fn spawn(
        hub: Arc<EventHub>,
        quality: u8,
        queue_depth: usize,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(queue_depth.max(1));
        let encoder_hub = Arc::clone(&hub);
        let handle = thread::Builder::new()
            .name("frame-encoder".into())
            .spawn(move || encode_loop(rx, encoder_hub, quality, shutdown))
            .context("failed to spawn encoder thread")?;

        Ok(Self {
            tx,
            hub,
            dropped: AtomicU64::new(0),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 等待编码线程退出 (需先触发 shutdown)
    pub fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("编码线程异常退出");
            }
        }
    }
}

impl Publisher for FramePublisher {
    fn publish_frame(&self, frame: AnnotatedFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(camera = %frame.camera_id, dropped, "编码队列已满, 丢弃帧");
            }
            Err(TrySendError::Disconnected(frame)) => {
                debug!(camera = %frame.camera_id, "编码线程已停止, 丢弃帧");
            }
        }
    }

    fn publish_counts(&self, camera_id: &CameraId, counts: Counts) {
        self.hub
            .broadcast(&OutboundEvent::update_counts(camera_id, counts));
    }
}

fn encode_loop(rx: Receiver<AnnotatedFrame>, hub: Arc<EventHub>, quality: u8, shutdown: Shutdown) {
    info!("🖼️ 编码线程启动 (JPEG quality {})", quality);
    let mut encoded = 0u64;
    loop {
        let frame = select! {
            recv(rx) -> frame => match frame {
                Ok(frame) => frame,
                Err(_) => break,
            },
            recv(shutdown.receiver()) -> _ => break,
        };

        // 没有订阅者时不编码
        if !hub.has_subscribers() {
            continue;
        }

        match encode_jpeg_base64(&frame.image, quality) {
            Ok(image) => {
                hub.broadcast(&OutboundEvent::VideoFrame {
                    camera_ip: frame.camera_id.to_string(),
                    image,
                    timestamp: format_timestamp(frame.timestamp),
                });
                encoded += 1;
            }
            Err(e) => warn!(camera = %frame.camera_id, "帧编码失败: {:#}", e),
        }
    }
    info!("编码线程退出 (共编码 {} 帧)", encoded);
}
