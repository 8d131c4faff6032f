// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 发布系统 (Publishing System)
///
/// - Hub:     订阅者管理与事件分发
/// - Encoder: 标注帧 JPEG/base64 编码线程
pub mod encoder;
pub mod hub;

pub use encoder::{encode_jpeg_base64, format_timestamp, FramePublisher};
pub use hub::{EventHub, EventLine, HubStats, Subscription};

use crate::tripwire::Counts;
use crate::types::{AnnotatedFrame, CameraId};

/// 推理线程的输出端; 实现不得阻塞调用方
pub trait Publisher: Send + Sync {
    fn publish_frame(&self, frame: AnnotatedFrame);

    fn publish_counts(&self, camera_id: &CameraId, counts: Counts);
}
