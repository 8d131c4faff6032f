// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行与流水线参数
pub mod control; // 控制通道
pub mod detection; // 人体检测
pub mod input; // 视频输入系统
pub mod pipeline; // 推理流水线
pub mod publish; // 帧与事件发布
pub mod registry; // 摄像头状态注册表
pub mod shutdown; // 取消信号
pub mod tripwire; // 绊线过线判定
pub mod types; // 公共数据结构

pub use crate::config::{Args, PipelineConfig};
pub use crate::control::{ControlError, ControlMessage, ControlServer, Controller, OutboundEvent};
pub use crate::detection::{DetectParams, ModelInput, PersonDetector, YOLOv8};
pub use crate::input::{CaptureManager, FfmpegSource, FrameBuffer, FrameSource, FrameStream};
pub use crate::pipeline::{Annotator, InferenceWorker, StepOutcome};
pub use crate::publish::{EventHub, FramePublisher, Publisher};
pub use crate::registry::{CameraRegistry, CameraSnapshot};
pub use crate::tripwire::{CameraState, Counts, Direction, Side, Tripwire, TripwireConfig};
pub use crate::types::{AnnotatedFrame, BBox, CameraId, Centroid, Frame};
