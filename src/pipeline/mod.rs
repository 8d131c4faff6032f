// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 处理流水线 (Processing Pipeline)
///
/// 采集线程 (每摄像头一个) → 帧缓冲 → 推理线程 (唯一) → 发布
/// - Worker:  取帧、检测、过线计数、标注、发布
/// - Overlay: 画面标注
pub mod overlay;
pub mod worker;

pub use overlay::Annotator;
pub use worker::{InferenceWorker, StepOutcome};
