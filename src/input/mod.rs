// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// 每个摄像头一个独立采集线程, 负责拉流解码并写入帧缓冲
/// - Source/Stream: 视频源接口
/// - Decoder: RTSP主动拉流解码器 (FFmpeg)
/// - Filter: 帧过滤与 YUV → RGB 转换
/// - FrameBuffer: 每摄像头单槽的最新帧缓冲
/// - Supervisor: 断流重连与退避
/// - Manager: 按需启动/停止各摄像头的采集
pub mod decode_filter;
pub mod decoder;
pub mod frame_buffer;
pub mod manager;
pub mod source;
pub mod supervisor;

pub use decode_filter::CaptureFilter;
pub use decoder::{FfmpegSource, FfmpegStream};
pub use frame_buffer::{BufferStats, FrameBuffer};
pub use manager::CaptureManager;
pub use source::{stream_url, FrameSource, FrameStream};
pub use supervisor::{Backoff, CaptureSupervisor};
