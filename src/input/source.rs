// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频源接口
/// Stream source seam between the capture supervisor and the decoder
use anyhow::Result;
use image::RgbImage;

use crate::types::CameraId;

/// 按摄像头ID打开视频流
pub trait FrameSource: Send + Sync {
    fn open(&self, camera_id: &CameraId) -> Result<Box<dyn FrameStream>>;
}

/// 已打开的视频流; 丢弃即释放底层资源
pub trait FrameStream: Send {
    /// 读取下一帧; 断流/超时/流结束返回错误
    fn read(&mut self) -> Result<RgbImage>;
}

/// 由摄像头ID生成拉流地址 (`{camera}` 为占位符)
pub fn stream_url(template: &str, camera_id: &CameraId) -> String {
    template.replace("{camera}", camera_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_matches_camera_rtsp_path() {
        let url = stream_url(
            "rtsp://{camera}:554/videoStreamId=1",
            &CameraId::new("192.168.1.20"),
        );
        assert_eq!(url, "rtsp://192.168.1.20:554/videoStreamId=1");
    }
}
