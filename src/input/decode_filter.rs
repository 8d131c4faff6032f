// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: YUV420P frames → RGB images for one camera
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::types::CameraId;

/// 解码过滤器: 每帧转换为RGB后交给读取端
pub struct CaptureFilter {
    camera_id: CameraId,
    tx: Sender<RgbImage>,
    stop: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    total_frames: usize,
    dropped_frames: usize,
}

impl CaptureFilter {
    pub fn new(camera_id: CameraId, tx: Sender<RgbImage>, stop: Arc<AtomicBool>) -> Self {
        Self {
            camera_id,
            tx,
            stop,
            count: 0,
            last: Instant::now(),
            total_frames: 0,
            dropped_frames: 0,
        }
    }

    fn skip(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.dropped_frames <= 10 {
            warn!(camera = %self.camera_id, frame = self.total_frames, "⚠️ 丢弃帧: {}", reason);
        }
        Ok(None)
    }
}

impl FrameFilter for CaptureFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!(camera = %self.camera_id, "✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 读取端已释放: 让FFmpeg停止解码
        if self.stop.load(Ordering::Relaxed) {
            return Err("capture released".to_string());
        }

        self.total_frames += 1;

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return self.skip("空帧/损坏帧");
            }

            let w = (*frame.as_ptr()).width as u32;
            let h = (*frame.as_ptr()).height as u32;
            if w == 0 || h == 0 || w > 4096 || h > 4096 {
                return self.skip("非法分辨率");
            }

            // 缺少参考帧或比特流无效
            if !decode_ok((*frame.as_ptr()).decode_error_flags) {
                return self.skip("解码错误标志");
            }

            let y_plane = (*frame.as_ptr()).data[0];
            let u_plane = (*frame.as_ptr()).data[1];
            let v_plane = (*frame.as_ptr()).data[2];
            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                return self.skip("YUV指针为空");
            }

            let linesize = (*frame.as_ptr()).linesize;
            let Some((y_stride, uv_stride)) = plane_strides(linesize[0], linesize[1], w) else {
                return self.skip("步长异常");
            };

            let planes = YuvPlanes {
                y: std::slice::from_raw_parts(y_plane, y_stride * h as usize),
                u: std::slice::from_raw_parts(u_plane, uv_stride * (h as usize).div_ceil(2)),
                v: std::slice::from_raw_parts(v_plane, uv_stride * (h as usize).div_ceil(2)),
                y_stride,
                uv_stride,
            };
            let rgb = yuv420p_to_rgb(&planes, w, h);

            self.count += 1;
            if self.last.elapsed().as_secs_f64() >= 1.0 {
                let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
                debug!(
                    camera = %self.camera_id,
                    "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                    fps, self.total_frames, self.dropped_frames
                );
                self.last = Instant::now();
                self.count = 0;
            }

            match self.tx.try_send(rgb) {
                Ok(()) => {}
                // 读取端来不及取: 丢弃本帧, 下游只关心最新帧
                Err(TrySendError::Full(_)) => self.dropped_frames += 1,
                Err(TrySendError::Disconnected(_)) => {
                    return Err("capture reader disconnected".to_string());
                }
            }
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(camera = %self.camera_id, "✅ 解码线程退出");
    }
}

/// `decode_error_flags` 中的 INVALID_BITSTREAM | MISSING_REFERENCE
const SEVERE_DECODE_ERRORS: i32 = 0x03;

fn decode_ok(flags: i32) -> bool {
    flags & SEVERE_DECODE_ERRORS == 0
}

/// 校验 Y/UV 步长; 负步长 (倒置图像) 与过短的行都拒绝
fn plane_strides(y_linesize: i32, uv_linesize: i32, width: u32) -> Option<(usize, usize)> {
    let y_stride = usize::try_from(y_linesize).ok().filter(|&s| s > 0)?;
    let uv_stride = usize::try_from(uv_linesize).ok().filter(|&s| s > 0)?;
    if y_stride < width as usize || uv_stride < (width as usize).div_ceil(2) {
        return None;
    }
    Some((y_stride, uv_stride))
}

/// YUV420P 平面数据
pub struct YuvPlanes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
}

/// YUV420P → RGB (BT.601)
pub fn yuv420p_to_rgb(planes: &YuvPlanes<'_>, w: u32, h: u32) -> RgbImage {
    let (w, h) = (w as usize, h as usize);
    let mut rgb = vec![0u8; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let y_val = planes.y[y * planes.y_stride + x] as f32;
            let uv_idx = (y / 2) * planes.uv_stride + x / 2;
            let u_val = planes.u[uv_idx] as f32 - 128.0;
            let v_val = planes.v[uv_idx] as f32 - 128.0;

            let idx = (y * w + x) * 3;
            rgb[idx] = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
            rgb[idx + 1] = (y_val - 0.344 * u_val - 0.714 * v_val).clamp(0.0, 255.0) as u8;
            rgb[idx + 2] = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;
        }
    }
    RgbImage::from_raw(w as u32, h as u32, rgb).unwrap_or_else(|| RgbImage::new(0, 0))
}
