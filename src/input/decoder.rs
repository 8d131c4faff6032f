// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// RTSP主动拉流解码器
/// RTSP pulling decoder (FFmpeg, CPU software decoding) behind `FrameSource`
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{debug, info};

use super::decode_filter::CaptureFilter;
use super::source::{stream_url, FrameSource, FrameStream};
use crate::config::PipelineConfig;
use crate::types::CameraId;

/// FFmpeg视频源
#[derive(Clone, Debug)]
pub struct FfmpegSource {
    url_template: String,
    width: u32,
    height: u32,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl FfmpegSource {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            url_template: config.stream_url_template.clone(),
            width: config.frame_width,
            height: config.frame_height,
            open_timeout: Duration::from_secs(config.open_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn open(&self, camera_id: &CameraId) -> Result<Box<dyn FrameStream>> {
        let url = stream_url(&self.url_template, camera_id);
        info!(camera = %camera_id, %url, "📡 连接视频流");

        // 解码帧通道: 容量1, 读取端只取最新帧
        let (tx, rx) = crossbeam_channel::bounded::<RgbImage>(1);
        let (opened_tx, opened_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let filter = CaptureFilter::new(camera_id.clone(), tx, Arc::clone(&stop));
        let filter_desc = format!("scale={}:{},format=yuv420p", self.width, self.height);
        let opts = input_opts(self.read_timeout);
        let camera = camera_id.clone();

        // FFmpeg上下文的构建/启动/等待都在同一个线程内完成
        thread::Builder::new()
            .name(format!("ffmpeg-{}", camera_id))
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("capture", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let input = Input::new(url).set_input_opts(opts);

                let started = FfmpegContext::builder()
                    .input(input)
                    .filter_desc(filter_desc.as_str())
                    .output(out)
                    .build()
                    .map_err(|e| format!("构建失败: {}", e))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("启动失败: {}", e)));

                match started {
                    Ok(sch) => {
                        let _ = opened_tx.send(Ok(()));
                        let result = sch.wait();
                        debug!(camera = %camera, ?result, "FFmpeg调度结束");
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                    }
                }
            })
            .context("failed to spawn ffmpeg thread")?;

        match opened_rx.recv_timeout(self.open_timeout) {
            Ok(Ok(())) => Ok(Box::new(FfmpegStream {
                rx,
                stop,
                read_timeout: self.read_timeout,
            })),
            Ok(Err(e)) => Err(anyhow!("failed to open {}: {}", camera_id, e)),
            Err(_) => {
                stop.store(true, Ordering::Relaxed);
                Err(anyhow!(
                    "timed out opening {} after {:?}",
                    camera_id,
                    self.open_timeout
                ))
            }
        }
    }
}

/// RTSP输入参数: TCP + 大缓冲 + 套接字读写超时
///
/// 输入停滞时FFmpeg自身的读取超时出错, 调度结束, 线程与连接随之释放.
pub fn input_opts(read_timeout: Duration) -> HashMap<String, String> {
    let micros = read_timeout.as_micros().max(1).to_string();
    [
        ("rtsp_transport", "tcp".to_string()),
        ("buffer_size", "67108864".to_string()),
        ("rtsp_flags", "prefer_tcp".to_string()),
        ("timeout", micros.clone()),
        ("rw_timeout", micros),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// 已连接的FFmpeg流
pub struct FfmpegStream {
    rx: Receiver<RgbImage>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl FrameStream for FfmpegStream {
    fn read(&mut self) -> Result<RgbImage> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(image) => Ok(image),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "no frame within {:?}",
                self.read_timeout
            )),
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("stream ended")),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        // 有帧时过滤器立即退出; 无帧时由输入读写超时结束调度
        self.stop.store(true, Ordering::Relaxed);
    }
}
