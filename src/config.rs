// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置 - 命令行参数 + JSON文件调整流水线参数

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{FRAME_HEIGHT, FRAME_WIDTH, INF_SIZE};

/// 绊线人数统计服务
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "RTSP 绊线人数统计", long_about = None)]
pub struct Args {
    /// 控制通道监听地址
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    pub listen: String,

    /// YOLOv8 ONNX 检测模型
    #[arg(short, long, default_value = "models/yolov8n.onnx")]
    pub model: PathBuf,

    /// 流水线参数文件 (不存在时自动创建)
    #[arg(short, long, default_value = "tripwire.json")]
    pub config: PathBuf,

    /// 叠加文字使用的字体 (TTF/OTF); 缺省时不绘制计数文字
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 启动时立即开始采集的摄像头 (可重复)
    #[arg(long = "camera")]
    pub cameras: Vec<String>,

    /// 使用CUDA执行推理
    #[arg(long)]
    pub cuda: bool,

    /// GPU设备ID
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 日志级别 (可被 RUST_LOG 覆盖)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// 流水线参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 检测参数 ===
    pub input_size: u32,          // 模型输入尺寸 (正方形)
    pub conf_threshold: f32,      // 检测置信度阈值
    pub iou_threshold: f32,       // NMS IOU阈值

    // === 采集参数 ===
    pub stream_url_template: String, // 拉流地址模板, {camera} 为摄像头ID
    pub frame_width: u32,            // 解码输出宽度
    pub frame_height: u32,           // 解码输出高度
    pub open_retry_secs: u64,        // 打开失败重试间隔
    pub reconnect_secs: u64,         // 断流重连间隔
    pub open_timeout_secs: u64,      // 打开超时
    pub read_timeout_secs: u64,      // 读帧超时

    // === 推理线程 ===
    pub pop_timeout_ms: u64, // 帧缓冲为空时的等待

    // === 发布参数 ===
    pub jpeg_quality: u8,          // JPEG质量 (1-100)
    pub encoder_queue: usize,      // 编码线程队列深度
    pub subscriber_queue: usize,   // 每个订阅者的发送队列深度
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size: INF_SIZE,
            conf_threshold: 0.5,
            iou_threshold: 0.4,

            stream_url_template: "rtsp://{camera}:554/videoStreamId=1".to_string(),
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            open_retry_secs: 5,
            reconnect_secs: 3,
            open_timeout_secs: 15,
            read_timeout_secs: 10,

            pop_timeout_ms: 50,

            jpeg_quality: 80,
            encoder_queue: 4,
            subscriber_queue: 32,
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config.sanitized()
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 修正越界取值
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            warn!("conf_threshold={} 越界, 使用默认值", self.conf_threshold);
            self.conf_threshold = defaults.conf_threshold;
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            warn!("iou_threshold={} 越界, 使用默认值", self.iou_threshold);
            self.iou_threshold = defaults.iou_threshold;
        }
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self.input_size = self.input_size.max(32);
        self.frame_width = self.frame_width.max(1);
        self.frame_height = self.frame_height.max(1);
        self.open_retry_secs = self.open_retry_secs.max(1);
        self.reconnect_secs = self.reconnect_secs.max(1);
        self.open_timeout_secs = self.open_timeout_secs.max(1);
        self.read_timeout_secs = self.read_timeout_secs.max(1);
        self.pop_timeout_ms = self.pop_timeout_ms.max(1);
        self.encoder_queue = self.encoder_queue.max(1);
        self.subscriber_queue = self.subscriber_queue.max(1);
        self
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            "🎛️ 检测: conf={:.2} iou={:.2} 输入{}x{} | 画面{}x{} | 重试{}s/重连{}s",
            self.conf_threshold,
            self.iou_threshold,
            self.input_size,
            self.input_size,
            self.frame_width,
            self.frame_height,
            self.open_retry_secs,
            self.reconnect_secs,
        );
    }
}
