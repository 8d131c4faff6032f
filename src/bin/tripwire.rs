// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// RTSP 绊线人数统计服务
///
/// 每摄像头一个采集线程 + 单个推理线程 + 编码线程 + TCP控制服务
///
/// 主程序入口 - 直接运行: cargo run --bin tripwire --release -- --camera 192.168.1.64
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tripwire_counter::control::{CameraRef, ControlMessage};
use tripwire_counter::detection::{DetectParams, YOLOv8};
use tripwire_counter::input::{Backoff, CaptureManager, FfmpegSource, FrameBuffer, FrameSource};
use tripwire_counter::pipeline::{Annotator, InferenceWorker};
use tripwire_counter::publish::{EventHub, FramePublisher};
use tripwire_counter::{shutdown, Args, CameraRegistry, ControlServer, Controller, PipelineConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    info!("🚀 tripwire-counter v{}", env!("CARGO_PKG_VERSION"));
    let config = PipelineConfig::load(&args.config);
    config.log_summary();

    // 1. 检测模型与标注
    let detector = YOLOv8::new(&args.model, config.input_size, args.cuda, args.device_id)?;
    let annotator = Annotator::load(args.font.as_deref())?;
    let params = DetectParams {
        conf_threshold: config.conf_threshold,
        iou_threshold: config.iou_threshold,
        ..Default::default()
    };

    // 2. 共享状态
    let (trigger, shutdown) = shutdown::channel();
    let registry = Arc::new(CameraRegistry::new());
    let buffer = Arc::new(FrameBuffer::new());
    let hub = Arc::new(EventHub::new(config.subscriber_queue));

    // 3. 发布 (编码线程)
    let publisher = Arc::new(FramePublisher::spawn(
        Arc::clone(&hub),
        config.jpeg_quality,
        config.encoder_queue,
        shutdown.clone(),
    )?);

    // 4. 推理线程
    let worker = InferenceWorker::new(
        Arc::clone(&buffer),
        Arc::clone(&registry),
        detector,
        publisher.clone(),
        annotator,
        params,
        Duration::from_millis(config.pop_timeout_ms),
    )
    .spawn(shutdown.clone())?;

    // 5. 采集管理
    let source: Arc<dyn FrameSource> = Arc::new(FfmpegSource::new(&config));
    let captures = Arc::new(CaptureManager::new(
        source,
        buffer,
        Backoff::from(&config),
    ));

    // 6. 控制服务
    let controller = Arc::new(Controller::new(
        registry,
        Arc::clone(&captures),
        Arc::clone(&hub),
    ));
    for camera in &args.cameras {
        let start = ControlMessage::StartStream(CameraRef {
            camera_ip: Some(camera.clone()),
        });
        if let Err(e) = controller.handle(start) {
            error!(camera = %camera, "启动采集失败: {}", e);
        }
    }
    let server = ControlServer::bind(&args.listen, controller, hub, shutdown)?;

    // Ctrl+C → 取消信号, 控制服务随之退出
    let on_signal = trigger.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("🛑 收到 Ctrl+C, 正在退出...");
        on_signal.trigger();
    }) {
        warn!("Ctrl+C 处理器安装失败: {}", e);
    }
    server.run();

    // 控制服务退出后依次停止各线程
    trigger.trigger();
    captures.stop_all();
    if worker.join().is_err() {
        error!("推理线程异常退出");
    }
    publisher.join();
    info!("👋 已退出");
    Ok(())
}
