// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理线程 (Inference worker)
/// 职责: 取帧 → 人体检测 → 质心过线判定 → 标注 → 发布
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use super::overlay::Annotator;
use crate::detection::{preprocess, DetectParams, PersonDetector};
use crate::input::FrameBuffer;
use crate::publish::Publisher;
use crate::registry::CameraRegistry;
use crate::shutdown::Shutdown;
use crate::types::{AnnotatedFrame, BBox, Centroid, Frame};

/// 单步结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// 超时内没有帧
    Idle,
    /// 帧被丢弃 (空帧、检测失败或 panic)
    Skipped,
    Processed { detections: usize, crossings: usize },
}

/// 每秒统计
struct Throughput {
    frames: u64,
    skipped: u64,
    detect_time: Duration,
    latency: Duration,
    last: Instant,
}

impl Throughput {
    fn new() -> Self {
        Self {
            frames: 0,
            skipped: 0,
            detect_time: Duration::ZERO,
            latency: Duration::ZERO,
            last: Instant::now(),
        }
    }

    fn report(&mut self, buffer: &FrameBuffer) {
        let elapsed = self.last.elapsed();
        if elapsed < Duration::from_secs(1) {
            return;
        }
        if self.frames > 0 || self.skipped > 0 {
            let n = self.frames.max(1) as u32;
            let stats = buffer.stats();
            info!(
                "📊 推理 {:.1} fps | 检测 {:.1}ms | 延迟 {:.1}ms | 跳过 {} | 缓冲丢弃 {}",
                self.frames as f64 / elapsed.as_secs_f64(),
                (self.detect_time / n).as_secs_f64() * 1000.0,
                (self.latency / n).as_secs_f64() * 1000.0,
                self.skipped,
                stats.dropped,
            );
        }
        self.frames = 0;
        self.skipped = 0;
        self.detect_time = Duration::ZERO;
        self.latency = Duration::ZERO;
        self.last = Instant::now();
    }
}

pub struct InferenceWorker<D> {
    buffer: Arc<FrameBuffer>,
    registry: Arc<CameraRegistry>,
    detector: D,
    publisher: Arc<dyn Publisher>,
    annotator: Annotator,
    params: DetectParams,
    pop_timeout: Duration,
    throughput: Throughput,
}

impl<D: PersonDetector> InferenceWorker<D> {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        registry: Arc<CameraRegistry>,
        detector: D,
        publisher: Arc<dyn Publisher>,
        annotator: Annotator,
        params: DetectParams,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            buffer,
            registry,
            detector,
            publisher,
            annotator,
            params,
            pop_timeout,
            throughput: Throughput::new(),
        }
    }

    /// 处理至多一帧; 任何单帧错误都不会中断调用方的循环
    pub fn step(&mut self) -> StepOutcome {
        let outcome = match self.buffer.pop_timeout(self.pop_timeout) {
            None => StepOutcome::Idle,
            Some(frame) if frame.is_empty() => {
                warn!(camera = %frame.camera_id, seq = frame.seq, "空帧, 跳过");
                StepOutcome::Skipped
            }
            Some(frame) => {
                let camera_id = frame.camera_id.clone();
                match panic::catch_unwind(AssertUnwindSafe(|| self.process(frame))) {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        warn!(camera = %camera_id, "帧处理失败: {:#}", e);
                        StepOutcome::Skipped
                    }
                    Err(_) => {
                        error!(camera = %camera_id, "检测过程 panic, 丢弃该帧");
                        StepOutcome::Skipped
                    }
                }
            }
        };

        if outcome == StepOutcome::Skipped {
            self.throughput.skipped += 1;
        }
        self.throughput.report(&self.buffer);
        outcome
    }

    fn process(&mut self, frame: Frame) -> Result<StepOutcome> {
        let start = Instant::now();
        let input = preprocess(&frame.image, self.detector.input_size())
            .context("preprocess failed")?;
        let boxes = self
            .detector
            .detect(&input, &self.params)
            .context("detection failed")?;
        let detect_time = start.elapsed();

        let centroids: Vec<Centroid> = boxes.iter().map(BBox::centroid).collect();
        let observation = self.registry.observe(&frame.camera_id, &centroids);
        let counts = observation.snapshot.counts;
        for direction in &observation.crossings {
            info!(
                camera = %frame.camera_id,
                "🚶 过线 {:?} | IN {} OUT {} CURRENT {}",
                direction,
                counts.in_count,
                counts.out_count,
                counts.current()
            );
        }

        let Frame {
            camera_id,
            mut image,
            seq,
            captured_at,
            timestamp,
        } = frame;
        self.annotator
            .annotate(&mut image, &boxes, &observation.snapshot);
        debug!(camera = %camera_id, seq, detections = boxes.len(), "帧处理完成");

        self.publisher.publish_frame(AnnotatedFrame {
            camera_id: camera_id.clone(),
            image,
            seq,
            timestamp,
        });
        if !observation.crossings.is_empty() {
            self.publisher.publish_counts(&camera_id, counts);
        }

        self.throughput.frames += 1;
        self.throughput.detect_time += detect_time;
        self.throughput.latency += captured_at.elapsed();

        Ok(StepOutcome::Processed {
            detections: boxes.len(),
            crossings: observation.crossings.len(),
        })
    }

    /// 循环处理直到取消
    pub fn run(&mut self, shutdown: &Shutdown) {
        info!("🔍 推理线程启动");
        while !shutdown.is_cancelled() {
            self.step();
        }
        info!("推理线程退出");
    }
}

impl<D: PersonDetector + 'static> InferenceWorker<D> {
    pub fn spawn(mut self, shutdown: Shutdown) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("inference".into())
            .spawn(move || self.run(&shutdown))
            .context("failed to spawn inference thread")
    }
}
