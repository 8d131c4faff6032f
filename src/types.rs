// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流水线公共数据结构
/// Data structures shared by the capture, inference and publishing stages
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use image::RgbImage;

// ========== 公共常量 ==========

/// 解码输出画布尺寸 (与前端绘制绊线的坐标系一致)
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// COCO类别: 0=person
pub const PERSON_CLASS: usize = 0;

// ========== 数据结构 ==========

/// 摄像头标识 (IP或主机名)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CameraId(Arc<str>);

impl CameraId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref().trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// 像素坐标点 (整数, 用于质心)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl Centroid {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 检测框 (Detection bounding box, 原始帧像素坐标)
#[derive(Clone, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: 1.0,
            class_id: PERSON_CLASS as u32,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 质心: 先取整再求整数中点
    pub fn centroid(&self) -> Centroid {
        let (x1, y1, x2, y2) = (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        );
        Centroid::new((x1 + x2).div_euclid(2), (y1 + y2).div_euclid(2))
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.x1.max(another.x1);
        let r = self.x2.min(another.x2);
        let t = self.y1.max(another.y1);
        let b = self.y2.min(another.y2);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.area() + another.area() - self.intersection_area(another);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(another) / union
    }
}

/// 采集帧 (采集线程 → 帧缓冲 → 推理线程)
#[derive(Clone)]
pub struct Frame {
    pub camera_id: CameraId,
    pub image: RgbImage,
    pub seq: u64,               // 该摄像头内的采集序号
    pub captured_at: Instant,   // 用于延迟统计
    pub timestamp: SystemTime,  // 发布时附带的墙钟时间
}

impl Frame {
    pub fn new(camera_id: CameraId, image: RgbImage, seq: u64) -> Self {
        Self {
            camera_id,
            image,
            seq,
            captured_at: Instant::now(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("camera_id", &self.camera_id)
            .field("size", &(self.image.width(), self.image.height()))
            .field("seq", &self.seq)
            .finish()
    }
}

/// 标注后的帧 (推理线程 → 发布器)
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub camera_id: CameraId,
    pub image: RgbImage,
    pub seq: u64,
    pub timestamp: SystemTime,
}
