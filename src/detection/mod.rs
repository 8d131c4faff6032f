// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测系统 (Detection System)
///
/// 推理线程调用, 负责人体检测
/// - Detector: 检测器接口与预处理
/// - YOLOv8:   ONNX Runtime 推理后端
pub mod detector;
pub mod yolov8;

pub use detector::{preprocess, DetectParams, ModelInput, PersonDetector};
pub use yolov8::{decode_predictions, YOLOv8};

use std::cmp::Ordering;

use crate::types::BBox;

/// 非极大值抑制: 按置信度降序保留, 与已保留框 IOU 超过阈值的丢弃
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        b2.confidence
            .partial_cmp(&b1.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].iou(&xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
