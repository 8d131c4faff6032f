// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 人体检测器
// 包含: 模型加载、推理、后处理 (类别过滤 + NMS)

use std::path::Path;

use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::info;

use super::detector::{DetectParams, ModelInput, PersonDetector};
use super::non_max_suppression;
use crate::types::BBox;

const CXYWH_OFFSET: usize = 4;

/// YOLOv8 ONNX 检测模型
pub struct YOLOv8 {
    session: Session,
    input_name: String,
    input_size: u32,
}

impl YOLOv8 {
    pub fn new(model: &Path, input_size: u32, cuda: bool, device_id: i32) -> Result<Self> {
        info!("📦 加载检测模型: {}", model.display());

        let mut builder = Session::builder()?;
        if cuda {
            info!("启用 CUDA 执行 (device {})", device_id);
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build()])?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(model)
            .with_context(|| format!("failed to load model {}", model.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());

        info!("✅ YOLOv8 检测模型加载成功 (输入 {})", input_name);
        Ok(Self {
            session,
            input_name,
            input_size,
        })
    }
}

impl PersonDetector for YOLOv8 {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn detect(&mut self, input: &ModelInput, params: &DetectParams) -> Result<Vec<BBox>> {
        let size = input.input_size() as usize;
        let shape = [1usize, 3, size, size];
        let data: Vec<f32> = input.tensor.iter().copied().collect();
        let value = ort::value::Value::from_array((shape.as_slice(), data.into_boxed_slice()))?;

        let name = self.input_name.clone();
        let outputs = self.session.run(ort::inputs![name.as_str() => value])?;
        let (output_shape, preds) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = output_shape.iter().map(|&d| d.max(0) as usize).collect();

        let mut bboxes = decode_predictions(preds, &dims, params, input.scale())?;
        let (w, h) = (input.frame_width as f32, input.frame_height as f32);
        for bbox in &mut bboxes {
            bbox.x1 = bbox.x1.clamp(0.0, w);
            bbox.y1 = bbox.y1.clamp(0.0, h);
            bbox.x2 = bbox.x2.clamp(0.0, w);
            bbox.y2 = bbox.y2.clamp(0.0, h);
        }
        Ok(bboxes)
    }
}

/// 解码 YOLOv8 原始输出 `[1, 4+nc, anchors]` (或转置的 `[1, anchors, 4+nc]`)
///
/// 每个锚点取最高分类别; 类别不在 `params.classes` 或低于置信度阈值的丢弃,
/// 其余按 `scale` 还原到原始帧坐标后做 NMS.
pub fn decode_predictions(
    preds: &[f32],
    dims: &[usize],
    params: &DetectParams,
    scale: (f32, f32),
) -> Result<Vec<BBox>> {
    let (rows, cols) = match dims {
        [1, a, b] | [a, b] => (*a, *b),
        _ => bail!("unexpected output shape {:?}", dims),
    };
    if preds.len() < rows * cols {
        bail!("output has {} values, shape {:?}", preds.len(), dims);
    }
    // 通道数远小于锚点数: 判断布局
    let channels_first = rows <= cols;
    let (channels, anchors) = if channels_first { (rows, cols) } else { (cols, rows) };
    if channels <= CXYWH_OFFSET {
        bail!("output has no class scores: shape {:?}", dims);
    }
    let at = |c: usize, i: usize| -> f32 {
        if channels_first {
            preds[c * anchors + i]
        } else {
            preds[i * channels + c]
        }
    };

    let (sx, sy) = scale;
    let mut bboxes = Vec::new();
    for i in 0..anchors {
        let (id, confidence) = (CXYWH_OFFSET..channels)
            .map(|c| (c - CXYWH_OFFSET, at(c, i)))
            .fold((0, f32::MIN), |max, x| if x.1 > max.1 { x } else { max });

        if confidence < params.conf_threshold || !params.classes.contains(&id) {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        bboxes.push(BBox {
            x1: (cx - w / 2.0) * sx,
            y1: (cy - h / 2.0) * sy,
            x2: (cx + w / 2.0) * sx,
            y2: (cy + h / 2.0) * sy,
            confidence,
            class_id: id as u32,
        });
    }

    non_max_suppression(&mut bboxes, params.iou_threshold);
    Ok(bboxes)
}
