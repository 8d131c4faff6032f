// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器接口 (Detector)
//! 推理线程只依赖 [`PersonDetector`]: 输入归一化后的张量, 输出原始帧坐标的人体框

use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;
use ndarray::Array4;

use crate::types::{BBox, PERSON_CLASS};

/// 检测参数
#[derive(Clone, Debug, PartialEq)]
pub struct DetectParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub classes: Vec<usize>, // 只保留这些类别
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.5,
            iou_threshold: 0.4,
            classes: vec![PERSON_CLASS],
        }
    }
}

/// 模型输入: NCHW张量 + 原始帧尺寸 (用于坐标还原)
#[derive(Clone, Debug)]
pub struct ModelInput {
    pub tensor: Array4<f32>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl ModelInput {
    pub fn input_size(&self) -> u32 {
        self.tensor.shape()[3] as u32
    }

    /// 模型坐标 → 原始帧坐标的缩放系数
    pub fn scale(&self) -> (f32, f32) {
        let size = self.input_size() as f32;
        (
            self.frame_width as f32 / size,
            self.frame_height as f32 / size,
        )
    }
}

/// 外部检测器
pub trait PersonDetector: Send {
    /// 模型输入边长
    fn input_size(&self) -> u32;

    /// 返回原始帧像素坐标下的检测框
    fn detect(&mut self, input: &ModelInput, params: &DetectParams) -> Result<Vec<BBox>>;
}

impl<D: PersonDetector + ?Sized> PersonDetector for Box<D> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn detect(&mut self, input: &ModelInput, params: &DetectParams) -> Result<Vec<BBox>> {
        (**self).detect(input, params)
    }
}

/// 预处理: 固定缩放到 size×size, RGB平面, 像素值归一化到 [0,1]
pub fn preprocess(image: &RgbImage, size: u32) -> Result<ModelInput> {
    let (w, h) = image.dimensions();
    let src = fr::images::Image::from_vec_u8(w, h, image.as_raw().clone(), fr::PixelType::U8x3)
        .context("invalid source frame for resize")?;
    let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .context("resize failed")?;

    let size = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (idx, px) in dst.buffer().chunks_exact(3).enumerate() {
        let (y, x) = (idx / size, idx % size);
        tensor[[0, 0, y, x]] = px[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = px[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = px[2] as f32 / 255.0;
    }

    Ok(ModelInput {
        tensor,
        frame_width: w,
        frame_height: h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn preprocess_resizes_and_normalizes() {
        let image = RgbImage::from_pixel(64, 48, Rgb([255, 0, 51]));
        let input = preprocess(&image, 32).unwrap();
        assert_eq!(input.tensor.shape(), &[1, 3, 32, 32]);
        assert_eq!((input.frame_width, input.frame_height), (64, 48));
        assert!((input.tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!(input.tensor[[0, 1, 10, 10]].abs() < 1e-3);
        assert!((input.tensor[[0, 2, 10, 10]] - 0.2).abs() < 1e-2);
        assert!(input.tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn scale_maps_model_space_back_to_frame() {
        let input = preprocess(&RgbImage::new(640, 480), 320).unwrap();
        assert_eq!(input.scale(), (2.0, 1.5));
    }

    #[test]
    fn default_params_select_person_only() {
        let params = DetectParams::default();
        assert_eq!(params.classes, vec![PERSON_CLASS]);
        assert_eq!((params.conf_threshold, params.iou_threshold), (0.5, 0.4));
    }
}
