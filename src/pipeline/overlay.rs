// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 画面标注 (Overlay)
/// 检测框、质心、绊线与 IN/OUT/CURRENT 计数
use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use tracing::info;

use crate::registry::CameraSnapshot;
use crate::tripwire::Tripwire;
use crate::types::BBox;

const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const BOX_THICKNESS: i32 = 2;
const LINE_THICKNESS: i32 = 3;
const CENTROID_RADIUS: i32 = 5;
const TEXT_SCALE: f32 = 24.0;
const TEXT_X: i32 = 20;
const TEXT_BASELINES: [i32; 3] = [30, 60, 90];

#[derive(Clone, Default)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new(font: Option<FontArc>) -> Self {
        Self { font }
    }

    /// 加载 TTF/OTF 字体; 未提供路径时不绘制文字
    pub fn load(font: Option<&Path>) -> Result<Self> {
        let Some(path) = font else {
            info!("未指定字体, 画面不叠加计数文字");
            return Ok(Self::default());
        };
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("invalid font {}", path.display()))?;
        info!("🔤 字体已加载: {}", path.display());
        Ok(Self::new(Some(font)))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, image: &mut RgbImage, boxes: &[BBox], snapshot: &CameraSnapshot) {
        for bbox in boxes {
            draw_box(image, bbox);
            let c = bbox.centroid();
            draw_filled_circle_mut(image, (c.x, c.y), CENTROID_RADIUS, RED);
        }

        if let Some(config) = &snapshot.tripwire {
            draw_tripwire(image, &config.line);
        }

        if let Some(font) = &self.font {
            let counts = snapshot.counts;
            let rows = [
                (format!("IN: {}", counts.in_count), GREEN),
                (format!("OUT: {}", counts.out_count), RED),
                (format!("CURRENT: {}", counts.current()), WHITE),
            ];
            let scale = PxScale::from(TEXT_SCALE);
            for ((text, color), baseline) in rows.iter().zip(TEXT_BASELINES) {
                // draw_text_mut 以左上角定位
                let top = baseline - TEXT_SCALE as i32 + 4;
                draw_text_mut(image, *color, TEXT_X, top, scale, font, text);
            }
        }
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BBox) {
    let (x1, y1) = (bbox.x1 as i32, bbox.y1 as i32);
    let (x2, y2) = (bbox.x2 as i32, bbox.y2 as i32);
    for inset in 0..BOX_THICKNESS {
        let w = x2 - x1 - 2 * inset;
        let h = y2 - y1 - 2 * inset;
        if w < 1 || h < 1 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, YELLOW);
    }
}

fn draw_tripwire(image: &mut RgbImage, line: &Tripwire) {
    let half = LINE_THICKNESS / 2;
    for dx in -half..=half {
        for dy in -half..=half {
            let (dx, dy) = (dx as f32, dy as f32);
            draw_line_segment_mut(
                image,
                (line.x1 + dx, line.y1 + dy),
                (line.x2 + dx, line.y2 + dy),
                RED,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tripwire::{Counts, TripwireConfig};

    fn snapshot(tripwire: Option<Tripwire>) -> CameraSnapshot {
        CameraSnapshot {
            counts: Counts {
                in_count: 2,
                out_count: 1,
            },
            tripwire: tripwire.map(|line| TripwireConfig {
                line,
                flip_direction: false,
            }),
            last_side: None,
        }
    }

    #[test]
    fn draws_boxes_centroids_and_line() {
        let mut image = RgbImage::new(640, 480);
        let boxes = [BBox::new(100.0, 100.0, 200.0, 300.0)];
        Annotator::default().annotate(
            &mut image,
            &boxes,
            &snapshot(Some(Tripwire::new(0.0, 400.0, 640.0, 400.0))),
        );

        assert_eq!(image.get_pixel(100, 150), &YELLOW);
        assert_eq!(image.get_pixel(101, 150), &YELLOW);
        assert_eq!(image.get_pixel(150, 200), &RED); // 质心
        assert_eq!(image.get_pixel(320, 400), &RED);
        assert_eq!(image.get_pixel(320, 401), &RED);
        assert_eq!(image.get_pixel(320, 420), &Rgb([0, 0, 0]));
    }

    #[test]
    fn no_tripwire_means_no_line() {
        let mut image = RgbImage::new(64, 48);
        Annotator::default().annotate(&mut image, &[], &snapshot(None));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn degenerate_boxes_are_tolerated() {
        let mut image = RgbImage::new(64, 48);
        let boxes = [
            BBox::new(10.0, 10.0, 10.0, 10.0),
            BBox::new(60.0, 40.0, 200.0, 300.0),
            BBox::new(-50.0, -50.0, -10.0, -10.0),
        ];
        Annotator::default().annotate(&mut image, &boxes, &snapshot(None));
    }

    #[test]
    fn missing_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Annotator::load(Some(&dir.path().join("none.ttf"))).is_err());
        assert!(!Annotator::load(None).unwrap().has_font());
    }
}
