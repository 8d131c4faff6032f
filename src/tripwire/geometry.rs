// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 绊线几何 (Tripwire geometry)
//! 判断质心位于绊线哪一侧、是否落在判定带内

use serde::{Deserialize, Serialize};

use crate::types::Centroid;

/// 端点水平跨度小于该值时按竖线处理 (像素)
pub const VERTICAL_SPAN_PX: f32 = 10.0;
/// 斜率绝对值超过该值时按竖线处理, 避免数值爆炸
pub const SLOPE_CLAMP: f32 = 10.0;
/// 质心距离绊线小于该值视为"压线" (像素)
pub const LINE_MARGIN_PX: f32 = 10.0;

/// 几何侧 (翻转前)
///
/// `In` 为线的上方 (y 更小) 或竖线的左侧.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    In,
    Out,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::In => Side::Out,
            Side::Out => Side::In,
        }
    }
}

/// 单次质心相对绊线的位置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub side: Side,
    pub on_line: bool,
}

/// 绊线: 两个像素坐标端点, 构造时按 x 升序规范化
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tripwire {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Tripwire {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        if x1 <= x2 {
            Self { x1, y1, x2, y2 }
        } else {
            Self {
                x1: x2,
                y1: y2,
                x2: x1,
                y2: y1,
            }
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }

    /// 斜率; 竖线 (或近似竖线) 返回 None
    pub fn slope(&self) -> Option<f32> {
        let dx = self.x2 - self.x1;
        if dx < VERTICAL_SPAN_PX {
            return None;
        }
        let m = (self.y2 - self.y1) / dx;
        if m.abs() > SLOPE_CLAMP {
            None
        } else {
            Some(m)
        }
    }

    /// 计算质心的侧别与是否压线
    pub fn place(&self, c: Centroid) -> Placement {
        let (cx, cy) = (c.x as f32, c.y as f32);
        match self.slope() {
            Some(m) => {
                let b = self.y1 - m * self.x1;
                let expected_y = m * cx + b;
                Placement {
                    side: if cy < expected_y { Side::In } else { Side::Out },
                    on_line: (cy - expected_y).abs() < LINE_MARGIN_PX,
                }
            }
            None => {
                let line_x = self.x_at(cy);
                Placement {
                    side: if cx < line_x { Side::In } else { Side::Out },
                    on_line: (cx - line_x).abs() < LINE_MARGIN_PX,
                }
            }
        }
    }

    /// 竖线分支: 质心所在高度处绊线的 x 坐标
    fn x_at(&self, y: f32) -> f32 {
        let dy = self.y2 - self.y1;
        if dy.abs() < f32::EPSILON {
            return (self.x1 + self.x2) / 2.0;
        }
        self.x1 + (y - self.y1) * (self.x2 - self.x1) / dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_ordered_by_x() {
        let t = Tripwire::new(600.0, 10.0, 20.0, 400.0);
        assert_eq!((t.x1, t.y1, t.x2, t.y2), (20.0, 400.0, 600.0, 10.0));
    }

    #[test]
    fn horizontal_line_sides() {
        let t = Tripwire::new(0.0, 240.0, 640.0, 240.0);
        assert_eq!(t.slope(), Some(0.0));

        let above = t.place(Centroid::new(320, 235));
        assert_eq!(above.side, Side::In);
        assert!(above.on_line);

        let below = t.place(Centroid::new(320, 245));
        assert_eq!(below.side, Side::Out);
        assert!(below.on_line);

        let far = t.place(Centroid::new(320, 260));
        assert_eq!(far.side, Side::Out);
        assert!(!far.on_line);
    }

    #[test]
    fn margin_is_strict() {
        let t = Tripwire::new(0.0, 240.0, 640.0, 240.0);
        assert!(!t.place(Centroid::new(100, 250)).on_line);
        assert!(t.place(Centroid::new(100, 249)).on_line);
    }

    #[test]
    fn sloped_line_uses_expected_y() {
        // y = x/2 + 100
        let t = Tripwire::new(0.0, 100.0, 400.0, 300.0);
        let p = t.place(Centroid::new(200, 195));
        assert_eq!(p.side, Side::In);
        assert!(p.on_line);
        let p = t.place(Centroid::new(200, 230));
        assert_eq!(p.side, Side::Out);
        assert!(!p.on_line);
    }

    #[test]
    fn vertical_line_uses_x_comparison() {
        let t = Tripwire::new(320.0, 0.0, 320.0, 480.0);
        assert_eq!(t.slope(), None);

        let left = t.place(Centroid::new(315, 100));
        assert_eq!(left.side, Side::In);
        assert!(left.on_line);

        let right = t.place(Centroid::new(325, 100));
        assert_eq!(right.side, Side::Out);
        assert!(right.on_line);

        assert!(!t.place(Centroid::new(310, 100)).on_line);
    }

    #[test]
    fn steep_slope_is_clamped_to_vertical_branch() {
        // dx = 20, dy = 400 → |m| = 20
        let t = Tripwire::new(300.0, 0.0, 320.0, 400.0);
        assert_eq!(t.slope(), None);
        // at y = 200 the line passes x = 310
        assert!(t.place(Centroid::new(305, 200)).on_line);
        assert_eq!(t.place(Centroid::new(305, 200)).side, Side::In);
        assert_eq!(t.place(Centroid::new(315, 200)).side, Side::Out);
    }

    #[test]
    fn degenerate_point_tripwire_does_not_divide_by_zero() {
        let t = Tripwire::new(100.0, 100.0, 100.0, 100.0);
        let p = t.place(Centroid::new(95, 300));
        assert_eq!(p.side, Side::In);
        assert!(p.on_line);
    }

    #[test]
    fn non_finite_coordinates_are_detected() {
        assert!(!Tripwire::new(f32::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(Tripwire::new(0.0, 0.0, 1.0, 1.0).is_finite());
    }
}
