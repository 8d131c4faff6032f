// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 绊线穿越状态机 (Tripwire crossing tracker)
//!
//! 每个摄像头一份 [`CameraState`]. 只有在质心"压线"且侧别发生变化时才计数,
//! 同一侧的重复观测不会重复计数.
//!
//! 已知限制: 仅使用当前帧质心, 不做跨帧身份关联; 在线附近徘徊的人
//! 或多人同时过线都可能导致计数漂移.

use serde::Serialize;

use super::geometry::{Side, Tripwire};
use crate::types::Centroid;

/// 穿越方向 (已考虑翻转)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// 计数快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    #[serde(rename = "in")]
    pub in_count: u64,
    #[serde(rename = "out")]
    pub out_count: u64,
}

impl Counts {
    /// 当前人数 = 进 - 出
    pub fn current(&self) -> i64 {
        self.in_count as i64 - self.out_count as i64
    }
}

/// 绊线配置 (几何 + 翻转标记总是一起设置)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TripwireConfig {
    pub line: Tripwire,
    pub flip_direction: bool,
}

/// 单个摄像头的可变状态
#[derive(Clone, Debug, Default)]
pub struct CameraState {
    counts: Counts,
    config: Option<TripwireConfig>,
    last_side: Option<Side>,
}

impl CameraState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub fn tripwire(&self) -> Option<&TripwireConfig> {
        self.config.as_ref()
    }

    pub fn flip_direction(&self) -> bool {
        self.config.map(|c| c.flip_direction).unwrap_or(false)
    }

    pub fn last_side(&self) -> Option<Side> {
        self.last_side
    }

    /// 设置或清除绊线; 任何几何变化都会清空侧别历史
    pub fn set_tripwire(&mut self, config: Option<TripwireConfig>) {
        self.config = config;
        self.last_side = None;
    }

    /// 处理一个质心观测, 发生穿越时返回方向
    pub fn observe(&mut self, centroid: Centroid) -> Option<Direction> {
        let config = self.config?;
        let placement = config.line.place(centroid);
        if !placement.on_line {
            return None;
        }

        let previous = self.last_side.replace(placement.side);
        match previous {
            Some(prev) if prev != placement.side => {
                let direction = match (placement.side, config.flip_direction) {
                    (Side::In, false) | (Side::Out, true) => Direction::In,
                    (Side::Out, false) | (Side::In, true) => Direction::Out,
                };
                match direction {
                    Direction::In => self.counts.in_count += 1,
                    Direction::Out => self.counts.out_count += 1,
                }
                Some(direction)
            }
            _ => None,
        }
    }

    /// 按顺序处理一帧内的全部质心, 返回发生的穿越
    pub fn observe_all<I>(&mut self, centroids: I) -> Vec<Direction>
    where
        I: IntoIterator<Item = Centroid>,
    {
        centroids
            .into_iter()
            .filter_map(|c| self.observe(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_line(x1: f32, y1: f32, x2: f32, y2: f32, flip: bool) -> CameraState {
        let mut state = CameraState::new();
        state.set_tripwire(Some(TripwireConfig {
            line: Tripwire::new(x1, y1, x2, y2),
            flip_direction: flip,
        }));
        state
    }

    fn walk(state: &mut CameraState, points: &[(i32, i32)]) -> Vec<Direction> {
        points
            .iter()
            .filter_map(|&(x, y)| state.observe(Centroid::new(x, y)))
            .collect()
    }

    #[test]
    fn no_tripwire_is_noop() {
        let mut state = CameraState::new();
        assert_eq!(state.observe(Centroid::new(320, 240)), None);
        assert_eq!(state.last_side(), None);
        assert_eq!(state.counts(), Counts::default());
    }

    #[test]
    fn horizontal_crossing_upwards_counts_in() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        let crossings = walk(&mut state, &[(320, 260), (320, 245), (320, 235), (320, 220)]);
        assert_eq!(crossings, vec![Direction::In]);
        assert_eq!(state.counts().in_count, 1);
        assert_eq!(state.counts().out_count, 0);
        assert_eq!(state.counts().current(), 1);
    }

    #[test]
    fn vertical_crossing_counts_once() {
        let mut state = with_line(320.0, 0.0, 320.0, 480.0, false);
        let path: Vec<(i32, i32)> = (310..=330).map(|x| (x, 200)).collect();
        let crossings = walk(&mut state, &path);
        assert_eq!(crossings.len(), 1);
        let c = state.counts();
        assert_eq!(c.in_count + c.out_count, 1);
        // 左(IN) → 右(OUT)
        assert_eq!(crossings[0], Direction::Out);
    }

    #[test]
    fn first_observation_only_establishes_baseline() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        assert_eq!(state.observe(Centroid::new(100, 235)), None);
        assert_eq!(state.last_side(), Some(Side::In));
        assert_eq!(state.counts(), Counts::default());
    }

    #[test]
    fn staying_on_one_side_never_counts() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        for _ in 0..100 {
            assert_eq!(state.observe(Centroid::new(300, 236)), None);
        }
        assert_eq!(state.counts(), Counts::default());
    }

    #[test]
    fn off_line_observations_keep_last_side() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        state.observe(Centroid::new(300, 235));
        state.observe(Centroid::new(300, 400));
        assert_eq!(state.last_side(), Some(Side::In));
    }

    #[test]
    fn new_tripwire_resets_history() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        state.observe(Centroid::new(320, 235));
        assert_eq!(state.last_side(), Some(Side::In));

        state.set_tripwire(Some(TripwireConfig {
            line: Tripwire::new(0.0, 200.0, 640.0, 200.0),
            flip_direction: false,
        }));
        assert_eq!(state.last_side(), None);
        // 新线下方: 不应因旧的侧别历史产生穿越
        assert_eq!(state.observe(Centroid::new(320, 205)), None);
        assert_eq!(state.counts(), Counts::default());
    }

    #[test]
    fn clearing_tripwire_clears_flip_and_side() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, true);
        state.observe(Centroid::new(320, 235));
        state.set_tripwire(None);
        assert!(state.tripwire().is_none());
        assert!(!state.flip_direction());
        assert_eq!(state.last_side(), None);
        assert_eq!(state.observe(Centroid::new(320, 245)), None);
    }

    #[test]
    fn flip_swaps_counters() {
        let path = [(320, 245), (320, 235), (320, 245), (320, 235)];

        let mut normal = with_line(0.0, 240.0, 640.0, 240.0, false);
        walk(&mut normal, &path);
        let mut flipped = with_line(0.0, 240.0, 640.0, 240.0, true);
        walk(&mut flipped, &path);

        assert_eq!(normal.counts().in_count, flipped.counts().out_count);
        assert_eq!(normal.counts().out_count, flipped.counts().in_count);
        assert_eq!(normal.counts().in_count, 2);
        assert_eq!(normal.counts().out_count, 1);
        assert_eq!(normal.counts().current(), -flipped.counts().current());
    }

    #[test]
    fn current_is_in_minus_out_after_every_observation() {
        let mut state = with_line(0.0, 100.0, 640.0, 400.0, false);
        // 伪随机轨迹 (线性同余), 覆盖各种压线/不压线组合
        let mut seed: u32 = 12345;
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let x = (seed >> 8) % 640;
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let y = (seed >> 8) % 480;
            state.observe(Centroid::new(x as i32, y as i32));
            let c = state.counts();
            assert_eq!(c.current(), c.in_count as i64 - c.out_count as i64);
        }
    }

    #[test]
    fn alternating_crossings_never_go_negative_when_entering_first() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        // 先从下方进入, 再交替进出
        let path = [(320, 245), (320, 235), (320, 245), (320, 235), (320, 245)];
        for &(x, y) in &path {
            state.observe(Centroid::new(x, y));
            assert!(state.counts().current() >= 0);
        }
        assert_eq!(state.counts().current(), 0);
    }

    #[test]
    fn observe_all_applies_in_order() {
        let mut state = with_line(0.0, 240.0, 640.0, 240.0, false);
        let crossings = state.observe_all([Centroid::new(10, 245), Centroid::new(600, 235)]);
        assert_eq!(crossings, vec![Direction::In]);
    }
}
