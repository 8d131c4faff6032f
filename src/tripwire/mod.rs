// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 绊线计数模块
/// Tripwire crossing detection and per-camera counters
pub mod geometry;
pub mod tracker;

pub use geometry::{Placement, Side, Tripwire, LINE_MARGIN_PX, SLOPE_CLAMP, VERTICAL_SPAN_PX};
pub use tracker::{CameraState, Counts, Direction, TripwireConfig};
