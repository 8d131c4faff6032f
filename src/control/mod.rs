// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 控制通道 (Control channel)
///
/// - Messages: 入站/出站事件与校验
/// - Handler:  把入站事件作用到注册表与采集管理器
/// - Server:   TCP JSON-lines 服务
pub mod handler;
pub mod messages;
pub mod server;

pub use handler::Controller;
pub use messages::{
    parse_tripwire, CameraRef, ControlError, ControlMessage, OutboundEvent, SetTripwireRequest,
};
pub use server::ControlServer;
