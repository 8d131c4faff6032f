// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制消息处理 (Control handler)

use std::sync::Arc;

use tracing::{info, warn};

use super::messages::{ControlError, ControlMessage, OutboundEvent};
use crate::input::CaptureManager;
use crate::publish::EventHub;
use crate::registry::CameraRegistry;

pub struct Controller {
    registry: Arc<CameraRegistry>,
    captures: Arc<CaptureManager>,
    hub: Arc<EventHub>,
}

impl Controller {
    pub fn new(
        registry: Arc<CameraRegistry>,
        captures: Arc<CaptureManager>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            registry,
            captures,
            hub,
        }
    }

    /// 处理一行原始消息; 被拒绝的消息只记录日志
    pub fn handle_line(&self, line: &str) -> Result<(), ControlError> {
        let result = ControlMessage::parse(line).and_then(|msg| self.handle(msg));
        if let Err(e) = &result {
            warn!("⚠️ 忽略控制消息: {}", e);
        }
        result
    }

    pub fn handle(&self, message: ControlMessage) -> Result<(), ControlError> {
        match message {
            ControlMessage::StartStream(req) => {
                let camera_id = req.camera_id()?;
                self.registry.entry(&camera_id);
                match self.captures.start(&camera_id) {
                    Ok(true) => info!(camera = %camera_id, "📡 开始采集"),
                    Ok(false) => info!(camera = %camera_id, "采集已在运行"),
                    Err(e) => {
                        return Err(ControlError::Capture {
                            camera: camera_id.to_string(),
                            reason: format!("{:#}", e),
                        })
                    }
                }
            }
            ControlMessage::StopStream(req) => {
                let camera_id = req.camera_id()?;
                if !self.captures.stop(&camera_id) {
                    info!(camera = %camera_id, "采集未运行");
                }
            }
            ControlMessage::SetTripwire(req) => {
                // 先完成全部校验再修改状态
                let camera_id = req.camera_id()?;
                let config = req.config()?;
                let snapshot = self.registry.set_tripwire(&camera_id, config);
                match snapshot.tripwire {
                    Some(c) => info!(
                        camera = %camera_id,
                        "📏 绊线 ({:.0},{:.0})-({:.0},{:.0}) flip={}",
                        c.line.x1, c.line.y1, c.line.x2, c.line.y2, c.flip_direction
                    ),
                    None => info!(camera = %camera_id, "绊线已清除"),
                }
                self.hub.broadcast(&OutboundEvent::tripwire_update(
                    &camera_id,
                    snapshot.tripwire,
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Backoff, FrameBuffer, FrameSource, FrameStream};
    use crate::tripwire::Tripwire;
    use crate::types::CameraId;
    use anyhow::{anyhow, Result};
    use std::time::Duration;

    struct OfflineSource;

    impl FrameSource for OfflineSource {
        fn open(&self, _camera_id: &CameraId) -> Result<Box<dyn FrameStream>> {
            Err(anyhow!("offline"))
        }
    }

    fn controller() -> (Controller, Arc<CameraRegistry>, Arc<CaptureManager>, Arc<EventHub>) {
        let registry = Arc::new(CameraRegistry::new());
        let captures = Arc::new(CaptureManager::new(
            Arc::new(OfflineSource),
            Arc::new(FrameBuffer::new()),
            Backoff {
                open_retry: Duration::from_secs(30),
                reconnect: Duration::from_secs(30),
            },
        ));
        let hub = Arc::new(EventHub::new(8));
        let controller = Controller::new(registry.clone(), captures.clone(), hub.clone());
        (controller, registry, captures, hub)
    }

    fn next_event(rx: &crossbeam_channel::Receiver<crate::publish::EventLine>) -> OutboundEvent {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn set_tripwire_updates_registry_and_broadcasts() {
        let (controller, registry, _captures, hub) = controller();
        let sub = hub.subscribe();

        controller
            .handle_line(r#"{"event":"set_tripwire","data":{"camera_ip":"cam","tripwire":{"x1":640,"y1":240,"x2":0,"y2":240},"flip_direction":true}}"#)
            .unwrap();

        let cam = CameraId::new("cam");
        let snapshot = registry.snapshot(&cam).unwrap();
        let config = snapshot.tripwire.unwrap();
        assert_eq!(config.line, Tripwire::new(0.0, 240.0, 640.0, 240.0));
        assert!(config.flip_direction);
        assert_eq!(
            next_event(&sub.rx),
            OutboundEvent::TripwireUpdate {
                camera_ip: "cam".into(),
                tripwire: Some(Tripwire::new(0.0, 240.0, 640.0, 240.0)),
                flip_direction: true,
            }
        );
    }

    #[test]
    fn malformed_tripwire_keeps_previous_and_emits_nothing() {
        let (controller, registry, _captures, hub) = controller();
        controller
            .handle_line(r#"{"event":"set_tripwire","data":{"camera_ip":"cam","tripwire":{"x1":0,"y1":240,"x2":640,"y2":240}}}"#)
            .unwrap();
        let sub = hub.subscribe();

        let err = controller
            .handle_line(r#"{"event":"set_tripwire","data":{"camera_ip":"cam","tripwire":{"x1":0,"y1":"abc","x2":640,"y2":240},"flip_direction":true}}"#)
            .unwrap_err();
        assert!(matches!(err, ControlError::NotNumeric { field: "y1", .. }));

        let config = registry
            .snapshot(&CameraId::new("cam"))
            .unwrap()
            .tripwire
            .unwrap();
        assert_eq!(config.line, Tripwire::new(0.0, 240.0, 640.0, 240.0));
        assert!(!config.flip_direction);
        assert!(sub.rx.is_empty());
    }

    #[test]
    fn clearing_broadcasts_null_tripwire() {
        let (controller, registry, _captures, hub) = controller();
        let sub = hub.subscribe();
        controller
            .handle_line(r#"{"event":"set_tripwire","data":{"camera_ip":"cam","tripwire":null}}"#)
            .unwrap();
        assert!(registry.contains(&CameraId::new("cam")));
        assert_eq!(
            next_event(&sub.rx),
            OutboundEvent::tripwire_update(&CameraId::new("cam"), None)
        );
    }

    #[test]
    fn start_and_stop_stream_drive_the_capture_manager() {
        let (controller, registry, captures, _hub) = controller();
        let cam = CameraId::new("10.0.0.7");

        controller
            .handle_line(r#"{"event":"start_stream","data":{"camera_ip":"10.0.0.7"}}"#)
            .unwrap();
        controller
            .handle_line(r#"{"event":"start_stream","data":{"camera_id":"10.0.0.7"}}"#)
            .unwrap();
        assert!(registry.contains(&cam));
        assert_eq!(captures.cameras(), vec![cam.clone()]);

        controller
            .handle_line(r#"{"event":"stop_stream","data":{"camera_ip":"10.0.0.7"}}"#)
            .unwrap();
        assert!(!captures.is_running(&cam));
        captures.stop_all();
    }

    #[test]
    fn start_without_camera_is_rejected() {
        let (controller, registry, captures, _hub) = controller();
        assert_eq!(
            controller.handle_line(r#"{"event":"start_stream","data":{}}"#),
            Err(ControlError::MissingCamera)
        );
        assert!(registry.cameras().is_empty());
        assert!(captures.cameras().is_empty());
    }
}
