// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 控制通道消息 (Control channel messages)
//!
//! 每行一个 JSON 对象: `{"event": "<name>", "data": {...}}`.
//! 摄像头字段沿用 `camera_ip`, 入站同时接受 `camera_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tripwire::{Counts, Tripwire, TripwireConfig};
use crate::types::CameraId;

/// 控制消息校验错误; 任何错误都不修改状态
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("missing camera id")]
    MissingCamera,
    #[error("tripwire must be an object or null")]
    InvalidTripwire,
    #[error("tripwire field `{0}` is missing")]
    MissingCoordinate(&'static str),
    #[error("tripwire field `{field}` is not a number: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("tripwire field `{0}` is not finite")]
    NonFinite(&'static str),
    #[error("failed to start capture for {camera}: {reason}")]
    Capture { camera: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraRef {
    #[serde(default, alias = "camera_id")]
    pub camera_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetTripwireRequest {
    #[serde(default, alias = "camera_id")]
    pub camera_ip: Option<String>,
    #[serde(default)]
    pub tripwire: Value,
    #[serde(default)]
    pub flip_direction: Option<bool>,
}

/// 入站消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    StartStream(CameraRef),
    StopStream(CameraRef),
    SetTripwire(SetTripwireRequest),
}

impl ControlMessage {
    pub fn parse(line: &str) -> Result<Self, ControlError> {
        serde_json::from_str(line).map_err(|e| ControlError::InvalidMessage(e.to_string()))
    }
}

impl CameraRef {
    pub fn camera_id(&self) -> Result<CameraId, ControlError> {
        camera_id(self.camera_ip.as_deref())
    }
}

impl SetTripwireRequest {
    pub fn camera_id(&self) -> Result<CameraId, ControlError> {
        camera_id(self.camera_ip.as_deref())
    }

    /// 解析为绊线配置; `None` 表示清除
    pub fn config(&self) -> Result<Option<TripwireConfig>, ControlError> {
        Ok(parse_tripwire(&self.tripwire)?.map(|line| TripwireConfig {
            line,
            flip_direction: self.flip_direction.unwrap_or(false),
        }))
    }
}

fn camera_id(raw: Option<&str>) -> Result<CameraId, ControlError> {
    match raw.map(CameraId::new) {
        Some(id) if !id.as_str().is_empty() => Ok(id),
        _ => Err(ControlError::MissingCamera),
    }
}

/// 绊线负载: `null` → 清除; 对象 → 四个坐标 (数字或数字字符串)
pub fn parse_tripwire(value: &Value) -> Result<Option<Tripwire>, ControlError> {
    let object = match value {
        Value::Null => return Ok(None),
        Value::Object(object) => object,
        _ => return Err(ControlError::InvalidTripwire),
    };

    let coord = |field: &'static str| -> Result<f32, ControlError> {
        let raw = object
            .get(field)
            .ok_or(ControlError::MissingCoordinate(field))?;
        let number = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| ControlError::NotNumeric {
            field,
            value: raw.to_string(),
        })?;
        let number = number as f32;
        if !number.is_finite() {
            return Err(ControlError::NonFinite(field));
        }
        Ok(number)
    };

    Ok(Some(Tripwire::new(
        coord("x1")?,
        coord("y1")?,
        coord("x2")?,
        coord("y2")?,
    )))
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    VideoFrame {
        camera_ip: String,
        image: String,
        timestamp: String,
    },
    TripwireUpdate {
        camera_ip: String,
        tripwire: Option<Tripwire>,
        flip_direction: bool,
    },
    UpdateCounts {
        camera_ip: String,
        #[serde(rename = "in")]
        in_count: u64,
        #[serde(rename = "out")]
        out_count: u64,
        current: i64,
    },
}

impl OutboundEvent {
    pub fn tripwire_update(camera_id: &CameraId, config: Option<TripwireConfig>) -> Self {
        Self::TripwireUpdate {
            camera_ip: camera_id.to_string(),
            tripwire: config.map(|c| c.line),
            flip_direction: config.map(|c| c.flip_direction).unwrap_or(false),
        }
    }

    pub fn update_counts(camera_id: &CameraId, counts: Counts) -> Self {
        Self::UpdateCounts {
            camera_ip: camera_id.to_string(),
            in_count: counts.in_count,
            out_count: counts.out_count,
            current: counts.current(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::VideoFrame { .. } => "video_frame",
            Self::TripwireUpdate { .. } => "tripwire_update",
            Self::UpdateCounts { .. } => "update_counts",
        }
    }
}
