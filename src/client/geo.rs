use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// 米
    pub accuracy: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// 允许使用的缓存定位的最大年龄，零表示必须重新定位
    pub maximum_age: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("User denied Geolocation")]
    PermissionDenied,
    #[error("Position unavailable")]
    Unavailable,
    #[error("Timeout expired")]
    Timeout,
    #[error("Geolocation not supported")]
    Unsupported,
}

impl GeoError {
    /// 只有超时类错误会触发重试
    pub fn is_timeout(&self) -> bool {
        matches!(self, GeoError::Timeout)
    }
}

/// 设备定位接口
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self, options: PositionOptions) -> Result<Position, GeoError>;
}
