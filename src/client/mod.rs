// 客户端组件：HTTP 接口、实时中继连接、定时位置上报、离线缓存、群聊会话

mod api;
mod chat;
mod geo;
mod offline;
mod reporter;
mod socket;

pub use api::ApiClient;
pub use chat::{ChatSession, HistorySource, RelayLink};
pub use geo::{GeoError, Geolocator, Position, PositionOptions};
pub use offline::{FileCache, MemoryCache, OfflineCache, OfflineSample};
pub use reporter::{
    LocationReporter, LocationSink, Notice, ReporterConfig, ReporterHandle, ReporterState,
    TickOutcome, TickReport,
};
pub use socket::SocketLink;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 服务器不可达等临时错误
    #[error("network error: {0}")]
    Network(String),
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("offline cache error: {0}")]
    Cache(String),
    #[error("not in a group")]
    NotInGroup,
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}
