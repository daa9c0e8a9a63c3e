use serde::Serialize;

pub mod group;
pub mod location;
pub mod message;
pub mod notification;
pub mod user;

/// 只带提示信息的响应体
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}
