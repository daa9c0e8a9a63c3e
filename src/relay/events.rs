use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// 客户端 -> 服务端，`{"event": "...", "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinGroup(i64),
    LeaveGroup(i64),
    SendMessage(SendMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub group_id: i64,
    pub user_id: i64,
    pub content: String,
}

/// 服务端 -> 房间 / 单个连接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(ChatMessage),
    /// 只发给发送方连接，消息未持久化也未广播
    MessageFailed(MessageFailed),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFailed {
    pub group_id: i64,
    pub content: String,
    pub message: String,
}
