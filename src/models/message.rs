use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 已持久化的聊天消息，`id` 与 `sent_at` 由存储层分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub fullname: String,
}
