use serde::Deserialize;

use crate::error::AppError;
use crate::models::ChatMessage;
use crate::relay::SendMessage;
use crate::store::Store;

pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    #[serde(rename = "groupId")]
    pub group_id: Option<i64>,
}

impl ChatMessage {
    /// 落库并返回带服务端 id 与 `sent_at` 的权威副本
    pub async fn send(store: &dyn Store, req: &SendMessage) -> Result<Self, AppError> {
        let content = req.content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("Message content is required".into()));
        }
        if content.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::Validation(format!(
                "Message must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }

        store
            .insert_message(req.group_id, req.user_id, content)
            .await?
            .ok_or_else(|| AppError::Forbidden("You are not a member of this group".into()))
    }

    /// 完整历史，按 `sent_at` 升序
    pub async fn history(store: &dyn Store, group_id: i64) -> Result<Vec<Self>, AppError> {
        store
            .list_messages(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".into()))
    }
}
