use async_trait::async_trait;

use super::ClientError;
use crate::models::ChatMessage;
use crate::relay::{ClientEvent, MessageFailed, SendMessage, ServerEvent};

/// 客户端持有的中继连接
#[async_trait]
pub trait RelayLink: Send {
    async fn emit(&mut self, event: ClientEvent) -> Result<(), ClientError>;

    /// 连接关闭时返回 `None`
    async fn next_event(&mut self) -> Option<ServerEvent>;
}

/// 历史消息来源，一般为 `ApiClient`
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn messages(&self, group_id: i64) -> Result<Vec<ChatMessage>, ClientError>;
}

/// 单个群组的聊天视图：进入时拉取完整历史，之后追加中继推送的消息
pub struct ChatSession<L, H> {
    link: L,
    history: H,
    user_id: i64,
    group_id: Option<i64>,
    messages: Vec<ChatMessage>,
    failed: Vec<MessageFailed>,
}

impl<L: RelayLink, H: HistorySource> ChatSession<L, H> {
    pub fn new(link: L, history: H, user_id: i64) -> Self {
        Self {
            link,
            history,
            user_id,
            group_id: None,
            messages: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn group_id(&self) -> Option<i64> {
        self.group_id
    }

    /// 按 `sent_at` 升序
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn failed(&self) -> &[MessageFailed] {
        &self.failed
    }

    pub fn take_failed(&mut self) -> Vec<MessageFailed> {
        std::mem::take(&mut self.failed)
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// 订阅房间后再拉历史，期间到达的实时消息按 id 去重；
    /// 重连后再次调用即可补齐断线期间的消息
    pub async fn enter(&mut self, group_id: i64) -> Result<&[ChatMessage], ClientError> {
        if let Some(current) = self.group_id.filter(|g| *g != group_id) {
            self.link.emit(ClientEvent::LeaveGroup(current)).await?;
            self.messages.clear();
            self.failed.clear();
        }

        self.link.emit(ClientEvent::JoinGroup(group_id)).await?;
        self.group_id = Some(group_id);

        let history = self.history.messages(group_id).await?;
        for message in history {
            self.insert(message);
        }
        Ok(&self.messages)
    }

    /// 本地不回显，等待服务端广播的权威副本
    pub async fn send(&mut self, content: &str) -> Result<(), ClientError> {
        let group_id = self.group_id.ok_or(ClientError::NotInGroup)?;
        self.link
            .emit(ClientEvent::SendMessage(SendMessage {
                group_id,
                user_id: self.user_id,
                content: content.to_string(),
            }))
            .await
    }

    /// 等待下一个中继事件并应用到本地视图
    pub async fn next(&mut self) -> Option<ServerEvent> {
        let event = self.link.next_event().await?;
        self.apply(&event);
        Some(event)
    }

    /// 返回本地视图是否发生变化；其他群组的事件被忽略
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::ReceiveMessage(message) if Some(message.group_id) == self.group_id => {
                self.insert(message.clone())
            }
            ServerEvent::MessageFailed(failed) if Some(failed.group_id) == self.group_id => {
                self.failed.push(failed.clone());
                true
            }
            _ => false,
        }
    }

    fn insert(&mut self, message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let key = (message.sent_at, message.id);
        let at = self
            .messages
            .partition_point(|m| (m.sent_at, m.id) <= key);
        self.messages.insert(at, message);
        true
    }
}
