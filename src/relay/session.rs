use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ClientEvent, ConnectionId, MessageFailed, Relay, SendMessage, ServerEvent};
use crate::client::{ClientError, RelayLink};
use crate::error::AppError;
use crate::models::ChatMessage;
use crate::store::Store;

/// 单个连接上的事件分发；事件按到达顺序逐个处理
pub struct RelaySession {
    store: Arc<dyn Store>,
    relay: Arc<Relay>,
    conn: ConnectionId,
}

impl RelaySession {
    pub fn new(store: Arc<dyn Store>, relay: Arc<Relay>, conn: ConnectionId) -> Self {
        Self { store, relay, conn }
    }

    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    pub async fn handle(&self, event: ClientEvent) {
        match event {
            ClientEvent::JoinGroup(group_id) => {
                // 不校验成员身份，只做订阅
                if self.relay.subscribe(self.conn, group_id).await {
                    tracing::info!(conn = self.conn, group_id, "joined room");
                }
            }
            ClientEvent::LeaveGroup(group_id) => {
                self.relay.unsubscribe(self.conn, group_id).await;
                tracing::info!(conn = self.conn, group_id, "left room");
            }
            ClientEvent::SendMessage(message) => self.send(message).await,
        }
    }

    async fn send(&self, message: SendMessage) {
        match ChatMessage::send(self.store.as_ref(), &message).await {
            Ok(stored) => {
                let group_id = stored.group_id;
                self.relay
                    .publish(group_id, ServerEvent::ReceiveMessage(stored))
                    .await;
            }
            Err(e) => {
                if is_rejection(&e) {
                    tracing::warn!(
                        conn = self.conn,
                        group_id = message.group_id,
                        user_id = message.user_id,
                        "message rejected: {e}"
                    );
                } else {
                    tracing::error!(
                        conn = self.conn,
                        group_id = message.group_id,
                        user_id = message.user_id,
                        "failed to persist message: {e}"
                    );
                }
                let failed = MessageFailed {
                    group_id: message.group_id,
                    content: message.content,
                    message: e.to_string(),
                };
                self.relay
                    .send_to(self.conn, ServerEvent::MessageFailed(failed))
                    .await;
            }
        }
    }

    /// 断开连接：退出所有房间
    pub async fn close(&self) {
        self.relay.unsubscribe_all(self.conn).await;
    }
}

/// 客户端可修正的错误，区别于存储故障
fn is_rejection(e: &AppError) -> bool {
    matches!(
        e,
        AppError::Validation(_) | AppError::Forbidden(_) | AppError::NotFound(_)
    )
}

/// 进程内的中继连接，与 websocket 连接走同一套分发逻辑
pub struct LocalLink {
    session: RelaySession,
    events: mpsc::Receiver<ServerEvent>,
}

impl LocalLink {
    pub async fn connect(store: Arc<dyn Store>, relay: Arc<Relay>) -> Self {
        let (conn, events) = relay.connect().await;
        Self {
            session: RelaySession::new(store, relay, conn),
            events,
        }
    }

    pub fn conn(&self) -> ConnectionId {
        self.session.conn()
    }

    pub async fn close(self) {
        self.session.close().await;
    }
}

#[async_trait]
impl RelayLink for LocalLink {
    async fn emit(&mut self, event: ClientEvent) -> Result<(), ClientError> {
        self.session.handle(event).await;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }
}
