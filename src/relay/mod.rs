// 实时中继：以群组 ID 为房间名的发布/订阅
// 投递至多一次；同一房间内，同一发布连接的事件按发送顺序到达

pub mod events;
pub mod session;
pub mod socket;

pub use events::{ClientEvent, MessageFailed, SendMessage, ServerEvent};
pub use session::{LocalLink, RelaySession};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tokio::sync::mpsc::error::TrySendError;

pub type ConnectionId = u64;

struct Connection {
    tx: mpsc::Sender<ServerEvent>,
    rooms: HashSet<i64>,
}

#[derive(Default)]
struct Rooms {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<i64, HashSet<ConnectionId>>,
}

pub struct Relay {
    next_id: AtomicU64,
    buffer: usize,
    inner: RwLock<Rooms>,
}

impl Relay {
    /// `buffer` 为每个连接的待发送队列长度，队列满时丢弃事件
    pub fn new(buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            inner: RwLock::new(Rooms::default()),
        }
    }

    /// 注册新连接，返回其 ID 与事件接收端
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        self.inner.write().await.connections.insert(
            id,
            Connection {
                tx,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(conn = id, "relay connection registered");
        (id, rx)
    }

    /// 连接未注册（已断开）时返回 `false`
    pub async fn subscribe(&self, conn: ConnectionId, group_id: i64) -> bool {
        let mut inner = self.inner.write().await;
        let Some(connection) = inner.connections.get_mut(&conn) else {
            return false;
        };
        connection.rooms.insert(group_id);
        inner.rooms.entry(group_id).or_default().insert(conn);
        true
    }

    pub async fn unsubscribe(&self, conn: ConnectionId, group_id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(connection) = inner.connections.get_mut(&conn) {
            connection.rooms.remove(&group_id);
        }
        remove_from_room(&mut inner.rooms, group_id, conn);
    }

    /// 断开时调用：退出所有房间并注销连接
    pub async fn unsubscribe_all(&self, conn: ConnectionId) {
        let mut inner = self.inner.write().await;
        let Some(connection) = inner.connections.remove(&conn) else {
            return;
        };
        for group_id in connection.rooms {
            remove_from_room(&mut inner.rooms, group_id, conn);
        }
        tracing::debug!(conn, "relay connection removed");
    }

    /// 投递给房间内所有连接（包括发布者自身），返回成功入队的连接数
    pub async fn publish(&self, group_id: i64, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(&group_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn in members {
            let Some(connection) = inner.connections.get(conn) else {
                continue;
            };
            if deliver(*conn, &connection.tx, event.clone()) {
                delivered += 1;
            }
        }
        tracing::debug!(group_id, delivered, "relay publish");
        delivered
    }

    /// 只发给单个连接
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        match inner.connections.get(&conn) {
            Some(connection) => deliver(conn, &connection.tx, event),
            None => false,
        }
    }

    pub async fn room_size(&self, group_id: i64) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(&group_id)
            .map_or(0, HashSet::len)
    }
}

fn remove_from_room(
    rooms: &mut HashMap<i64, HashSet<ConnectionId>>,
    group_id: i64,
    conn: ConnectionId,
) {
    if let Some(members) = rooms.get_mut(&group_id) {
        members.remove(&conn);
        if members.is_empty() {
            rooms.remove(&group_id);
        }
    }
}

fn deliver(conn: ConnectionId, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(conn, "relay queue full, dropping event");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use chrono::{TimeZone, Utc};

    fn message(id: i64, group_id: i64, content: &str) -> ServerEvent {
        ServerEvent::ReceiveMessage(ChatMessage {
            id,
            group_id,
            user_id: 1,
            content: content.into(),
            sent_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            fullname: "A".into(),
        })
    }

    #[tokio::test]
    async fn publish_reaches_room_members_only() {
        let relay = Relay::new(16);
        let (a, mut rx_a) = relay.connect().await;
        let (b, mut rx_b) = relay.connect().await;
        let (c, mut rx_c) = relay.connect().await;
        relay.subscribe(a, 1).await;
        relay.subscribe(b, 1).await;
        relay.subscribe(c, 2).await;

        assert_eq!(relay.publish(1, message(1, 1, "hi")).await, 2);
        assert_eq!(rx_a.recv().await, Some(message(1, 1, "hi")));
        assert_eq!(rx_b.recv().await, Some(message(1, 1, "hi")));
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn connection_may_join_several_rooms() {
        let relay = Relay::new(16);
        let (a, mut rx) = relay.connect().await;
        relay.subscribe(a, 1).await;
        relay.subscribe(a, 2).await;

        relay.publish(1, message(1, 1, "one")).await;
        relay.publish(2, message(2, 2, "two")).await;
        assert_eq!(rx.recv().await, Some(message(1, 1, "one")));
        assert_eq!(rx.recv().await, Some(message(2, 2, "two")));
    }

    #[tokio::test]
    async fn events_keep_publish_order_within_room() {
        let relay = Relay::new(64);
        let (a, mut rx) = relay.connect().await;
        relay.subscribe(a, 1).await;

        for i in 0..20 {
            relay.publish(1, message(i, 1, &i.to_string())).await;
        }
        for i in 0..20 {
            assert_eq!(rx.recv().await, Some(message(i, 1, &i.to_string())));
        }
    }

    #[tokio::test]
    async fn disconnect_leaves_every_room() {
        let relay = Relay::new(16);
        let (a, _rx) = relay.connect().await;
        relay.subscribe(a, 1).await;
        relay.subscribe(a, 2).await;
        assert_eq!(relay.room_size(1).await, 1);

        relay.unsubscribe_all(a).await;
        assert_eq!(relay.room_size(1).await, 0);
        assert_eq!(relay.room_size(2).await, 0);
        assert_eq!(relay.publish(1, message(1, 1, "lost")).await, 0);
        assert!(!relay.subscribe(a, 1).await);
    }

    #[tokio::test]
    async fn unsubscribe_single_room() {
        let relay = Relay::new(16);
        let (a, mut rx) = relay.connect().await;
        relay.subscribe(a, 1).await;
        relay.subscribe(a, 2).await;
        relay.unsubscribe(a, 1).await;

        assert_eq!(relay.publish(1, message(1, 1, "gone")).await, 0);
        assert_eq!(relay.publish(2, message(2, 2, "kept")).await, 1);
        assert_eq!(rx.recv().await, Some(message(2, 2, "kept")));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let relay = Relay::new(1);
        let (a, mut rx) = relay.connect().await;
        relay.subscribe(a, 1).await;

        assert_eq!(relay.publish(1, message(1, 1, "first")).await, 1);
        assert_eq!(relay.publish(1, message(2, 1, "second")).await, 0);
        assert_eq!(rx.recv().await, Some(message(1, 1, "first")));
        assert!(rx.try_recv().is_err());
    }
}
