use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use std::time::Duration;

use super::{ClientEvent, RelaySession};
use crate::AppState;

const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// `GET /socket`，升级为长连接中继
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (conn, mut events) = state.relay.connect().await;
    let session = RelaySession::new(state.store.clone(), state.relay.clone(), conn);
    let (mut sink, mut stream) = socket.split();

    // 写端：把房间事件转成 JSON 文本帧
    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(conn, "failed to encode relay event: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // 读端：逐帧处理，保证同一连接的消息按发送顺序入房间
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => session.handle(event).await,
                Err(e) => tracing::warn!(conn, "malformed relay frame: {e}"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn, "socket read error: {e}");
                break;
            }
        }
    }

    // 注销连接会关闭发送端，写端发完剩余事件后自行退出
    session.close().await;
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(conn, "socket disconnected");
}
