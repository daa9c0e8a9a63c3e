use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use super::{ClientError, RelayLink};
use crate::relay::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 连接服务端 `/socket` 的中继连接；交给 `ChatSession` 持有，
/// 会话结束时用 `into_link` 取回并 `close`
pub struct SocketLink {
    socket: WsStream,
}

impl SocketLink {
    /// `url` 形如 `ws://localhost:5000/socket`
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(url, "relay socket connected");
        Ok(Self { socket })
    }

    /// 由 REST 地址推出中继地址：`http://h/api` -> `ws://h/socket`
    pub fn socket_url(base_url: &str) -> Result<String, ClientError> {
        let mut url = reqwest::Url::parse(base_url)
            .map_err(|e| ClientError::Network(format!("invalid url {base_url}: {e}")))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Network(format!("unsupported url {base_url}")))?;
        url.set_path("/socket");
        url.set_query(None);
        Ok(url.to_string())
    }

    /// 发送关闭帧，服务端随即让该连接退出所有房间
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }
}

#[async_trait]
impl RelayLink for SocketLink {
    async fn emit(&mut self, event: ClientEvent) -> Result<(), ClientError> {
        let text = serde_json::to_string(&event).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.socket.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ServerEvent> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                    Ok(event) => return Some(event),
                    Err(e) => tracing::warn!("unexpected relay frame: {e}"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("relay socket read error: {e}");
                    return None;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_follows_api_host() {
        assert_eq!(
            SocketLink::socket_url("http://localhost:5000/api/").unwrap(),
            "ws://localhost:5000/socket"
        );
        assert_eq!(
            SocketLink::socket_url("https://family.example.com/api").unwrap(),
            "wss://family.example.com/socket"
        );
        assert!(SocketLink::socket_url("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let err = SocketLink::connect("ws://127.0.0.1:9/socket")
            .await
            .err()
            .unwrap();
        assert!(err.is_transient());
    }
}
