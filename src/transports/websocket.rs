//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! The Gridlock server speaks one JSON envelope per WebSocket text frame, so
//! the mapping here is direct: [`Transport::send`] writes a text frame,
//! [`Transport::recv`] yields the next text frame and folds the connection
//! teardown (close frames, stream end) into `None`. Control frames never
//! surface to the client loop.
//!
//! Both `ws://` and `wss://` URLs work; TLS is negotiated by
//! `tokio-tungstenite` when the scheme asks for it.
//!
//! # Example
//!
//! ```rust,ignore
//! use gridlock_client::{GridlockClient, GridlockConfig, WebSocketTransport};
//!
//! let transport = WebSocketTransport::connect("ws://localhost:7350/ws").await?;
//! let (client, mut events) = GridlockClient::start(transport, GridlockConfig::new("alice"));
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::GridlockError;
use crate::transport::Transport;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over a WebSocket connection to a Gridlock server.
///
/// `recv` is cancel-safe: dropping its future between frames loses nothing,
/// so the client loop can poll it inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to the given `ws://` or `wss://` URL.
    ///
    /// The returned transport is ready to hand to `GridlockClient::start`,
    /// which sends the `Authenticate` envelope as its first frame.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::Io`] when the URL is invalid or the server
    /// is unreachable. The [`ErrorKind`](std::io::ErrorKind) of an underlying
    /// I/O failure is preserved.
    pub async fn connect(url: &str) -> Result<Self, GridlockError> {
        tracing::debug!(url = %url, "connecting to game server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            GridlockError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "connected");
        Ok(Self {
            stream,
            closed: false,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), GridlockError> {
        if self.closed {
            return Err(GridlockError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| GridlockError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, GridlockError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(GridlockError::TransportReceive(e.to_string()))),
            };
            match frame {
                // `Utf8Bytes` does not give up its buffer, hence the copy.
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(_) => {
                    tracing::debug!("server closed the connection");
                    return None;
                }
                // Ping/pong are answered by tungstenite itself. Binary frames
                // have no meaning in this protocol.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("dropping unexpected binary frame");
                }
                // Never produced by the read half.
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), GridlockError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| GridlockError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, ServerMessage};
    use tokio::net::TcpListener;

    /// Bind a local WebSocket server, run `script` on the first accepted
    /// connection, and return the URL to dial.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    fn envelope(msg: &ServerMessage) -> Message {
        Message::Text(serde_json::to_string(msg).unwrap().into())
    }

    #[tokio::test]
    async fn delivers_envelopes_in_order_then_ends_on_close() {
        let url = serve_once(|mut ws| async move {
            ws.send(envelope(&ServerMessage::Pong)).await.unwrap();
            ws.send(envelope(&ServerMessage::MatchLeft)).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(&first).unwrap(),
            ServerMessage::Pong
        ));
        let second = transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(&second).unwrap(),
            ServerMessage::MatchLeft
        ));

        // Close frame terminates the stream.
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_frames_reach_the_server() {
        // The script echoes back whatever envelope the client sends.
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(frame)) = ws.next().await {
                ws.send(frame).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let ping = serde_json::to_string(&ClientMessage::Ping).unwrap();
        transport.send(ping.clone()).await.unwrap();

        let echoed = transport.recv().await.unwrap().unwrap();
        assert_eq!(echoed, ping);
    }

    #[tokio::test]
    async fn non_text_frames_never_surface() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Ping(vec![].into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(envelope(&ServerMessage::Pong)).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        // The first thing recv yields is the text envelope.
        let first = transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(&first).unwrap(),
            ServerMessage::Pong
        ));
    }

    #[tokio::test]
    async fn close_rejects_further_sends_and_is_idempotent() {
        let url = serve_once(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, GridlockError::TransportClosed));
    }

    #[tokio::test]
    async fn recv_does_not_hang_after_close() {
        let url = serve_once(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        match transport.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(text)) => panic!("unexpected frame after close: {text}"),
        }
    }

    #[tokio::test]
    async fn connect_rejects_invalid_url_and_unreachable_host() {
        for url in ["not-a-valid-url", "ws://127.0.0.1:1"] {
            let err = WebSocketTransport::connect(url).await.unwrap_err();
            assert!(matches!(err, GridlockError::Io(_)), "{url}");
        }
    }
}
