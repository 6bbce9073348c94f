//! Socket connection over tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use protocol::{SocketConnection, SocketEvent, SocketFrame, TransportFault};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close` waits for the peer to acknowledge.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum State {
    Connecting(Url),
    Open(Box<Stream>),
    Closed,
}

/// A [`SocketConnection`] to a `ws`/`wss` endpoint.
///
/// The handshake runs on the first `next_event` and reports
/// [`SocketEvent::Open`] (or an error) when it completes.
pub struct WebSocketConnection {
    state: State,
}

impl WebSocketConnection {
    /// A connection that will dial `url`.
    pub fn connect(url: Url) -> Self {
        Self {
            state: State::Connecting(url),
        }
    }
}

#[async_trait]
impl SocketConnection for WebSocketConnection {
    async fn send(&mut self, frame: SocketFrame) -> Result<(), TransportFault> {
        let State::Open(stream) = &mut self.state else {
            return Err(TransportFault::Failed("socket is not open".into()));
        };
        let message = match frame {
            SocketFrame::Text(text) => Message::Text(text),
            SocketFrame::Binary(bytes) => Message::Binary(bytes),
        };
        stream
            .send(message)
            .await
            .map_err(|e| TransportFault::Failed(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<SocketEvent> {
        loop {
            match &mut self.state {
                State::Connecting(url) => {
                    let url = url.clone();
                    return match connect_async(url.as_str()).await {
                        Ok((stream, _response)) => {
                            tracing::debug!(%url, "socket open");
                            self.state = State::Open(Box::new(stream));
                            Some(SocketEvent::Open)
                        }
                        Err(error) => {
                            self.state = State::Closed;
                            Some(SocketEvent::Error(error.to_string()))
                        }
                    };
                }
                State::Open(stream) => match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Some(SocketEvent::Message(SocketFrame::Text(text)))
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        return Some(SocketEvent::Message(SocketFrame::Binary(bytes)))
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.state = State::Closed;
                        return Some(SocketEvent::Closed);
                    }
                    // Ping, pong and raw frames are handled by tungstenite.
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        self.state = State::Closed;
                        return Some(SocketEvent::Error(error.to_string()));
                    }
                },
                State::Closed => return None,
            }
        }
    }

    async fn close(&mut self) {
        let State::Open(mut stream) = std::mem::replace(&mut self.state, State::Closed) else {
            return;
        };
        if let Err(error) = (*stream).close(None).await {
            tracing::debug!(%error, "socket close failed");
            return;
        }
        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while let Some(Ok(_)) = stream.next().await {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!("peer did not acknowledge close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_open_is_a_fault() {
        let mut conn = WebSocketConnection::connect(Url::parse("ws://127.0.0.1:1/").unwrap());
        let result = conn.send(SocketFrame::Text("early".into())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn refused_handshake_reports_error_then_nothing() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/")).unwrap();
        let mut conn = WebSocketConnection::connect(url);
        assert!(matches!(conn.next_event().await, Some(SocketEvent::Error(_))));
        assert_eq!(conn.next_event().await, None);
        conn.close().await;
    }
}
