//! Persistent-socket adapter.
//!
//! One descriptor is one conversation: connect, send the payload once the
//! socket reports open, treat the first inbound message as the whole
//! response, close, and only then resolve. The descriptor timeout bounds
//! everything up to the close.

use std::sync::Arc;

use async_trait::async_trait;
use protocol::{
    integrity, Environment, ErrorKind, Exchange, ExchangePhase, Payload, RequestDescriptor,
    SocketConnection, SocketEvent, SocketFrame, TransportOutcome,
};

use super::{settle, Adapter};
use crate::selector::AdapterKind;

/// Sends descriptors over the environment's socket primitive.
pub struct SocketAdapter<E: Environment> {
    env: Arc<E>,
}

impl<E: Environment> SocketAdapter<E> {
    /// Creates the adapter.
    pub fn new(env: Arc<E>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<E: Environment> Adapter for SocketAdapter<E> {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Socket
    }

    async fn send(&self, descriptor: &RequestDescriptor) -> TransportOutcome {
        let mut exchange = Exchange::new();
        let _ = exchange.begin();

        let frame = match outbound_frame(descriptor.payload()) {
            Ok(frame) => frame,
            Err(outcome) => {
                settle(&mut exchange, outcome);
                return exchange.finish();
            }
        };
        let mut conn = match self.env.socket_connection(descriptor.destination()) {
            Ok(conn) => conn,
            Err(fault) => {
                settle(&mut exchange, fault.into());
                return exchange.finish();
            }
        };

        let conversation = converse(conn.as_mut(), frame, descriptor.is_binary(), &mut exchange);
        let finished = match descriptor.deadline() {
            Some(deadline) => tokio::time::timeout(deadline, conversation)
                .await
                .unwrap_or_else(|_| {
                    Err(TransportOutcome::failure(
                        ErrorKind::TransportError,
                        format!("timed out after {} ms", deadline.as_millis()),
                    ))
                }),
            None => conversation.await,
        };
        if let Err(outcome) = finished {
            settle(&mut exchange, outcome);
        }

        conn.close().await;
        tracing::debug!(url = %descriptor.destination(), phase = ?exchange.phase(), "socket closed");
        exchange.finish()
    }
}

fn outbound_frame(payload: &Payload) -> Result<Option<SocketFrame>, TransportOutcome> {
    match payload {
        Payload::Binary(bytes) => Ok(Some(SocketFrame::Binary(bytes.clone()))),
        other => Ok(other.to_text()?.map(SocketFrame::Text)),
    }
}

fn inbound_text(frame: SocketFrame, binary: bool) -> Result<String, TransportOutcome> {
    match frame {
        SocketFrame::Text(text) => Ok(text),
        SocketFrame::Binary(bytes) if binary => Ok(integrity::encode(&bytes)),
        SocketFrame::Binary(bytes) => String::from_utf8(bytes).map_err(|e| {
            TransportOutcome::failure(
                ErrorKind::SerializationError,
                format!("binary message is not UTF-8: {e}"),
            )
        }),
    }
}

async fn converse(
    conn: &mut dyn SocketConnection,
    mut frame: Option<SocketFrame>,
    binary: bool,
    exchange: &mut Exchange,
) -> Result<(), TransportOutcome> {
    while let Some(event) = conn.next_event().await {
        match event {
            SocketEvent::Open => {
                if exchange.phase() != ExchangePhase::Opening {
                    tracing::trace!(phase = ?exchange.phase(), "duplicate open ignored");
                    continue;
                }
                let _ = exchange.opened();
                if let Some(frame) = frame.take() {
                    conn.send(frame).await?;
                }
                let _ = exchange.sent();
                tracing::debug!("socket payload sent");
            }
            SocketEvent::Message(message) => {
                if exchange.phase() != ExchangePhase::Awaiting {
                    tracing::trace!(phase = ?exchange.phase(), "message before send ignored");
                    continue;
                }
                let body = inbound_text(message, binary)?;
                settle(exchange, TransportOutcome::success(body));
                return Ok(());
            }
            SocketEvent::Error(detail) => {
                return Err(TransportOutcome::failure(ErrorKind::TransportError, detail));
            }
            SocketEvent::Closed => {
                return Err(TransportOutcome::failure(
                    ErrorKind::TransportError,
                    "socket closed before a response arrived",
                ));
            }
        }
    }
    Ok(())
}
