//! WebSocket transport built on axum.
//!
//! [`pump`] takes ownership of one upgraded socket, reports it as
//! [`TransportEvent`]s and drains the connection's outbound queue into it
//! from a dedicated writer task, so a slow client never stalls whoever is
//! sending to it.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tandem_protocol::Payload;
use tracing::{debug, trace, warn};

use crate::outbound::{outbound_channel, Outbound, OutboundReceiver};
use crate::traits::{Connection, ConnectionId, TransportError, TransportEvent};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024, // 64 KB
        }
    }
}

/// Drive one WebSocket until it closes.
///
/// Emits `Connected` first, then a `Received` per accepted message, then
/// exactly one `Closed` or `Errored`. Returns the ID assigned to the
/// connection.
pub async fn pump<F>(
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    config: WebSocketConfig,
    mut on_event: F,
) -> ConnectionId
where
    F: FnMut(TransportEvent),
{
    let id = ConnectionId::generate();
    let (conn, outbound) = outbound_channel(id.clone(), remote_addr.map(|a| a.to_string()));
    let conn = Arc::new(conn);

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_loop(id.clone(), sink, outbound));

    debug!(connection = %id, remote = ?remote_addr, "WebSocket connected");
    let handle: Arc<dyn Connection> = conn.clone();
    on_event(TransportEvent::Connected(handle));

    let terminal = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Err(e) = check_size(text.len(), &config) {
                    warn!(connection = %id, error = %e, "Dropping inbound message");
                    continue;
                }
                on_event(TransportEvent::Received(id.clone(), Payload::Text(text)));
            }
            Some(Ok(Message::Binary(data))) => {
                if let Err(e) = check_size(data.len(), &config) {
                    warn!(connection = %id, error = %e, "Dropping inbound message");
                    continue;
                }
                on_event(TransportEvent::Received(id.clone(), Payload::binary(data)));
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                // Pongs are answered by the socket itself.
            }
            Some(Ok(Message::Close(_))) => {
                debug!(connection = %id, "Received close frame");
                break TransportEvent::Closed(id.clone());
            }
            Some(Err(e)) => {
                warn!(connection = %id, error = %e, "WebSocket error");
                break TransportEvent::Errored(id.clone(), e.to_string());
            }
            None => {
                debug!(connection = %id, "WebSocket stream ended");
                break TransportEvent::Closed(id.clone());
            }
        }
    };

    // Refuse further writes before anyone learns the connection is gone.
    conn.close();
    on_event(terminal);
    drop(conn);

    if let Err(e) = writer.await {
        warn!(connection = %id, error = %e, "Writer task failed");
    }

    debug!(connection = %id, "WebSocket disconnected");
    id
}

fn check_size(size: usize, config: &WebSocketConfig) -> Result<(), TransportError> {
    if size > config.max_message_size {
        return Err(TransportError::MessageTooLarge {
            size,
            max: config.max_message_size,
        });
    }
    Ok(())
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: OutboundReceiver,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Payload(payload) => {
                let message = match payload {
                    Payload::Text(text) => Message::Text(text),
                    Payload::Binary(data) => Message::Binary(data.to_vec()),
                };
                if let Err(e) = sink.send(message).await {
                    debug!(connection = %id, error = %e, "Send failed, stopping writer");
                    return;
                }
                trace!(connection = %id, "Flushed outbound payload");
            }
            Outbound::Close => {
                let _ = sink.close().await;
                return;
            }
        }
    }
}
