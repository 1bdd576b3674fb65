//! Payload forwarding between partners.

use tandem_protocol::Payload;
use tandem_transport::Connection;
use tracing::{debug, trace};

/// Forward a payload, unchanged, to `destination`.
///
/// Returns `true` if the payload was queued. A closed or unreachable
/// destination is not an error: its own disconnect event will clean up.
pub fn forward(destination: &dyn Connection, payload: Payload) -> bool {
    if !destination.is_open() {
        trace!(connection = %destination.id(), "Relay target closed, dropping payload");
        return false;
    }

    let size = payload.len();
    match destination.send(payload) {
        Ok(()) => {
            trace!(connection = %destination.id(), bytes = size, "Relayed payload");
            true
        }
        Err(e) => {
            debug!(connection = %destination.id(), error = %e, "Relay send failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_transport::{outbound_channel, ConnectionId};

    #[test]
    fn test_forward_delivers_unchanged() {
        let (conn, mut rx) = outbound_channel(ConnectionId::new("b"), None);

        assert!(forward(&conn, Payload::text("hello")));
        assert!(forward(&conn, Payload::binary(vec![0u8, 255])));

        assert_eq!(
            rx.drain_payloads(),
            vec![Payload::text("hello"), Payload::binary(vec![0u8, 255])]
        );
    }

    #[test]
    fn test_forward_to_closed_is_swallowed() {
        let (conn, mut rx) = outbound_channel(ConnectionId::new("b"), None);
        conn.close();

        assert!(!forward(&conn, Payload::text("hello")));
        assert!(rx.drain_payloads().is_empty());
    }

    #[test]
    fn test_forward_to_vanished_receiver() {
        let (conn, rx) = outbound_channel(ConnectionId::new("b"), None);
        drop(rx);

        assert!(!forward(&conn, Payload::text("hello")));
    }
}
