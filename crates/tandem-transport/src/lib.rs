//! # tandem-transport
//!
//! The boundary between Tandem's pairing engine and the sockets it serves.
//!
//! - **Connection** - a non-blocking, cloneable handle used to push payloads
//!   to one client
//! - **TransportEvent** - what the transport reports about a client:
//!   it connected, sent something, closed, or failed
//! - **WebSocket** - an axum adapter that turns one upgraded socket into a
//!   stream of events and drains the handle's outbound queue
//!
//! ```rust,ignore
//! use tandem_transport::websocket::{pump, WebSocketConfig};
//!
//! pump(socket, None, WebSocketConfig::default(), |event| engine.handle(event)).await;
//! ```

pub mod outbound;
pub mod traits;
pub mod websocket;

pub use outbound::{outbound_channel, Outbound, OutboundConnection, OutboundReceiver};
pub use traits::{Connection, ConnectionId, TransportError, TransportEvent};
pub use websocket::WebSocketConfig;
