//! # tandem-protocol
//!
//! Wire types for the Tandem pairing relay.
//!
//! Tandem speaks two kinds of payloads to its clients:
//!
//! - **Relayed payloads** - opaque text or binary messages, forwarded
//!   verbatim from one paired client to the other
//! - **Status messages** - server-generated JSON notifications telling a
//!   client that it has been paired or that its partner went away
//!
//! ## Example
//!
//! ```rust
//! use tandem_protocol::{Payload, StatusMessage};
//!
//! let status = StatusMessage::connected().to_payload().unwrap();
//! assert_eq!(status, Payload::text(r#"{"type":"status","text":"Connected"}"#));
//! ```

pub mod payload;
pub mod status;

pub use payload::Payload;
pub use status::{ProtocolError, Status, StatusMessage};
