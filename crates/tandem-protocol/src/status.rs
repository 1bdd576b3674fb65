//! Status messages sent by the server.
//!
//! On the wire a status message is a JSON text frame with exactly two
//! fields:
//!
//! ```json
//! {"type":"status","text":"Connected"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::Payload;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The state a status message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The client has been paired with a partner.
    Connected,
    /// The client's partner has gone away.
    Disconnected,
}

/// Discriminator for status messages. Always serialized as `"status"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Kind {
    #[serde(rename = "status")]
    Status,
}

/// A server-generated status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    kind: Kind,
    /// Reported status.
    pub text: Status,
}

impl StatusMessage {
    /// Create a status message.
    #[must_use]
    pub fn new(text: Status) -> Self {
        Self {
            kind: Kind::Status,
            text,
        }
    }

    /// Create a `Connected` status message.
    #[must_use]
    pub fn connected() -> Self {
        Self::new(Status::Connected)
    }

    /// Create a `Disconnected` status message.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::new(Status::Disconnected)
    }

    /// Encode to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a status message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode into a text payload ready to send.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> Result<Payload, ProtocolError> {
        self.encode().map(Payload::Text)
    }
}
