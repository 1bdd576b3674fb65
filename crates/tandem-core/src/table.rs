//! The pairing table.
//!
//! A symmetric map from each paired connection to its partner. Both
//! directions are always written and removed together.

use std::collections::HashMap;
use tandem_transport::ConnectionId;
use thiserror::Error;

/// Pairing table errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// A connection cannot be paired with itself.
    #[error("Cannot pair connection with itself: {0}")]
    SelfPairing(ConnectionId),

    /// The connection already has a partner.
    #[error("Connection already paired: {0}")]
    AlreadyPaired(ConnectionId),
}

/// Symmetric connection-to-partner map.
#[derive(Debug, Default)]
pub struct PairingTable {
    partners: HashMap<ConnectionId, ConnectionId>,
}

impl PairingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair two connections.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the table untouched, if `a == b` or either
    /// side already has a partner.
    pub fn insert_pair(&mut self, a: ConnectionId, b: ConnectionId) -> Result<(), TableError> {
        if a == b {
            return Err(TableError::SelfPairing(a));
        }
        if self.partners.contains_key(&a) {
            return Err(TableError::AlreadyPaired(a));
        }
        if self.partners.contains_key(&b) {
            return Err(TableError::AlreadyPaired(b));
        }

        self.partners.insert(a.clone(), b.clone());
        self.partners.insert(b, a);
        Ok(())
    }

    /// Look up a connection's partner.
    #[must_use]
    pub fn partner(&self, id: &ConnectionId) -> Option<&ConnectionId> {
        self.partners.get(id)
    }

    /// Check if a connection is paired.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.partners.contains_key(id)
    }

    /// Dissolve the pair containing `id`.
    ///
    /// Returns the former partner, if `id` was paired.
    pub fn remove_pair(&mut self, id: &ConnectionId) -> Option<ConnectionId> {
        let partner = self.partners.remove(id)?;
        self.partners.remove(&partner);
        Some(partner)
    }

    /// Number of active pairs.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        self.partners.len() / 2
    }

    /// Check if no connection is paired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Iterate over paired connections.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionId> + '_ {
        self.partners.keys()
    }

    /// Verify that every entry is mirrored by its partner's entry.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.partners
            .iter()
            .all(|(a, b)| a != b && self.partners.get(b) == Some(a))
    }
}
