//! The pairing engine.
//!
//! Owns the waiting queue and the pairing table and applies connect,
//! message and disconnect events to them. Queue and table sit behind one
//! mutex so each event is a single atomic step; the handle registry is a
//! concurrent map so relays can resolve a partner's handle and send after
//! the lock is released.

use crate::pool::WaitingQueue;
use crate::relay;
use crate::table::PairingTable;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tandem_protocol::{Payload, Status, StatusMessage};
use tandem_transport::{Connection, ConnectionId, TransportEvent};
use tracing::{debug, error, info, trace, warn};

/// What happens to a connection whose partner disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeuePolicy {
    /// Append the survivor to the tail of the waiting queue.
    #[default]
    Tail,
    /// Pair the survivor with the head of the waiting queue if anyone is
    /// waiting, otherwise append it to the tail.
    PairImmediately,
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Survivor handling on partner loss.
    pub requeue: RequeuePolicy,
}

/// Result of registering a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Paired with a connection that was waiting.
    Paired {
        /// The new partner.
        partner: ConnectionId,
    },
    /// Nobody was waiting; the connection joined the queue.
    Waiting {
        /// Zero-based position in the queue.
        position: usize,
    },
    /// The connection was already registered; nothing changed.
    AlreadyKnown,
}

/// Result of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Queued for the partner.
    Delivered,
    /// The sender has no partner; the message was dropped.
    NoPartner,
    /// The partner no longer accepts writes; the message was dropped.
    PartnerGone,
}

/// Result of a disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The connection was paired; its partner was told and re-entered
    /// matchmaking.
    Orphaned {
        /// The partner left behind.
        survivor: ConnectionId,
        /// Who the survivor was paired with straight away, if anyone.
        repaired_with: Option<ConnectionId>,
    },
    /// The connection was unpaired and has been removed.
    LeftQueue,
    /// The connection was not registered; nothing changed.
    Unknown,
}

/// Result of applying a transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Outcome of a `Connected` event.
    Connect(ConnectOutcome),
    /// Outcome of a `Received` event.
    Relay(RelayOutcome),
    /// Outcome of a `Closed` or `Errored` event.
    Disconnect(DisconnectOutcome),
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Registered connections.
    pub connections: usize,
    /// Connections waiting for a partner.
    pub waiting: usize,
    /// Active pairs.
    pub pairs: usize,
}

#[derive(Debug, Default)]
struct MatchState {
    queue: WaitingQueue,
    table: PairingTable,
}

/// Pairs connections one-to-one and relays messages between partners.
pub struct PairingEngine {
    /// Queue and table, mutated together.
    state: Mutex<MatchState>,
    /// Handles of registered connections. Written only under `state`.
    connections: DashMap<ConnectionId, Arc<dyn Connection>>,
    config: EngineConfig,
}

impl PairingEngine {
    /// Create a new engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a new engine with custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        info!("Creating pairing engine with config: {:?}", config);
        Self {
            state: Mutex::new(MatchState::default()),
            connections: DashMap::new(),
            config,
        }
    }

    /// Get the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply a transport event.
    ///
    /// `Closed` and `Errored` both resolve to [`disconnect`](Self::disconnect),
    /// so a transport that reports both for one connection still causes a
    /// single effective disconnect.
    pub fn handle(&self, event: TransportEvent) -> EngineOutcome {
        match event {
            TransportEvent::Connected(conn) => EngineOutcome::Connect(self.connect(conn)),
            TransportEvent::Received(id, payload) => {
                EngineOutcome::Relay(self.message(&id, payload))
            }
            TransportEvent::Closed(id) => EngineOutcome::Disconnect(self.disconnect(&id)),
            TransportEvent::Errored(id, info) => {
                warn!(connection = %id, error = %info, "Connection errored");
                EngineOutcome::Disconnect(self.disconnect(&id))
            }
        }
    }

    /// Register a new connection and pair it with the longest-waiting
    /// connection, or queue it if nobody is waiting.
    pub fn connect(&self, conn: Arc<dyn Connection>) -> ConnectOutcome {
        let id = conn.id().clone();
        let mut state = self.lock_state();

        if self.connections.contains_key(&id) {
            warn!(connection = %id, "Connection already registered");
            return ConnectOutcome::AlreadyKnown;
        }
        self.connections.insert(id.clone(), Arc::clone(&conn));
        debug!(connection = %id, "Connection registered");

        match self.pair_with_head(&mut state, &id, conn.as_ref()) {
            Some(partner) => ConnectOutcome::Paired { partner },
            None => {
                state.queue.push_back(id.clone());
                let position = state.queue.len() - 1;
                debug!(connection = %id, position, "Waiting for a partner");
                ConnectOutcome::Waiting { position }
            }
        }
    }

    /// Forward a message to the sender's partner.
    ///
    /// Only the partner lookup takes the lock; the send itself does not.
    pub fn message(&self, id: &ConnectionId, payload: Payload) -> RelayOutcome {
        let partner = self.lock_state().table.partner(id).cloned();

        let Some(partner) = partner else {
            trace!(connection = %id, "No partner, dropping message");
            return RelayOutcome::NoPartner;
        };

        let Some(handle) = self.handle_of(&partner) else {
            trace!(connection = %id, partner = %partner, "Partner gone, dropping message");
            return RelayOutcome::PartnerGone;
        };

        if relay::forward(handle.as_ref(), payload) {
            RelayOutcome::Delivered
        } else {
            RelayOutcome::PartnerGone
        }
    }

    /// Remove a connection. Its partner, if any, is told and re-enters
    /// matchmaking.
    ///
    /// Disconnecting an unknown or already removed connection is a no-op.
    pub fn disconnect(&self, id: &ConnectionId) -> DisconnectOutcome {
        let mut state = self.lock_state();

        if self.connections.remove(id).is_none() {
            trace!(connection = %id, "Disconnect for unknown connection");
            return DisconnectOutcome::Unknown;
        }

        let Some(survivor) = state.table.remove_pair(id) else {
            state.queue.remove(id);
            debug!(connection = %id, "Waiting connection left");
            return DisconnectOutcome::LeftQueue;
        };

        info!(connection = %id, partner = %survivor, "Pair dissolved");
        self.notify(&survivor, Status::Disconnected);

        let repaired_with = match self.config.requeue {
            RequeuePolicy::Tail => None,
            RequeuePolicy::PairImmediately => match self.handle_of(&survivor) {
                Some(handle) if handle.is_open() => {
                    self.pair_with_head(&mut state, &survivor, handle.as_ref())
                }
                _ => None,
            },
        };

        if repaired_with.is_none() {
            state.queue.push_back(survivor.clone());
            debug!(connection = %survivor, "Survivor re-queued");
        }

        DisconnectOutcome::Orphaned {
            survivor,
            repaired_with,
        }
    }

    /// Get engine statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let state = self.lock_state();
        EngineStats {
            connections: self.connections.len(),
            waiting: state.queue.len(),
            pairs: state.table.pair_count(),
        }
    }

    /// Get a connection's current partner.
    #[must_use]
    pub fn partner_of(&self, id: &ConnectionId) -> Option<ConnectionId> {
        self.lock_state().table.partner(id).cloned()
    }

    /// Check if a connection is waiting for a partner.
    #[must_use]
    pub fn is_waiting(&self, id: &ConnectionId) -> bool {
        self.lock_state().queue.contains(id)
    }

    /// Get the waiting connections, head first.
    #[must_use]
    pub fn waiting_ids(&self) -> Vec<ConnectionId> {
        self.lock_state().queue.iter().cloned().collect()
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Verify the structural invariants: the table is symmetric, no
    /// connection is both waiting and paired, and everything in the queue
    /// or table is registered.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        let state = self.lock_state();
        let symmetric = state.table.is_symmetric();
        let exclusive = state.queue.iter().all(|id| !state.table.contains(id));
        let registered = state
            .queue
            .iter()
            .chain(state.table.connections())
            .all(|id| self.connections.contains_key(id));
        symmetric && exclusive && registered
    }

    fn lock_state(&self) -> MutexGuard<'_, MatchState> {
        // Every mutation leaves the state consistent before it can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_of(&self, id: &ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Pop waiting connections until one is still open and pair `id` with
    /// it. Closed ones are discarded; their disconnect is still pending.
    fn pair_with_head(
        &self,
        state: &mut MatchState,
        id: &ConnectionId,
        conn: &dyn Connection,
    ) -> Option<ConnectionId> {
        while let Some(candidate) = state.queue.pop_front() {
            let Some(handle) = self.handle_of(&candidate) else {
                warn!(connection = %candidate, "Unregistered connection in queue");
                continue;
            };
            if !handle.is_open() {
                debug!(connection = %candidate, "Skipping closed connection in queue");
                continue;
            }

            if let Err(e) = state.table.insert_pair(id.clone(), candidate.clone()) {
                error!(connection = %id, partner = %candidate, error = %e, "Pairing failed");
                state.queue.push_back(candidate);
                return None;
            }

            info!(connection = %id, partner = %candidate, "Paired two connections");
            // Sent under the lock so both sides see Connected before any
            // relayed payload.
            send_status(handle.as_ref(), Status::Connected);
            send_status(conn, Status::Connected);
            return Some(candidate);
        }
        None
    }

    fn notify(&self, id: &ConnectionId, status: Status) {
        if let Some(handle) = self.handle_of(id) {
            send_status(handle.as_ref(), status);
        }
    }
}

impl Default for PairingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn send_status(conn: &dyn Connection, status: Status) {
    if !conn.is_open() {
        return;
    }

    match StatusMessage::new(status).to_payload() {
        Ok(payload) => {
            if let Err(e) = conn.send(payload) {
                debug!(connection = %conn.id(), error = %e, "Status send failed");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode status message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_transport::{outbound_channel, OutboundConnection, OutboundReceiver};

    fn client(name: &str) -> (Arc<OutboundConnection>, OutboundReceiver) {
        let (conn, rx) = outbound_channel(ConnectionId::new(name), None);
        (Arc::new(conn), rx)
    }

    fn id(name: &str) -> ConnectionId {
        ConnectionId::new(name)
    }

    fn status(text: Status) -> Payload {
        StatusMessage::new(text).to_payload().unwrap()
    }

    #[test]
    fn test_first_connection_waits() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");

        assert_eq!(engine.connect(a), ConnectOutcome::Waiting { position: 0 });
        assert_eq!(engine.waiting_ids(), vec![id("a")]);
        assert!(rx_a.drain_payloads().is_empty());
    }

    #[test]
    fn test_fifo_pairing() {
        let engine = PairingEngine::new();
        let clients: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| client(n)).collect();

        let outcomes: Vec<_> = clients
            .iter()
            .map(|(conn, _)| engine.connect(conn.clone()))
            .collect();

        assert_eq!(
            outcomes,
            vec![
                ConnectOutcome::Waiting { position: 0 },
                ConnectOutcome::Paired { partner: id("a") },
                ConnectOutcome::Waiting { position: 0 },
                ConnectOutcome::Paired { partner: id("c") },
            ]
        );
        assert_eq!(engine.partner_of(&id("a")), Some(id("b")));
        assert_eq!(engine.partner_of(&id("b")), Some(id("a")));
        assert_eq!(engine.partner_of(&id("c")), Some(id("d")));
        assert_eq!(engine.partner_of(&id("d")), Some(id("c")));
        assert!(engine.waiting_ids().is_empty());

        for (_, mut rx) in clients {
            assert_eq!(rx.drain_payloads(), vec![status(Status::Connected)]);
        }
        assert!(engine.check_invariants());
    }

    #[test]
    fn test_relay_both_directions() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        let (b, mut rx_b) = client("b");
        engine.connect(a);
        engine.connect(b);
        rx_a.drain_payloads();
        rx_b.drain_payloads();

        assert_eq!(
            engine.message(&id("a"), Payload::text("hello")),
            RelayOutcome::Delivered
        );
        assert_eq!(
            engine.message(&id("b"), Payload::binary(vec![7u8, 8, 9])),
            RelayOutcome::Delivered
        );
        assert_eq!(
            engine.message(&id("a"), Payload::text("again")),
            RelayOutcome::Delivered
        );

        assert_eq!(
            rx_b.drain_payloads(),
            vec![Payload::text("hello"), Payload::text("again")]
        );
        assert_eq!(rx_a.drain_payloads(), vec![Payload::binary(vec![7u8, 8, 9])]);
    }

    #[test]
    fn test_message_while_waiting_is_dropped() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        engine.connect(a);

        assert_eq!(
            engine.message(&id("a"), Payload::text("anyone?")),
            RelayOutcome::NoPartner
        );
        assert_eq!(
            engine.message(&id("ghost"), Payload::text("boo")),
            RelayOutcome::NoPartner
        );
        assert!(rx_a.drain_payloads().is_empty());
    }

    #[test]
    fn test_message_to_closed_partner_is_dropped() {
        let engine = PairingEngine::new();
        let (a, _rx_a) = client("a");
        let (b, mut rx_b) = client("b");
        engine.connect(a);
        engine.connect(b.clone());
        rx_b.drain_payloads();

        b.close();
        assert_eq!(
            engine.message(&id("a"), Payload::text("hello")),
            RelayOutcome::PartnerGone
        );
    }

    #[test]
    fn test_partner_loss_requeues_survivor() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        let (b, _rx_b) = client("b");
        engine.connect(a);
        engine.connect(b);
        rx_a.drain_payloads();

        assert_eq!(
            engine.disconnect(&id("b")),
            DisconnectOutcome::Orphaned {
                survivor: id("a"),
                repaired_with: None,
            }
        );
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Disconnected)]);
        assert_eq!(engine.waiting_ids(), vec![id("a")]);
        assert_eq!(engine.partner_of(&id("a")), None);

        let (c, mut rx_c) = client("c");
        assert_eq!(
            engine.connect(c),
            ConnectOutcome::Paired { partner: id("a") }
        );
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Connected)]);
        assert_eq!(rx_c.drain_payloads(), vec![status(Status::Connected)]);
        assert!(engine.check_invariants());
    }

    #[test]
    fn test_survivor_goes_to_tail() {
        let engine = PairingEngine::new();
        let (a, _rx_a) = client("a");
        let (b, _rx_b) = client("b");
        let (c, _rx_c) = client("c");
        engine.connect(a);
        engine.connect(b);
        engine.connect(c);

        engine.disconnect(&id("b"));
        assert_eq!(engine.waiting_ids(), vec![id("c"), id("a")]);

        let (d, _rx_d) = client("d");
        assert_eq!(
            engine.connect(d),
            ConnectOutcome::Paired { partner: id("c") }
        );
        assert_eq!(engine.waiting_ids(), vec![id("a")]);
    }

    #[test]
    fn test_pair_immediately_policy() {
        let engine = PairingEngine::with_config(EngineConfig {
            requeue: RequeuePolicy::PairImmediately,
        });
        let (a, mut rx_a) = client("a");
        let (b, _rx_b) = client("b");
        let (c, mut rx_c) = client("c");
        engine.connect(a);
        engine.connect(b);
        engine.connect(c);
        rx_a.drain_payloads();

        assert_eq!(
            engine.disconnect(&id("b")),
            DisconnectOutcome::Orphaned {
                survivor: id("a"),
                repaired_with: Some(id("c")),
            }
        );
        assert_eq!(
            rx_a.drain_payloads(),
            vec![status(Status::Disconnected), status(Status::Connected)]
        );
        assert_eq!(rx_c.drain_payloads(), vec![status(Status::Connected)]);
        assert_eq!(engine.partner_of(&id("a")), Some(id("c")));
        assert!(engine.waiting_ids().is_empty());
        assert!(engine.check_invariants());
    }

    #[test]
    fn test_pair_immediately_with_empty_queue() {
        let engine = PairingEngine::with_config(EngineConfig {
            requeue: RequeuePolicy::PairImmediately,
        });
        let (a, _rx_a) = client("a");
        let (b, _rx_b) = client("b");
        engine.connect(a);
        engine.connect(b);

        engine.disconnect(&id("a"));
        assert_eq!(engine.waiting_ids(), vec![id("b")]);
    }

    #[test]
    fn test_waiting_disconnect_leaves_queue() {
        let engine = PairingEngine::new();
        let (a, _rx_a) = client("a");
        engine.connect(a);

        assert_eq!(engine.disconnect(&id("a")), DisconnectOutcome::LeftQueue);
        assert!(engine.waiting_ids().is_empty());
        assert!(!engine.is_registered(&id("a")));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        let (b, _rx_b) = client("b");
        engine.connect(a);
        engine.connect(b);
        rx_a.drain_payloads();

        engine.disconnect(&id("b"));
        assert_eq!(engine.disconnect(&id("b")), DisconnectOutcome::Unknown);
        assert_eq!(engine.disconnect(&id("b")), DisconnectOutcome::Unknown);

        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Disconnected)]);
        assert_eq!(engine.waiting_ids(), vec![id("a")]);
        assert_eq!(engine.stats().connections, 1);
    }

    #[test]
    fn test_closed_and_errored_resolve_once() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        let (b, _rx_b) = client("b");
        engine.handle(TransportEvent::Connected(a));
        engine.handle(TransportEvent::Connected(b));
        rx_a.drain_payloads();

        let first = engine.handle(TransportEvent::Errored(id("b"), "reset".into()));
        let second = engine.handle(TransportEvent::Closed(id("b")));

        assert!(matches!(
            first,
            EngineOutcome::Disconnect(DisconnectOutcome::Orphaned { .. })
        ));
        assert_eq!(
            second,
            EngineOutcome::Disconnect(DisconnectOutcome::Unknown)
        );
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Disconnected)]);
    }

    #[test]
    fn test_duplicate_connect_is_ignored() {
        let engine = PairingEngine::new();
        let (a, _rx_a) = client("a");
        engine.connect(a.clone());

        assert_eq!(engine.connect(a), ConnectOutcome::AlreadyKnown);
        assert_eq!(engine.waiting_ids(), vec![id("a")]);
    }

    #[test]
    fn test_closed_waiting_connection_is_skipped() {
        let engine = PairingEngine::new();
        let (a, _rx_a) = client("a");
        let (c, mut rx_c) = client("c");
        engine.connect(a.clone());

        // a's socket is gone but its disconnect has not arrived yet.
        a.close();
        assert_eq!(engine.connect(c), ConnectOutcome::Waiting { position: 0 });
        assert!(rx_c.drain_payloads().is_empty());
        assert_eq!(engine.waiting_ids(), vec![id("c")]);

        assert_eq!(engine.disconnect(&id("a")), DisconnectOutcome::LeftQueue);
        assert_eq!(engine.disconnect(&id("a")), DisconnectOutcome::Unknown);
        assert!(engine.check_invariants());
    }

    #[test]
    fn test_full_scenario() {
        let engine = PairingEngine::new();
        let (a, mut rx_a) = client("a");
        let (b, mut rx_b) = client("b");
        let (c, mut rx_c) = client("c");

        engine.connect(a);
        assert_eq!(engine.waiting_ids(), vec![id("a")]);

        engine.connect(b);
        assert!(engine.waiting_ids().is_empty());
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Connected)]);
        assert_eq!(rx_b.drain_payloads(), vec![status(Status::Connected)]);

        engine.message(&id("a"), Payload::text("hello"));
        assert_eq!(rx_b.drain_payloads(), vec![Payload::text("hello")]);

        engine.disconnect(&id("b"));
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Disconnected)]);
        assert_eq!(engine.waiting_ids(), vec![id("a")]);

        engine.connect(c);
        assert_eq!(engine.partner_of(&id("c")), Some(id("a")));
        assert_eq!(rx_a.drain_payloads(), vec![status(Status::Connected)]);
        assert_eq!(rx_c.drain_payloads(), vec![status(Status::Connected)]);
    }

    #[test]
    fn test_stats() {
        let engine = PairingEngine::new();
        let handles: Vec<_> = (0..5).map(|i| client(&format!("c{}", i))).collect();
        for (conn, _) in &handles {
            engine.connect(conn.clone());
        }

        let stats = engine.stats();
        assert_eq!(stats.connections, 5);
        assert_eq!(stats.pairs, 2);
        assert_eq!(stats.waiting, 1);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["pairs"], 2);
    }

    #[test]
    fn test_concurrent_churn_keeps_invariants() {
        let engine = Arc::new(PairingEngine::new());

        // Receivers stay alive until the end so every handle remains open.
        let _receivers: Vec<Vec<OutboundReceiver>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    scope.spawn(move || {
                        let mut receivers = Vec::new();
                        for i in 0..200 {
                            let (conn, rx) = client(&format!("t{}-{}", t, i));
                            engine.connect(conn);
                            receivers.push(rx);

                            engine.message(&id(&format!("t{}-{}", t, i)), Payload::text("ping"));
                            if i % 3 == 0 {
                                engine.disconnect(&id(&format!("t{}-{}", t, i / 2)));
                            }
                        }
                        receivers
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(engine.check_invariants());
        let stats = engine.stats();
        assert_eq!(stats.connections, stats.waiting + 2 * stats.pairs);
    }
}
