//! Metrics collection and export for Tandem.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tandem_core::{ConnectOutcome, DisconnectOutcome, EngineOutcome, EngineStats, RelayOutcome};
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tandem_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "tandem_connections_active";
    pub const WAITING: &str = "tandem_waiting_connections";
    pub const PAIRS_ACTIVE: &str = "tandem_pairs_active";
    pub const PAIRS_TOTAL: &str = "tandem_pairs_total";
    pub const PARTNER_LOSSES_TOTAL: &str = "tandem_partner_losses_total";
    pub const MESSAGES_RELAYED: &str = "tandem_messages_relayed_total";
    pub const MESSAGES_BYTES: &str = "tandem_messages_bytes";
    pub const MESSAGES_DROPPED: &str = "tandem_messages_dropped_total";
    pub const REFUSED_TOTAL: &str = "tandem_connections_refused_total";
    pub const ERRORS_TOTAL: &str = "tandem_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_gauge!(names::WAITING, "Connections waiting for a partner");
    metrics::describe_gauge!(names::PAIRS_ACTIVE, "Current number of active pairs");
    metrics::describe_counter!(names::PAIRS_TOTAL, "Total number of pairings made");
    metrics::describe_counter!(
        names::PARTNER_LOSSES_TOTAL,
        "Total number of pairs dissolved by a disconnect"
    );
    metrics::describe_counter!(names::MESSAGES_RELAYED, "Total number of relayed messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of relayed messages");
    metrics::describe_counter!(
        names::MESSAGES_DROPPED,
        "Messages dropped because there was no live partner"
    );
    metrics::describe_counter!(
        names::REFUSED_TOTAL,
        "Connections refused by the connection limit"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record the result of an engine event.
///
/// `bytes` is the payload size for relay outcomes and ignored otherwise.
pub fn record_outcome(outcome: &EngineOutcome, bytes: usize) {
    match outcome {
        EngineOutcome::Connect(ConnectOutcome::Paired { .. }) => {
            counter!(names::PAIRS_TOTAL).increment(1);
        }
        EngineOutcome::Connect(_) => {}
        EngineOutcome::Relay(RelayOutcome::Delivered) => {
            counter!(names::MESSAGES_RELAYED).increment(1);
            counter!(names::MESSAGES_BYTES).increment(bytes as u64);
        }
        EngineOutcome::Relay(RelayOutcome::NoPartner) => {
            counter!(names::MESSAGES_DROPPED, "reason" => "no_partner").increment(1);
        }
        EngineOutcome::Relay(RelayOutcome::PartnerGone) => {
            counter!(names::MESSAGES_DROPPED, "reason" => "partner_gone").increment(1);
        }
        EngineOutcome::Disconnect(DisconnectOutcome::Orphaned { repaired_with, .. }) => {
            counter!(names::PARTNER_LOSSES_TOTAL).increment(1);
            if repaired_with.is_some() {
                counter!(names::PAIRS_TOTAL).increment(1);
            }
        }
        EngineOutcome::Disconnect(_) => {}
    }
}

/// Publish engine occupancy.
pub fn set_engine_stats(stats: EngineStats) {
    gauge!(names::WAITING).set(stats.waiting as f64);
    gauge!(names::PAIRS_ACTIVE).set(stats.pairs as f64);
}

/// Record a connection refused at upgrade time.
pub fn record_refused() {
    counter!(names::REFUSED_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
