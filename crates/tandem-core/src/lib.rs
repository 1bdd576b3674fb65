//! # tandem-core
//!
//! Matchmaking and relay for the Tandem pairing server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **WaitingQueue** - FIFO pool of connections waiting for a partner
//! - **PairingTable** - Symmetric map from each paired connection to its partner
//! - **Relay** - Forwards a payload to a partner, absorbing send failures
//! - **PairingEngine** - Applies connect/message/disconnect events to the
//!   queue and table as single atomic steps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  Transport  │────▶│ PairingEngine │────▶│ WaitingQueue │
//! └─────────────┘     └───────────────┘     └──────────────┘
//!                        │         │
//!                        ▼         ▼
//!                 ┌──────────┐  ┌──────────────┐
//!                 │  Relay   │  │ PairingTable │
//!                 └──────────┘  └──────────────┘
//! ```
//!
//! Each connection moves through `Waiting → Paired → (Waiting | Removed)`.
//! A paired connection only returns to waiting when its partner leaves.

pub mod engine;
pub mod pool;
pub mod relay;
pub mod table;

pub use engine::{
    ConnectOutcome, DisconnectOutcome, EngineConfig, EngineOutcome, EngineStats, PairingEngine,
    RelayOutcome, RequeuePolicy,
};
pub use pool::WaitingQueue;
pub use table::{PairingTable, TableError};
