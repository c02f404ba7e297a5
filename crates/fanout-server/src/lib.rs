//! # fanout-server
//!
//! Relays one upstream `WebSocket` feed to every connected peer.
//!
//! - Source feed: dials the upstream and forwards its text frames
//! - Connection intake: axum router that upgrades peers and serves `/health`
//! - Fanout manager: sole owner of the peer set, evicts peers that fall behind
//! - Peer writers: one task per peer, strictly ordered writes
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod intake;
pub mod manager;
pub mod peer;
pub mod server;
pub mod shutdown;
pub mod source;

#[cfg(test)]
mod test_sinks;

pub use error::ServerError;
pub use manager::{BroadcastReport, FanoutManager, FanoutStats, RunExit};
pub use peer::{PeerExit, PeerHandle, PeerSink};
pub use server::FanoutServer;
pub use shutdown::ShutdownCoordinator;
pub use source::{SourceError, SourceFeed};
