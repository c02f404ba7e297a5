//! # fanout-core
//!
//! Shared types for the fanout relay.
//!
//! - [`Message`]: one upstream text frame, shared by reference across peers
//! - [`PeerId`]: identity minted for every registered downstream connection
//! - [`PeerError`]: failures surfaced by a peer transport
//! - [`MAX_PRESSURE`]: per-peer queue capacity before eviction

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod message;

pub use constants::MAX_PRESSURE;
pub use errors::PeerError;
pub use ids::PeerId;
pub use message::Message;
