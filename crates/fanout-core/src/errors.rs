//! Peer transport errors.

use thiserror::Error;

/// Errors a peer transport can report to its writer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Writing a frame to the connection failed.
    #[error("failed to send to peer: {0}")]
    Send(String),
}
