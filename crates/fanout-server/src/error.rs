//! Relay-level errors.

use fanout_settings::SettingsError;

use crate::source::SourceError;

/// Fatal errors returned by [`crate::FanoutServer::run`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The settings are incomplete or invalid.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested listen address.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The upstream feed failed or ended.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A relay task panicked or was cancelled.
    #[error("relay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
