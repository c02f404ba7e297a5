//! Fixed relay constants.

/// Maximum number of undelivered messages a peer may have queued.
///
/// A broadcast that finds this many messages already waiting for a peer
/// evicts that peer instead of waiting for it.
pub const MAX_PRESSURE: usize = 10;
