//! Peer identity.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of one registered peer.
///
/// Minted per registration, so the same socket registered twice yields two
/// distinct peers. UUID v7 keeps IDs roughly ordered by registration time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("peer_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = PeerId::new();
        let b = PeerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn id_has_prefix() {
        let id = PeerId::new();
        assert!(id.as_str().starts_with("peer_"));
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = PeerId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
