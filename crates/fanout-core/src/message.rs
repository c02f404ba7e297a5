//! Upstream message payload.

use std::fmt;
use std::sync::Arc;

/// One upstream text frame.
///
/// The payload is never inspected by the relay. Cloning shares the buffer,
/// so broadcasting to many peers costs one reference count per peer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message(Arc<str>);

impl Message {
    /// Wrap a text payload.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Payload as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// Payloads can be large; log the size, not the content.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message").field("len", &self.0.len()).finish()
    }
}
