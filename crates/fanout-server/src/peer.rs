//! Downstream peers: transport seam, delivery queue, and the per-peer writer.
//!
//! ```text
//!  FanoutManager ──try_enqueue──► DeliveryQueue (≤ P undelivered) ──► PeerWriter ──► PeerSink
//!        ▲                                                              │
//!        └──────────────── removal request (write failed / hung up) ────┘
//! ```
//!
//! A message counts against the pressure limit from the moment it is queued
//! until its write completes, so a writer stuck mid-write still holds the
//! slot of the message it is writing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout_core::{Message, PeerError, PeerId};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a stopping writer waits for the close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Outbound transport of one peer.
#[async_trait]
pub trait PeerSink: Send + 'static {
    /// Write one message as a text frame.
    async fn send_text(&mut self, message: &Message) -> Result<(), PeerError>;

    /// Close the connection. Errors are ignored: the peer is gone either way.
    async fn close(&mut self);
}

/// A newly accepted connection, ready to be registered with the manager.
pub struct PeerHandle {
    sink: Box<dyn PeerSink>,
    disconnect: CancellationToken,
    remote_addr: Option<SocketAddr>,
}

impl PeerHandle {
    /// Wrap a transport.
    pub fn new(sink: impl PeerSink) -> Self {
        Self {
            sink: Box::new(sink),
            disconnect: CancellationToken::new(),
            remote_addr: None,
        }
    }

    /// Attach the remote address for logging.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Token tied to the connection's lifetime.
    ///
    /// The intake cancels it when the remote side goes away; the writer
    /// cancels it when it stops, so whoever is reading the socket can stop
    /// too.
    pub fn disconnect_token(&self) -> CancellationToken {
        self.disconnect.clone()
    }

    /// Remote address, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Close a peer that was never registered.
    pub async fn close(mut self) {
        self.disconnect.cancel();
        self.sink.close().await;
    }
}

/// Why a peer writer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerExit {
    /// The manager evicted the peer.
    Evicted,
    /// A write to the connection failed.
    WriteFailed,
    /// The remote side closed the connection.
    HungUp,
    /// The manager dropped the queue and everything queued was written.
    ChannelClosed,
}

impl PeerExit {
    /// Whether the writer must ask the manager to drop the peer.
    pub fn requests_removal(self) -> bool {
        matches!(self, Self::WriteFailed | Self::HungUp)
    }
}

/// A queued message and the pressure slot it occupies.
struct Delivery {
    message: Message,
    _slot: OwnedSemaphorePermit,
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Enqueue {
    Queued,
    /// The peer already has `pressure_limit` undelivered messages.
    Full,
    /// The writer is gone.
    Closed,
}

/// Manager side of a peer's bounded delivery queue.
pub(crate) struct DeliveryQueue {
    tx: mpsc::Sender<Delivery>,
    slots: Arc<Semaphore>,
}

impl DeliveryQueue {
    /// Create a queue holding at most `pressure_limit` undelivered messages.
    fn new(pressure_limit: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(pressure_limit);
        let slots = Arc::new(Semaphore::new(pressure_limit));
        (Self { tx, slots }, rx)
    }

    /// Queue `message` without waiting.
    pub(crate) fn try_enqueue(&self, message: &Message) -> Enqueue {
        if self.tx.is_closed() {
            return Enqueue::Closed;
        }
        let slot = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => return Enqueue::Full,
        };
        let delivery = Delivery {
            message: message.clone(),
            _slot: slot,
        };
        match self.tx.try_send(delivery) {
            Ok(()) => Enqueue::Queued,
            // Unreachable while slots <= channel capacity, but equivalent anyway.
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }
}

/// Drains one peer's queue onto its connection, strictly in order.
pub(crate) struct PeerWriter {
    id: PeerId,
    rx: mpsc::Receiver<Delivery>,
    sink: Box<dyn PeerSink>,
    stop: CancellationToken,
    disconnect: CancellationToken,
    removals: mpsc::UnboundedSender<PeerId>,
}

impl PeerWriter {
    /// Build the writer and its queue for a freshly registered peer.
    pub(crate) fn new(
        id: PeerId,
        handle: PeerHandle,
        pressure_limit: usize,
        stop: CancellationToken,
        removals: mpsc::UnboundedSender<PeerId>,
    ) -> (Self, DeliveryQueue) {
        let (queue, rx) = DeliveryQueue::new(pressure_limit);
        let writer = Self {
            id,
            rx,
            sink: handle.sink,
            stop,
            disconnect: handle.disconnect,
            removals,
        };
        (writer, queue)
    }

    /// Run until stopped, disconnected, failed, or drained.
    pub(crate) async fn run(mut self) -> PeerExit {
        let exit = loop {
            let delivery = tokio::select! {
                biased;
                () = self.stop.cancelled() => break PeerExit::Evicted,
                () = self.disconnect.cancelled() => break PeerExit::HungUp,
                next = self.rx.recv() => match next {
                    Some(delivery) => delivery,
                    None => break PeerExit::ChannelClosed,
                },
            };

            let written = tokio::select! {
                biased;
                () = self.stop.cancelled() => break PeerExit::Evicted,
                () = self.disconnect.cancelled() => break PeerExit::HungUp,
                res = self.sink.send_text(&delivery.message) => res,
            };
            // Frees the pressure slot only once the write has completed.
            drop(delivery);

            if let Err(e) = written {
                warn!(peer_id = %self.id, error = %e, "peer write failed");
                break PeerExit::WriteFailed;
            }
        };

        // Later broadcasts see a closed queue instead of filling a dead one.
        self.rx.close();
        if exit.requests_removal() {
            // The manager may already be gone during shutdown.
            let _ = self.removals.send(self.id.clone());
        }
        self.disconnect.cancel();
        // A peer that stopped reading can stall the close handshake forever.
        // Dropping the sink afterwards releases the socket either way.
        if tokio::time::timeout(CLOSE_GRACE, self.sink.close()).await.is_err() {
            debug!(peer_id = %self.id, "peer did not close in time, dropping connection");
        }
        debug!(peer_id = %self.id, ?exit, "peer writer stopped");
        exit
    }
}
