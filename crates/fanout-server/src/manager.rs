//! The fanout manager: sole owner of the peer set and the only broadcaster.
//!
//! ```text
//!   source (mpsc) ──┐
//!   intake (mpsc) ──┼──► FanoutManager::run ──try_enqueue──► peer queues ──► writers
//!   removals ───────┘          │
//!                              └──► stats (watch) ──► /health
//! ```
//!
//! ## Rules
//! - **Single owner**: only the manager mutates the peer set; no locks.
//! - **Non-blocking broadcast**: `broadcast` is synchronous and never waits
//!   on a peer.
//! - **Evict on pressure**: a peer with `pressure_limit` undelivered messages
//!   is dropped instead of slowing everyone else down.
//! - **No backlog**: a peer only sees messages broadcast after it registered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use fanout_core::{Message, PeerId};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::peer::{DeliveryQueue, Enqueue, PeerExit, PeerHandle, PeerWriter};
use crate::shutdown::join_with_timeout;

/// Counters published after every peer-set change and broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FanoutStats {
    /// Peers currently registered.
    pub peers: usize,
    /// Messages broadcast so far.
    pub broadcasts: u64,
    /// Peers evicted for exceeding the pressure limit.
    pub evictions: u64,
    /// Peers removed after a write failure or remote hang-up.
    pub disconnects: u64,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was queued for.
    pub delivered: usize,
    /// Peers evicted by this broadcast.
    pub evicted: Vec<PeerId>,
}

/// Why [`FanoutManager::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunExit {
    /// The source feed ended.
    SourceClosed,
    /// Shutdown was requested through the cancellation token.
    Cancelled,
}

struct PeerSlot {
    queue: DeliveryQueue,
    stop: CancellationToken,
    disconnect: CancellationToken,
    writer: JoinHandle<PeerExit>,
    remote_addr: Option<SocketAddr>,
}

/// Owns the live peer set and fans every message out to it.
pub struct FanoutManager {
    peers: HashMap<PeerId, PeerSlot>,
    pressure_limit: usize,
    removal_tx: mpsc::UnboundedSender<PeerId>,
    removal_rx: mpsc::UnboundedReceiver<PeerId>,
    stats: FanoutStats,
    stats_tx: watch::Sender<FanoutStats>,
}

impl FanoutManager {
    /// Create a manager that evicts peers with `pressure_limit` undelivered
    /// messages (clamped to at least 1).
    pub fn new(pressure_limit: usize) -> Self {
        let (removal_tx, removal_rx) = mpsc::unbounded_channel();
        let (stats_tx, _) = watch::channel(FanoutStats::default());
        Self {
            peers: HashMap::new(),
            pressure_limit: pressure_limit.max(1),
            removal_tx,
            removal_rx,
            stats: FanoutStats::default(),
            stats_tx,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> FanoutStats {
        self.stats
    }

    /// Receiver that observes every counter update.
    pub fn subscribe_stats(&self) -> watch::Receiver<FanoutStats> {
        self.stats_tx.subscribe()
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Register a peer and start its writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&mut self, peer: PeerHandle) -> PeerId {
        let id = PeerId::new();
        let remote_addr = peer.remote_addr();
        let disconnect = peer.disconnect_token();
        let stop = CancellationToken::new();
        let (writer, queue) = PeerWriter::new(
            id.clone(),
            peer,
            self.pressure_limit,
            stop.clone(),
            self.removal_tx.clone(),
        );
        let writer = tokio::spawn(writer.run());

        let _ = self.peers.insert(
            id.clone(),
            PeerSlot {
                queue,
                stop,
                disconnect,
                writer,
                remote_addr,
            },
        );
        self.publish();
        info!(peer_id = %id, addr = ?remote_addr, peers = self.peers.len(), "peer registered");
        id
    }

    /// Queue `message` for every registered peer without waiting on any.
    pub fn broadcast(&mut self, message: &Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut gone = Vec::new();

        for (id, slot) in &self.peers {
            match slot.queue.try_enqueue(message) {
                Enqueue::Queued => report.delivered += 1,
                Enqueue::Full => report.evicted.push(id.clone()),
                Enqueue::Closed => gone.push(id.clone()),
            }
        }

        for id in &report.evicted {
            if let Some(slot) = self.peers.remove(id) {
                slot.stop.cancel();
                self.stats.evictions += 1;
                warn!(
                    peer_id = %id,
                    addr = ?slot.remote_addr,
                    pressure_limit = self.pressure_limit,
                    "peer exceeded pressure limit, evicting"
                );
            }
        }
        for id in &gone {
            let _ = self.detach(id);
        }

        self.stats.broadcasts += 1;
        self.publish();
        debug!(
            len = message.as_str().len(),
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "broadcast message"
        );
        report
    }

    /// Drop a peer whose writer stopped on its own.
    ///
    /// Returns `false` if the peer was already gone (e.g. evicted first).
    pub fn remove(&mut self, id: &PeerId) -> bool {
        let removed = self.detach(id);
        if removed {
            self.publish();
        }
        removed
    }

    fn detach(&mut self, id: &PeerId) -> bool {
        let Some(slot) = self.peers.remove(id) else {
            return false;
        };
        slot.stop.cancel();
        self.stats.disconnects += 1;
        info!(peer_id = %id, addr = ?slot.remote_addr, peers = self.peers.len(), "peer disconnected");
        true
    }

    fn publish(&mut self) {
        self.stats.peers = self.peers.len();
        let _ = self.stats_tx.send_replace(self.stats);
    }

    /// Close every peer and consume the manager.
    ///
    /// Writers first get `timeout` to flush what is already queued; whatever
    /// is still running after that is aborted. Every peer's hang-up token is
    /// cancelled at the end, so connections of aborted writers are released
    /// too.
    pub async fn shutdown(mut self, timeout: Duration) {
        let slots: Vec<(PeerId, PeerSlot)> = self.peers.drain().collect();
        info!(peers = slots.len(), "closing all peers");

        let mut writers = Vec::with_capacity(slots.len());
        let mut disconnects = Vec::with_capacity(slots.len());
        for (_, slot) in slots {
            // Dropping the queue lets the writer flush and close.
            drop(slot.queue);
            writers.push(slot.writer);
            disconnects.push(slot.disconnect);
        }
        self.publish();

        if !join_with_timeout(writers, timeout).await {
            warn!("some peers did not close in time");
        }
        for disconnect in disconnects {
            disconnect.cancel();
        }
    }

    /// Drive the manager until the source ends or `cancel` fires, then shut
    /// down.
    ///
    /// A closed intake only stops new registrations; existing peers keep
    /// receiving messages.
    pub async fn run(
        mut self,
        mut source: mpsc::Receiver<Message>,
        mut intake: mpsc::Receiver<PeerHandle>,
        cancel: CancellationToken,
        shutdown_timeout: Duration,
    ) -> RunExit {
        let mut intake_open = true;

        let exit = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break RunExit::Cancelled,
                Some(id) = self.removal_rx.recv() => {
                    let _ = self.remove(&id);
                }
                peer = intake.recv(), if intake_open => match peer {
                    Some(peer) => {
                        let _ = self.register(peer);
                    }
                    None => {
                        debug!("connection intake closed");
                        intake_open = false;
                    }
                },
                message = source.recv() => match message {
                    Some(message) => {
                        let _ = self.broadcast(&message);
                    }
                    None => break RunExit::SourceClosed,
                },
            }
        };

        info!(?exit, stats = ?self.stats, "fanout manager stopping");
        self.shutdown(shutdown_timeout).await;
        exit
    }
}
