//! Operator-initiated shutdown and bounded task draining.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates operator-initiated shutdown across the relay's tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token that fires when shutdown is requested.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token on Ctrl-C.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!("received Ctrl-C, shutting down");
                        token.cancel();
                    }
                    Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
                },
                () = token.cancelled() => {}
            }
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait up to `timeout` for every handle, then abort the stragglers.
///
/// Returns `true` if all tasks finished in time.
pub async fn join_with_timeout<T>(mut handles: Vec<JoinHandle<T>>, timeout: Duration) -> bool {
    if handles.is_empty() {
        return true;
    }
    let drain = futures::future::join_all(handles.iter_mut());
    let drained = tokio::time::timeout(timeout, drain).await.is_ok();
    if !drained {
        warn!(
            task_count = handles.len(),
            "shutdown timed out after {timeout:?}, aborting remaining tasks"
        );
        for handle in &handles {
            handle.abort();
        }
    }
    drained
}
