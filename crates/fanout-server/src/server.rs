//! `FanoutServer`: wires the source feed, the manager and the intake together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use fanout_core::MAX_PRESSURE;
use fanout_settings::{FanoutSettings, SettingsError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::intake::{IntakeState, router};
use crate::manager::{FanoutManager, RunExit};
use crate::shutdown::ShutdownCoordinator;
use crate::source::SourceFeed;

/// Upstream messages buffered ahead of the manager.
const SOURCE_CHANNEL_CAPACITY: usize = 64;
/// Accepted peers buffered ahead of the manager.
const INTAKE_CHANNEL_CAPACITY: usize = 64;

/// The relay process.
pub struct FanoutServer {
    settings: FanoutSettings,
    shutdown: Arc<ShutdownCoordinator>,
}

impl FanoutServer {
    /// Create a new server.
    pub fn new(settings: FanoutSettings) -> Self {
        Self {
            settings,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Get the settings.
    pub fn settings(&self) -> &FanoutSettings {
        &self.settings
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Validate settings, bind the listener, and relay until shutdown.
    ///
    /// Ctrl-C triggers a graceful shutdown and an `Ok(())` return.
    pub async fn run(self) -> Result<(), ServerError> {
        self.settings.validate()?;
        let addr = self.settings.listen_addr()?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let signals = self.shutdown.listen_for_signals();
        let result = self.serve(listener).await;
        signals.abort();
        result
    }

    /// Relay on an already bound listener.
    ///
    /// Returns `Err(ServerError::Source(..))` when the upstream ends, and
    /// `Ok(())` after the shutdown coordinator fires.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let Self { settings, shutdown } = self;
        let url = settings
            .source_url
            .as_deref()
            .ok_or(SettingsError::Missing("$WS_SOURCE"))?;
        let shutdown_timeout = settings.shutdown_timeout();
        let local_addr = listener.local_addr().map_err(ServerError::Serve)?;

        let feed = SourceFeed::connect(url).await?;

        let manager = FanoutManager::new(MAX_PRESSURE);
        let stats = manager.subscribe_stats();
        let (source_tx, source_rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
        let (intake_tx, intake_rx) = mpsc::channel(INTAKE_CHANNEL_CAPACITY);

        let manager_task = tokio::spawn(manager.run(
            source_rx,
            intake_rx,
            shutdown.token(),
            shutdown_timeout,
        ));
        let source_task = tokio::spawn(feed.run(source_tx));

        let app = router(IntakeState {
            peers: intake_tx,
            stats,
            start_time: Instant::now(),
        });
        // Stopped only after the manager has closed every peer.
        let http_stop = CancellationToken::new();
        let http_stopped = http_stop.clone();
        let mut http_task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { http_stopped.cancelled().await })
            .await
        });
        info!(addr = %local_addr, source = url, "fanout relay listening");

        let exit = manager_task.await;

        http_stop.cancel();
        match tokio::time::timeout(shutdown_timeout, &mut http_task).await {
            Ok(served) => served?.map_err(ServerError::Serve)?,
            Err(_) => {
                warn!("http server did not stop in time, aborting");
                http_task.abort();
            }
        }

        match exit? {
            RunExit::SourceClosed => {
                source_task.await??;
                info!("source feed stopped");
                Ok(())
            }
            RunExit::Cancelled => {
                source_task.abort();
                let _ = source_task.await;
                info!("fanout relay stopped");
                Ok(())
            }
        }
    }
}
