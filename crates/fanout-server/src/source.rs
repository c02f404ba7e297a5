//! Upstream feed: dials the source `WebSocket` and forwards its text frames.

use fanout_core::Message;
use futures::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upstream failures. All of them end the relay.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The upstream could not be reached.
    #[error("failed to connect to source {url}: {reason}")]
    Dial {
        /// Upstream URL.
        url: String,
        /// Underlying failure.
        reason: String,
    },
    /// Reading from the upstream failed.
    #[error("source read failed: {0}")]
    Read(String),
    /// The upstream closed the connection.
    #[error("source closed the connection")]
    Closed,
}

/// Connected upstream feed.
pub struct SourceFeed {
    url: String,
    stream: WsStream,
}

impl std::fmt::Debug for SourceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFeed").field("url", &self.url).finish_non_exhaustive()
    }
}

impl SourceFeed {
    /// Dial the upstream.
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        let (stream, _) = connect_async(url).await.map_err(|e| SourceError::Dial {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        info!(url, "connected to source");
        Ok(Self {
            url: url.to_owned(),
            stream,
        })
    }

    /// Forward text frames to `tx` until the upstream ends.
    ///
    /// Returns `Ok(())` only when the receiving side went away first.
    /// `tx` is dropped on return either way.
    pub async fn run(self, tx: mpsc::Sender<Message>) -> Result<(), SourceError> {
        let result = pump(self.stream, &tx).await;
        match &result {
            Ok(()) => debug!(url = %self.url, "source feed stopped, no receiver"),
            Err(e) => warn!(url = %self.url, error = %e, "source feed ended"),
        }
        result
    }
}

async fn pump<S>(mut stream: S, tx: &mpsc::Sender<Message>) -> Result<(), SourceError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame.map_err(|e| SourceError::Read(e.to_string()))? {
            WsMessage::Text(text) => {
                if tx.send(Message::new(text.as_str())).await.is_err() {
                    return Ok(());
                }
            }
            WsMessage::Binary(data) => {
                warn!(len = data.len(), "ignoring incoming non-text message");
            }
            WsMessage::Close(_) => return Err(SourceError::Closed),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }
    Err(SourceError::Closed)
}

#[cfg(test)]
mod tests {
    use fanout_logging::capture_logs;
    use futures::stream;
    use tracing::Level;

    use super::*;

    fn frames(
        items: Vec<Result<WsMessage, tungstenite::Error>>,
    ) -> impl Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin {
        stream::iter(items)
    }

    fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m.as_str().to_owned());
        }
        out
    }

    #[tokio::test]
    async fn forwards_text_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = frames(vec![
            Ok(WsMessage::text("one")),
            Ok(WsMessage::text("two")),
            Ok(WsMessage::text("three")),
        ]);

        let result = pump(input, &tx).await;
        assert!(matches!(result, Err(SourceError::Closed)));
        assert_eq!(drain(&mut rx), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn skips_binary_with_warning() {
        let (logs, _guard) = capture_logs();
        let (tx, mut rx) = mpsc::channel(8);
        let input = frames(vec![
            Ok(WsMessage::text("a")),
            Ok(WsMessage::binary(vec![0_u8, 1, 2])),
            Ok(WsMessage::text("b")),
        ]);

        let _ = pump(input, &tx).await;
        assert_eq!(drain(&mut rx), ["a", "b"]);
        assert!(logs.has_event(Level::WARN, "non-text"));
    }

    #[tokio::test]
    async fn ignores_control_frames() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = frames(vec![
            Ok(WsMessage::Ping(vec![1_u8].into())),
            Ok(WsMessage::Pong(vec![].into())),
            Ok(WsMessage::text("after")),
        ]);

        let _ = pump(input, &tx).await;
        assert_eq!(drain(&mut rx), ["after"]);
    }

    #[tokio::test]
    async fn close_frame_ends_feed() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = frames(vec![
            Ok(WsMessage::text("last")),
            Ok(WsMessage::Close(None)),
            Ok(WsMessage::text("never")),
        ]);

        let result = pump(input, &tx).await;
        assert!(matches!(result, Err(SourceError::Closed)));
        assert_eq!(drain(&mut rx), ["last"]);
    }

    #[tokio::test]
    async fn read_error_is_reported() {
        let (tx, _rx) = mpsc::channel(8);
        let input = frames(vec![Err(tungstenite::Error::ConnectionClosed)]);

        let result = pump(input, &tx).await;
        assert!(matches!(result, Err(SourceError::Read(_))));
    }

    #[tokio::test]
    async fn stops_quietly_when_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let input = frames(vec![Ok(WsMessage::text("dropped"))]);

        assert!(pump(input, &tx).await.is_ok());
    }

    #[tokio::test]
    async fn dial_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("ws://{addr}/");
        let err = SourceFeed::connect(&url).await.unwrap_err();
        match err {
            SourceError::Dial { url: dialed, .. } => assert_eq!(dialed, url),
            other => panic!("expected dial error, got {other:?}"),
        }
    }

    #[test]
    fn error_messages() {
        let err = SourceError::Dial {
            url: "ws://up".into(),
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "failed to connect to source ws://up: refused");
        assert_eq!(SourceError::Closed.to_string(), "source closed the connection");
    }
}
