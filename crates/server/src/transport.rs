//! Streaming transport: delivers store mutations to N clients with
//! per-client ordering guarantees, independent of connect timing.
//!
//! The session loop is written against [`ClientSink`] so the ordering and
//! resync behavior is testable without sockets; the WebSocket adapter lives
//! in the routes module.

use crate::protocol::ServerMessage;
use async_trait::async_trait;
use runboard_core::store::RunStore;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outbound half of one connected client
#[async_trait]
pub trait ClientSink: Send {
    async fn send(&mut self, msg: ServerMessage) -> anyhow::Result<()>;
}

/// Transport tuning
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// A send that does not complete within this window marks the client a
    /// slow consumer and disconnects it; ingestion is never blocked.
    pub send_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a client session ended
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away (read side closed)
    ClientGone,
    /// The client could not keep up with the outbound stream
    Overrun,
}

/// Drive one client session: snapshot first, then mutations in revision
/// order. `resync_rx` carries client resync requests; the session ends when
/// that channel closes (client gone) or the client overruns.
pub async fn client_session<S: ClientSink>(
    store: &RunStore,
    sink: &mut S,
    mut resync_rx: mpsc::Receiver<()>,
    config: &TransportConfig,
) -> anyhow::Result<SessionEnd> {
    // Subscribe before snapshotting so no revision can fall between the
    // snapshot and the first received mutation.
    let mut rx = store.subscribe();
    let snapshot = store.snapshot();
    let mut last_revision = snapshot.revision;
    send_or_overrun(sink, ServerMessage::Snapshot(snapshot), config).await?;

    loop {
        tokio::select! {
            recv = rx.recv() => match recv {
                Ok(mutation) => {
                    // Already covered by the snapshot
                    if mutation.revision <= last_revision {
                        continue;
                    }
                    last_revision = mutation.revision;
                    if let Err(e) = send_or_overrun(sink, ServerMessage::Mutation(mutation), config).await {
                        warn!(error = %e, "disconnecting slow client");
                        return Ok(SessionEnd::Overrun);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Idempotent resync beats delta repair
                    debug!(missed, "client lagged behind the mutation stream; resnapshotting");
                    let snapshot = store.snapshot();
                    last_revision = snapshot.revision;
                    if let Err(e) = send_or_overrun(sink, ServerMessage::Snapshot(snapshot), config).await {
                        warn!(error = %e, "disconnecting slow client");
                        return Ok(SessionEnd::Overrun);
                    }
                }
                Err(RecvError::Closed) => {
                    // Store dropped; nothing left to stream
                    return Ok(SessionEnd::ClientGone);
                }
            },
            req = resync_rx.recv() => match req {
                Some(()) => {
                    let snapshot = store.snapshot();
                    last_revision = snapshot.revision;
                    send_or_overrun(sink, ServerMessage::Snapshot(snapshot), config).await?;
                }
                None => return Ok(SessionEnd::ClientGone),
            },
        }
    }
}

async fn send_or_overrun<S: ClientSink>(
    sink: &mut S,
    msg: ServerMessage,
    config: &TransportConfig,
) -> anyhow::Result<()> {
    match timeout(config.send_timeout, sink.send(msg)).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("send timed out after {:?}", config.send_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runboard_core::store::{RunStore, StoreConfig};
    use runboard_core::types::{LogKind, ScenarioPatch, ScenarioStatus};

    struct TestSink {
        tx: mpsc::UnboundedSender<ServerMessage>,
    }

    #[async_trait]
    impl ClientSink for TestSink {
        async fn send(&mut self, msg: ServerMessage) -> anyhow::Result<()> {
            self.tx.send(msg)?;
            Ok(())
        }
    }

    fn session_parts() -> (
        mpsc::UnboundedReceiver<ServerMessage>,
        TestSink,
        mpsc::Sender<()>,
        mpsc::Receiver<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (resync_tx, resync_rx) = mpsc::channel(4);
        (rx, TestSink { tx }, resync_tx, resync_rx)
    }

    #[tokio::test]
    async fn test_snapshot_then_incremental_in_revision_order() {
        let store = RunStore::new(StoreConfig::default());
        store.start_run().unwrap();
        store.append_log(LogKind::Stdout, "before connect");

        let (mut out, mut sink, resync_tx, resync_rx) = session_parts();
        let session_store = store.clone();
        let session = tokio::spawn(async move {
            client_session(
                &session_store,
                &mut sink,
                resync_rx,
                &TransportConfig::default(),
            )
            .await
        });

        // First message is always the full snapshot
        let first = out.recv().await.unwrap();
        let snapshot_revision = match first {
            ServerMessage::Snapshot(s) => {
                assert_eq!(s.log.len(), 1);
                s.revision
            }
            other => panic!("expected snapshot first, got {:?}", other),
        };

        for i in 0..20 {
            store.append_log(LogKind::Stdout, format!("line {}", i));
        }
        store.update_scenario("a.spec::t1", ScenarioPatch::status(ScenarioStatus::Running));

        let mut last = snapshot_revision;
        for _ in 0..21 {
            match out.recv().await.unwrap() {
                ServerMessage::Mutation(m) => {
                    assert_eq!(m.revision, last + 1, "revision gap or reorder");
                    last = m.revision;
                }
                other => panic!("expected mutation, got {:?}", other),
            }
        }

        // Dropping the read side ends the session cleanly
        drop(resync_tx);
        let end = session.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::ClientGone);
    }

    #[tokio::test]
    async fn test_resync_request_yields_fresh_snapshot() {
        let store = RunStore::new(StoreConfig::default());
        store.start_run().unwrap();

        let (mut out, mut sink, resync_tx, resync_rx) = session_parts();
        let session_store = store.clone();
        let session = tokio::spawn(async move {
            client_session(
                &session_store,
                &mut sink,
                resync_rx,
                &TransportConfig::default(),
            )
            .await
        });

        assert!(matches!(
            out.recv().await.unwrap(),
            ServerMessage::Snapshot(_)
        ));

        store.append_log(LogKind::Stdout, "one");
        resync_tx.send(()).await.unwrap();

        // The resync snapshot reflects everything up to the current
        // revision; whatever mutations arrive before it are in order.
        let mut got_second_snapshot = false;
        for _ in 0..3 {
            match out.recv().await {
                Some(ServerMessage::Snapshot(s)) => {
                    assert_eq!(s.log.len(), 1);
                    got_second_snapshot = true;
                    break;
                }
                Some(ServerMessage::Mutation(_)) => continue,
                None => break,
            }
        }
        assert!(got_second_snapshot);

        drop(resync_tx);
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientGone);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_disconnected_not_queued() {
        struct StuckSink;

        #[async_trait]
        impl ClientSink for StuckSink {
            async fn send(&mut self, _msg: ServerMessage) -> anyhow::Result<()> {
                // Simulates a client whose outbound buffer never drains
                std::future::pending::<()>().await;
                Ok(())
            }
        }

        let store = RunStore::new(StoreConfig::default());
        store.start_run().unwrap();

        let (_resync_tx, resync_rx) = mpsc::channel(4);
        let mut sink = StuckSink;
        let config = TransportConfig {
            send_timeout: Duration::from_millis(50),
        };
        // The very first snapshot send stalls, so the session errors out
        // instead of blocking anything upstream.
        let result = client_session(&store, &mut sink, resync_rx, &config).await;
        assert!(result.is_err());
    }
}
