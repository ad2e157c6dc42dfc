//! Connection lifecycle
//!
//! One manager owns one streaming session to one backend pipeline: the
//! transport, the session store, and the inbound dispatch loop. The state
//! machine is `Disconnected → Connecting → Connected → {Error,
//! Disconnected}`; `Error` is non-terminal and exits through `connect`.
//! Switching pipelines is always disconnect-then-connect, never an implicit
//! resend, because the backend binds one pipeline per transport session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::decode;
use crate::error::{Result, SessionError};
use crate::protocol::{self, ClientMessage, InboundMessage};
use crate::session::classifier::{self, ClassifiedError};
use crate::session::state::{ConnectionState, SessionStore};
use crate::submit::OutboundFrame;
use crate::transport::{Connector, FrameSink};

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    store: SessionStore,
    sink: Mutex<Option<FrameSink>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    /// True while frame sampling may run; cleared first on disconnect
    streaming: Arc<AtomicBool>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, store: SessionStore) -> Self {
        Self {
            connector,
            store,
            sink: Mutex::new(None),
            dispatch: Mutex::new(None),
            streaming: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Gate observed by the sampling loop; cleared before teardown so no
    /// frame slips out mid-disconnect
    pub(crate) fn streaming_gate(&self) -> Arc<AtomicBool> {
        self.streaming.clone()
    }

    /// Open a session to the given pipeline.
    ///
    /// An empty pipeline id marks the session `Error` and does no transport
    /// work. Connecting while a session is live is refused; callers switch
    /// pipelines with an explicit disconnect first.
    pub async fn connect(&self, pipeline_id: &str) -> Result<()> {
        if pipeline_id.is_empty() {
            self.store
                .mark_error(ClassifiedError::session("No pipeline selected."));
            return Err(SessionError::EmptyPipelineId.into());
        }

        if matches!(
            self.store.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            let current = self.store.pipeline_id().unwrap_or_default();
            return Err(SessionError::AlreadyConnected(current).into());
        }

        let session_id = self.store.begin_connect(pipeline_id);
        tracing::info!("session {}: connecting to pipeline {}", session_id, pipeline_id);

        let connection = match self.connector.connect(pipeline_id).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!("session {}: connect failed: {}", session_id, e);
                self.store.mark_error(ClassifiedError::session(e.to_string()));
                return Err(e.into());
            }
        };

        // A disconnect may have raced the handshake; do not resurrect
        if self.store.state() != ConnectionState::Connecting {
            return Err(SessionError::NotConnected.into());
        }

        let (sink, inbound) = connection.split();
        *self.sink.lock() = Some(sink);
        *self.dispatch.lock() = Some(tokio::spawn(dispatch_loop(self.store.clone(), inbound)));
        self.streaming.store(true, Ordering::SeqCst);
        self.store.mark_connected();
        tracing::info!("session {}: connected", session_id);
        Ok(())
    }

    /// Submit one frame. Accepted only while `Connected`; any rejection is
    /// the caller's dropped frame, never a fatal condition.
    pub fn send(&self, frame: &OutboundFrame) -> Result<()> {
        if self.store.state() != ConnectionState::Connected {
            return Err(SessionError::NotConnected.into());
        }
        let pipeline_id = self
            .store
            .pipeline_id()
            .ok_or(SessionError::NotConnected)?;

        let message = ClientMessage::frame(&pipeline_id, frame.sequence, &frame.payload);
        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink) => {
                sink.send(message)?;
                Ok(())
            }
            None => Err(SessionError::NotConnected.into()),
        }
    }

    /// Tear the session down: stop sampling, close the transport, and clear
    /// result/error references and metrics as one unit. Idempotent.
    pub fn disconnect(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        drop(self.sink.lock().take());
        if let Some(handle) = self.dispatch.lock().take() {
            handle.abort();
        }
        self.store.reset_disconnected();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if let Some(handle) = self.dispatch.lock().take() {
            handle.abort();
        }
    }
}

/// Inbound dispatch: every message is classified into exactly one of
/// result, error, backpressure notice, or malformed before any state moves.
async fn dispatch_loop(store: SessionStore, mut inbound: mpsc::Receiver<String>) {
    while let Some(text) = inbound.recv().await {
        match protocol::classify(&text) {
            InboundMessage::Result(raw) => {
                let frame = decode::normalize(&raw);
                if !store.store_result(frame) {
                    tracing::debug!("stale result for frame {} dropped", raw.frame_index);
                }
            }
            InboundMessage::Error(event) => {
                let classified = classifier::classify(&event);
                tracing::warn!("pipeline error {:?}: {}", event.code, classified.message);
                store.mark_error(classified);
            }
            InboundMessage::SlowDown => {
                store.record_slow_down();
                tracing::debug!("backpressure notice received");
            }
            InboundMessage::Malformed => {
                tracing::debug!("ignoring malformed inbound message");
            }
        }
    }

    // The transport closed underneath a live session
    if matches!(
        store.state(),
        ConnectionState::Connected | ConnectionState::Connecting
    ) {
        store.mark_error(ClassifiedError::session("Connection closed unexpectedly."));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::classifier::Severity;
    use crate::session::state::SessionMetrics;
    use crate::transport::LoopbackConnector;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Duration;

    fn manager() -> (ConnectionManager, LoopbackConnector) {
        let connector = LoopbackConnector::new();
        let manager = ConnectionManager::new(Arc::new(connector.clone()), SessionStore::new());
        (manager, connector)
    }

    fn outbound(sequence: u64) -> OutboundFrame {
        OutboundFrame {
            sequence,
            payload: Bytes::from_static(b"\xff\xd8"),
            captured_at: Utc::now(),
        }
    }

    /// Poll until the dispatch task has applied an update
    async fn wait_for(store: &SessionStore, pred: impl Fn(&SessionStore) -> bool) {
        for _ in 0..100 {
            if pred(store) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_empty_pipeline_id_marks_error_without_transport_work() {
        let (manager, connector) = manager();
        assert!(manager.connect("").await.is_err());
        assert_eq!(manager.store().state(), ConnectionState::Error);
        assert!(connector.take_peer().is_none());
    }

    #[tokio::test]
    async fn test_connect_reaches_connected() {
        let (manager, connector) = manager();
        manager.connect("yolo-v8").await.unwrap();
        assert_eq!(manager.store().state(), ConnectionState::Connected);
        assert_eq!(manager.store().pipeline_id().as_deref(), Some("yolo-v8"));
        assert!(connector.take_peer().is_some());
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_refused() {
        let (manager, _connector) = manager();
        manager.connect("a").await.unwrap();
        assert!(manager.connect("b").await.is_err());
        // The live session is untouched
        assert_eq!(manager.store().pipeline_id().as_deref(), Some("a"));
        assert_eq!(manager.store().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_error_state() {
        let (manager, connector) = manager();
        connector.reject_connects(true);
        assert!(manager.connect("demo").await.is_err());

        let snapshot = manager.store().snapshot();
        assert_eq!(snapshot.state, ConnectionState::Error);
        assert!(snapshot.last_error.unwrap().is_fatal());
    }

    #[tokio::test]
    async fn test_error_state_exits_through_connect() {
        let (manager, connector) = manager();
        connector.reject_connects(true);
        let _ = manager.connect("demo").await;
        assert_eq!(manager.store().state(), ConnectionState::Error);

        connector.reject_connects(false);
        manager.connect("demo").await.unwrap();
        assert_eq!(manager.store().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_send_rejected_unless_connected() {
        let (manager, _connector) = manager();
        assert!(manager.send(&outbound(0)).is_err());
    }

    #[tokio::test]
    async fn test_send_reaches_peer_with_pipeline_binding() {
        let (manager, connector) = manager();
        manager.connect("yolo-v8").await.unwrap();
        let mut peer = connector.take_peer().unwrap();

        manager.send(&outbound(5)).unwrap();
        let ClientMessage::Frame {
            pipeline_id,
            frame_index,
            ..
        } = peer.recv_frame().await.unwrap();
        assert_eq!(pipeline_id, "yolo-v8");
        assert_eq!(frame_index, 5);
    }

    #[tokio::test]
    async fn test_result_dispatch_updates_store() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_result(
            1,
            serde_json::json!({
                "detections": [{"x1": 10.0, "y1": 20.0, "x2": 30.0, "y2": 60.0}],
                "scores": [0.95],
                "labels": ["player"],
            }),
        )
        .await
        .unwrap();

        wait_for(manager.store(), |s| s.snapshot().last_result.is_some()).await;
        let frame = manager.store().snapshot().last_result.unwrap();
        assert_eq!(frame.frame_index, 1);
        assert_eq!(frame.detections[0].label, "player");
    }

    #[tokio::test]
    async fn test_stale_result_does_not_overwrite_newer_one() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_result(4, serde_json::json!({"detections": [[0, 0, 1, 1]]}))
            .await
            .unwrap();
        peer.send_result(2, serde_json::json!({"detections": []}))
            .await
            .unwrap();

        wait_for(manager.store(), |s| s.snapshot().last_result.is_some()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frame = manager.store().snapshot().last_result.unwrap();
        assert_eq!(frame.frame_index, 4);
        assert_eq!(frame.detections.len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_dispatch_forces_error_state() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_error("invalid_pipeline", None).await.unwrap();
        wait_for(manager.store(), |s| s.state() == ConnectionState::Error).await;

        let error = manager.store().snapshot().last_error.unwrap();
        assert_eq!(error.message, "The selected pipeline is not available.");
    }

    #[tokio::test]
    async fn test_recoverable_error_keeps_session_connected() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_error("frame_too_large", None).await.unwrap();
        wait_for(manager.store(), |s| s.snapshot().last_error.is_some()).await;

        let snapshot = manager.store().snapshot();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.last_error.unwrap().severity, Severity::Recoverable);
        // A later frame may still go out
        assert!(manager.send(&outbound(9)).is_ok());
    }

    #[tokio::test]
    async fn test_slow_down_notice_counts_without_touching_results() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_slow_down().await.unwrap();
        wait_for(manager.store(), |s| s.metrics().slow_down_warnings == 1).await;
        assert!(manager.store().snapshot().last_result.is_none());
        assert_eq!(manager.store().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_malformed_messages_are_ignored() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_text("garbage").await.unwrap();
        peer.send_text(r#"{"frame_index": 3}"#).await.unwrap();
        peer.send_slow_down().await.unwrap();

        // The notice behind the garbage still lands, nothing else moved
        wait_for(manager.store(), |s| s.metrics().slow_down_warnings == 1).await;
        let snapshot = manager.store().snapshot();
        assert!(snapshot.last_result.is_none());
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_unexpected_close_is_session_fatal() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        drop(peer);
        wait_for(manager.store(), |s| s.state() == ConnectionState::Error).await;
        assert!(manager.store().snapshot().last_error.unwrap().is_fatal());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_resets_metrics() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_slow_down().await.unwrap();
        wait_for(manager.store(), |s| s.metrics().slow_down_warnings == 1).await;
        manager.store().record_dropped_frame();

        manager.disconnect();
        assert_eq!(manager.store().state(), ConnectionState::Disconnected);
        assert_eq!(manager.store().metrics(), SessionMetrics::default());
        assert!(!manager.streaming_gate().load(Ordering::SeqCst));

        manager.disconnect();
        assert_eq!(manager.store().state(), ConnectionState::Disconnected);
        assert_eq!(manager.store().metrics(), SessionMetrics::default());
    }

    #[tokio::test]
    async fn test_disconnect_clears_stale_results_before_any_render() {
        let (manager, connector) = manager();
        manager.connect("demo").await.unwrap();
        let peer = connector.take_peer().unwrap();

        peer.send_result(1, serde_json::json!({"detections": [[0, 0, 1, 1]]}))
            .await
            .unwrap();
        wait_for(manager.store(), |s| s.snapshot().last_result.is_some()).await;

        manager.disconnect();
        assert!(manager.store().snapshot().last_result.is_none());
    }
}
