//! In-process transport
//!
//! Pairs a connection with a `LoopbackPeer` through channels, standing in
//! for the backend. Tests script the peer directly; the demo binary runs a
//! small fake pipeline on it for offline use.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::ClientMessage;
use crate::transport::{Connection, Connector, CHANNEL_CAPACITY};

#[derive(Default)]
struct Inner {
    peers: Mutex<VecDeque<LoopbackPeer>>,
    reject_connects: AtomicBool,
}

/// Connector whose sessions terminate in-process
#[derive(Clone, Default)]
pub struct LoopbackConnector {
    inner: Arc<Inner>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail, for failure-path tests
    pub fn reject_connects(&self, reject: bool) {
        self.inner.reject_connects.store(reject, Ordering::SeqCst);
    }

    /// Take the peer end of the most recent connection
    pub fn take_peer(&self) -> Option<LoopbackPeer> {
        self.inner.peers.lock().pop_front()
    }
}

#[async_trait::async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, pipeline_id: &str) -> Result<Connection, TransportError> {
        if self.inner.reject_connects.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(format!(
                "loopback refused pipeline {pipeline_id}"
            )));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        self.inner.peers.lock().push_back(LoopbackPeer {
            from_client: outbound_rx,
            to_client: inbound_tx,
        });

        Ok(Connection::new(outbound_tx, inbound_rx))
    }
}

/// The backend end of a loopback connection. Dropping it closes the
/// transport under the client, which the session reports as an unexpected
/// disconnect.
pub struct LoopbackPeer {
    from_client: mpsc::Receiver<ClientMessage>,
    to_client: mpsc::Sender<String>,
}

impl LoopbackPeer {
    /// Next frame submitted by the client, if any has arrived
    pub fn try_recv_frame(&mut self) -> Option<ClientMessage> {
        self.from_client.try_recv().ok()
    }

    /// Wait for the next frame from the client
    pub async fn recv_frame(&mut self) -> Option<ClientMessage> {
        self.from_client.recv().await
    }

    /// Push one raw text frame to the client
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.to_client
            .send(text.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Push a result message for one frame
    pub async fn send_result(
        &self,
        frame_index: u64,
        result: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send_text(
            serde_json::json!({ "frame_index": frame_index, "result": result }).to_string(),
        )
        .await
    }

    /// Push an error message; `code` may be any string, including codes
    /// this client does not know
    pub async fn send_error(
        &self,
        code: &str,
        detail: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut message = serde_json::json!({ "error": code });
        if let Some(detail) = detail {
            message["detail"] = serde_json::Value::String(detail.to_string());
        }
        self.send_text(message.to_string()).await
    }

    /// Push a backpressure notice
    pub async fn send_slow_down(&self) -> Result<(), TransportError> {
        self.send_text(serde_json::json!({ "type": "slow_down" }).to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_hands_out_matching_peer() {
        let connector = LoopbackConnector::new();
        let connection = connector.connect("demo").await.unwrap();
        let mut peer = connector.take_peer().unwrap();

        let (sink, mut inbound) = connection.split();
        sink.send(ClientMessage::frame("demo", 1, &bytes::Bytes::from_static(b"x")))
            .unwrap();

        let frame = peer.recv_frame().await.unwrap();
        let ClientMessage::Frame { frame_index, .. } = frame;
        assert_eq!(frame_index, 1);

        peer.send_slow_down().await.unwrap();
        assert_eq!(inbound.recv().await.unwrap(), r#"{"type":"slow_down"}"#);
    }

    #[tokio::test]
    async fn test_rejected_connect() {
        let connector = LoopbackConnector::new();
        connector.reject_connects(true);
        assert!(connector.connect("demo").await.is_err());
    }
}
