//! WebSocket transport
//!
//! Connects to `{base_url}/stream/{pipeline_id}` and pumps messages between
//! the socket and the connection channels on a dedicated task. The task
//! ends when either side closes; dropping the `Connection` tears the socket
//! down.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::protocol::ClientMessage;
use crate::transport::{Connection, Connector, CHANNEL_CAPACITY};

/// Connector for the backend streaming endpoint
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    /// `base_url` is the scheme + host part, e.g. `ws://localhost:8090`
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    fn stream_url(&self, pipeline_id: &str) -> String {
        format!("{}/stream/{}", self.base_url, pipeline_id)
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, pipeline_id: &str) -> Result<Connection, TransportError> {
        let url = self.stream_url(pipeline_id);
        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!("websocket open: {}", url);

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        if let Err(e) = sink.send(Message::Text(message.to_text())).await {
                            tracing::warn!("websocket send failed: {}", e);
                            break;
                        }
                    }
                    frame = stream.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                // A full inbound buffer or a dropped receiver
                                // both mean the session is done consuming
                                if inbound_tx.send(text).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {} // ping/pong/binary: nothing to dispatch
                            Some(Err(e)) => {
                                tracing::warn!("websocket receive failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            let _ = sink.close().await;
            tracing::debug!("websocket pump finished");
        });

        Ok(Connection::new(outbound_tx, inbound_rx))
    }
}
