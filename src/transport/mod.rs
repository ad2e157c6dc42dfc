//! Streaming transport seam
//!
//! A `Connection` is one live, message-oriented, order-preserving link to a
//! backend pipeline. The connection manager owns it exclusively; concrete
//! transports pump messages behind a pair of channels so the session logic
//! never touches socket types.

pub mod loopback;
pub mod ws;

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::ClientMessage;

pub use loopback::{LoopbackConnector, LoopbackPeer};
pub use ws::WsConnector;

/// Messages buffered per direction before backpressure applies
pub(crate) const CHANNEL_CAPACITY: usize = 64;

/// One live transport session
pub struct Connection {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<String>,
}

impl Connection {
    /// Assemble a connection from its two channel ends. Concrete transports
    /// keep the opposite ends and pump them to the wire.
    pub fn new(outbound: mpsc::Sender<ClientMessage>, inbound: mpsc::Receiver<String>) -> Self {
        Self { outbound, inbound }
    }

    /// Split into the sending and receiving halves; the receiving half is
    /// consumed by the inbound dispatch loop.
    pub fn split(self) -> (FrameSink, mpsc::Receiver<String>) {
        (FrameSink { tx: self.outbound }, self.inbound)
    }
}

/// Sending half of a connection
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<ClientMessage>,
}

impl FrameSink {
    /// Hand one message to the transport without waiting. A full buffer
    /// means the transport cannot keep up; the frame is rejected rather
    /// than queued, matching at-most-once delivery.
    pub fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::SendFailed("transport buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Opens transport sessions. `connect` returns once the transport has
/// confirmed readiness.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, pipeline_id: &str) -> Result<Connection, TransportError>;
}
