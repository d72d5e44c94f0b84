use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::BridgeError;

/// One end of a message channel between two execution contexts.
///
/// Frames are buffered until the other side reads them, so a peer may send before its
/// counterpart has started listening.
#[derive(Debug)]
pub struct Port<T = Value> {
    tx: UnboundedSender<T>,
    rx: UnboundedReceiver<T>,
}

/// Creates two connected ports.
pub fn pair<T>() -> (Port<T>, Port<T>) {
    let (a_tx, b_rx) = unbounded_channel();
    let (b_tx, a_rx) = unbounded_channel();
    (Port { tx: a_tx, rx: a_rx }, Port { tx: b_tx, rx: b_rx })
}

impl<T> Port<T> {
    /// Posts a frame to the other side.
    pub fn send(&self, msg: T) -> Result<(), BridgeError> {
        self.tx.send(msg).map_err(|_| BridgeError::ChannelClosed)
    }

    /// Receives the next frame, or `None` once the other side is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn split(self) -> (UnboundedSender<T>, UnboundedReceiver<T>) {
        (self.tx, self.rx)
    }
}
