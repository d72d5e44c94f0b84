use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{mpsc::UnboundedSender, oneshot, watch},
    task::JoinHandle,
};

use super::{RpcError, RpcMessage};
use crate::{BridgeError, Port};

/// Lifecycle of an [`RpcChannel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the other side's handshake.
    Connecting,
    Connected,
    /// The other side went away. Terminal.
    Closed,
}

/// Serves the methods one side exposes to the other.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

type PendingCalls = Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>;

#[derive(Debug)]
struct Shared {
    state: watch::Sender<ConnectionState>,
    pending: PendingCalls,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            // closed is terminal
            if *state == next || *state == ConnectionState::Closed {
                return false;
            }
            *state = next;
            true
        });
    }
}

/// An established (or establishing) RPC channel to the other peer.
///
/// The channel owns a reader task that answers the handshake, routes replies to their pending
/// call and spawns one task per inbound call. The handler is held weakly so a peer can own
/// the channel that serves it. Dropping the channel stops the reader, which the other side
/// observes as [`ConnectionState::Closed`].
#[derive(Debug)]
pub struct RpcChannel {
    shared: Arc<Shared>,
    outbound: UnboundedSender<Value>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl RpcChannel {
    /// Starts listening on `port` and sends the opening handshake.
    pub fn open<H: MethodHandler>(port: Port, handler: &Arc<H>) -> Self {
        let (outbound, inbound) = port.split();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared { state, pending: Mutex::new(HashMap::new()) });
        let handler: Weak<dyn MethodHandler> = Arc::downgrade(handler) as Weak<dyn MethodHandler>;

        let _ = send_frame(&outbound, &RpcMessage::Syn);
        let reader = tokio::spawn(read_loop(inbound, outbound.clone(), shared.clone(), handler));

        Self { shared, outbound, next_id: AtomicU64::new(1), reader }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Waits for the handshake to complete.
    pub async fn connected(&self) -> Result<(), BridgeError> {
        let mut state = self.shared.state.subscribe();
        let connected = matches!(
            *state
                .wait_for(|state| *state != ConnectionState::Connecting)
                .await
                .map_err(|_| BridgeError::ChannelClosed)?,
            ConnectionState::Connected
        );
        if connected { Ok(()) } else { Err(BridgeError::ChannelClosed) }
    }

    /// Calls `method` on the other side and decodes its result.
    ///
    /// Waits for the connection first, so calls made during the handshake are never sent on a
    /// half-open channel.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, BridgeError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.connected().await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = serde_json::to_value(params)?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard { shared: &self.shared, id };

        if self.state() == ConnectionState::Closed {
            return Err(BridgeError::ChannelClosed);
        }

        trace!(target: "bridge::rpc", id, method, "call");
        send_frame(&self.outbound, &RpcMessage::Call { id, method: method.to_string(), params })?;

        let result = rx.await.map_err(|_| BridgeError::ChannelClosed)??;
        Ok(serde_json::from_value(result)?)
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending call if its future is dropped before the reply arrives.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

fn send_frame(outbound: &UnboundedSender<Value>, msg: &RpcMessage) -> Result<(), BridgeError> {
    let frame = serde_json::to_value(msg)?;
    outbound.send(frame).map_err(|_| BridgeError::ChannelClosed)
}

async fn read_loop(
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<Value>,
    outbound: UnboundedSender<Value>,
    shared: Arc<Shared>,
    handler: Weak<dyn MethodHandler>,
) {
    while let Some(frame) = inbound.recv().await {
        let msg = match serde_json::from_value::<RpcMessage>(frame) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(target: "bridge::rpc", %err, "dropping malformed frame");
                continue;
            }
        };

        match msg {
            RpcMessage::Syn => {
                let _ = send_frame(&outbound, &RpcMessage::Ack);
                shared.set_state(ConnectionState::Connected);
            }
            RpcMessage::Ack => shared.set_state(ConnectionState::Connected),
            RpcMessage::Call { id, method, params } => {
                let handler = handler.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    let outcome = match handler.upgrade() {
                        Some(handler) => handler.handle(&method, params).await,
                        None => Err(RpcError::method_not_found()),
                    };
                    if let Err(err) = &outcome {
                        debug!(target: "bridge::rpc", id, %method, %err, "call failed");
                    }
                    let _ = send_frame(&outbound, &RpcMessage::reply(id, outcome));
                });
            }
            RpcMessage::Reply { id, result, error } => {
                let Some(tx) = shared.pending.lock().remove(&id) else {
                    trace!(target: "bridge::rpc", id, "reply for unknown call");
                    continue;
                };
                let outcome = match error {
                    Some(err) => Err(err),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
        }
    }

    trace!(target: "bridge::rpc", "port closed");
    shared.set_state(ConnectionState::Closed);
    shared.pending.lock().clear();
}
