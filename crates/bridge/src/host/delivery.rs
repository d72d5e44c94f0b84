//! How a transaction reaches the approval UI and how the decision comes back.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use alloy_primitives::{Address, Bytes};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use wallet_bridge_primitives::PaymasterParams;

use super::popup::{PopupEvents, WALLET_PATH};
use crate::{BridgeError, platform::WindowEvent};

/// Tag carried by messages from the transaction approval view.
pub const TRANSACTION_VIEW: &str = "transactionView";

/// Where the approval UI lives, decided once when the host peer is built.
#[derive(Clone, Debug)]
pub enum TxDelivery {
    /// In a popup on the wallet origin.
    CrossWindow,
    /// On the current page, which is the wallet page itself.
    InWallet(LocalEventBus),
}

impl TxDelivery {
    /// Picks the delivery for a page at `path`.
    pub fn for_page(path: &str, bus: LocalEventBus) -> Self {
        if path == WALLET_PATH { Self::InWallet(bus) } else { Self::CrossWindow }
    }
}

/// The approval view's answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// `approved` or `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve_status: Option<String>,
    /// Signature produced while the approval view was still open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant_signature: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_input: Option<Bytes>,
}

impl ApprovalMessage {
    pub fn approved() -> Self {
        Self {
            from: Some(TRANSACTION_VIEW.to_string()),
            approve_status: Some("approved".to_string()),
            ..Default::default()
        }
    }

    pub fn rejected() -> Self {
        Self {
            from: Some(TRANSACTION_VIEW.to_string()),
            approve_status: Some("rejected".to_string()),
            ..Default::default()
        }
    }

    pub fn with_instant_signature(mut self, signature: Bytes) -> Self {
        self.instant_signature = Some(signature);
        self
    }

    pub fn with_paymaster(mut self, params: PaymasterParams) -> Self {
        self.paymaster_address = Some(params.paymaster);
        self.paymaster_input = Some(params.paymaster_input);
        self
    }

    fn is_approved(&self) -> bool {
        self.approve_status.as_deref() == Some("approved")
    }

    fn into_approval(self) -> TransactionApproval {
        let paymaster_params = self.paymaster_address.map(|paymaster| PaymasterParams {
            paymaster,
            paymaster_input: self.paymaster_input.unwrap_or_default(),
        });
        TransactionApproval { instant_signature: self.instant_signature, paymaster_params }
    }
}

/// An approved transaction, possibly already signed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionApproval {
    pub instant_signature: Option<Bytes>,
    /// Paymaster the user picked in the approval view, replacing the resolved one.
    pub paymaster_params: Option<PaymasterParams>,
}

/// Waits for the approval popup's answer.
///
/// Closing the popup after it loaded cancels, and so does a newer request taking the popup's
/// place. An unload before the first load is the popup's own navigation and is ignored.
pub(crate) async fn await_popup_approval(
    popup: PopupEvents,
) -> Result<TransactionApproval, BridgeError> {
    let PopupEvents { mut events, mut replaced } = popup;
    let mut armed = false;
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut replaced => {
                debug!(target: "bridge::popup", "approval popup replaced");
                return Err(BridgeError::NotApproved);
            }
            event = events.recv() => event,
        };
        let Some(event) = event else { break };
        match event {
            WindowEvent::Loaded => armed = true,
            WindowEvent::Unloaded if armed => {
                debug!(target: "bridge::popup", "approval popup closed");
                return Err(BridgeError::NotApproved);
            }
            WindowEvent::Unloaded => {
                trace!(target: "bridge::popup", "ignoring unload before load");
            }
            WindowEvent::Message(data) => {
                let msg = match serde_json::from_value::<ApprovalMessage>(data) {
                    Ok(msg) if msg.from.as_deref() == Some(TRANSACTION_VIEW) => msg,
                    _ => continue,
                };
                if !msg.is_approved() {
                    return Err(BridgeError::NotApproved);
                }
                return Ok(msg.into_approval());
            }
        }
    }
    Err(BridgeError::NotApproved)
}

/// A transaction handed to the in-wallet approval view.
///
/// The view answers with [`LocalEventBus::dispatch_tx_approved`] under the same `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingApproval {
    pub id: u64,
    pub serialized: Bytes,
}

type Listeners = Mutex<HashMap<u64, oneshot::Sender<ApprovalMessage>>>;

struct BusInner {
    listeners: Listeners,
    next_listener: AtomicU64,
    new_tx: broadcast::Sender<PendingApproval>,
}

/// Page-local events between the bridge and the wallet's own approval view.
#[derive(Clone)]
pub struct LocalEventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for LocalEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEventBus").field("listeners", &self.listener_count()).finish()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEventBus {
    pub fn new() -> Self {
        let (new_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(BusInner {
                listeners: Listeners::default(),
                next_listener: AtomicU64::new(0),
                new_tx,
            }),
        }
    }

    /// Transactions handed to the approval view.
    pub fn subscribe_new_tx(&self) -> broadcast::Receiver<PendingApproval> {
        self.inner.new_tx.subscribe()
    }

    pub(crate) fn dispatch_new_tx(&self, id: u64, serialized: Bytes) {
        if self.inner.new_tx.send(PendingApproval { id, serialized }).is_err() {
            warn!(target: "bridge::delivery", "no approval view is listening for transactions");
        }
    }

    /// Registers for the next `tx_approved` event. The registration ends when the returned
    /// listener resolves or is dropped.
    pub(crate) fn listen_tx_approved(&self) -> TxApprovedListener {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.listeners.lock().insert(id, tx);
        TxApprovedListener { bus: self.inner.clone(), id, rx }
    }

    /// Delivers the approval view's decision on request `id` to the caller waiting for it.
    ///
    /// Returns `false` when nobody waits on `id` anymore.
    pub fn dispatch_tx_approved(&self, id: u64, msg: ApprovalMessage) -> bool {
        let Some(listener) = self.inner.listeners.lock().remove(&id) else {
            debug!(target: "bridge::delivery", id, "decision for a request nobody waits on");
            return false;
        };
        trace!(target: "bridge::delivery", id, "tx_approved");
        listener.send(msg).is_ok()
    }

    /// Number of callers waiting for a decision.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// One registration for a `tx_approved` event.
pub(crate) struct TxApprovedListener {
    bus: Arc<BusInner>,
    id: u64,
    rx: oneshot::Receiver<ApprovalMessage>,
}

impl TxApprovedListener {
    /// Id the approval view answers under.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the decision. A missing status counts as approved, since the wallet page only
    /// reports rejections explicitly.
    pub(crate) async fn recv(mut self) -> Result<TransactionApproval, BridgeError> {
        let msg = (&mut self.rx).await.map_err(|_| BridgeError::NotApproved)?;
        match msg.approve_status.as_deref() {
            None | Some("approved") => Ok(msg.into_approval()),
            Some(_) => Err(BridgeError::NotApproved),
        }
    }
}

impl Drop for TxApprovedListener {
    fn drop(&mut self) {
        self.bus.listeners.lock().remove(&self.id);
    }
}
