//! Popups the host opens on the wallet origin, one live window per purpose.

use std::{collections::HashMap, fmt, sync::Arc};

use alloy_primitives::{Bytes, hex};
use parking_lot::Mutex;
use tokio::sync::{mpsc::UnboundedReceiver, oneshot};
use url::Url;
use wallet_bridge_config::PopupConfig;

use crate::{
    BridgeError,
    platform::{PopupWindow, WindowEvent, WindowFeatures, WindowSystem},
};

/// Path of the wallet page popups are opened on.
pub const WALLET_PATH: &str = "/wallet";

/// What a popup is for. Each purpose owns at most one live window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PopupPurpose {
    /// Login and the plain wallet view.
    Login,
    Transaction,
    NoFundsError,
}

/// Screen the wallet page shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PopupMode {
    Login,
    Transaction,
    ErrorNoFunds,
}

impl PopupMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Transaction => "transaction",
            Self::ErrorNoFunds => "error_no_funds",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "login" => Some(Self::Login),
            "transaction" => Some(Self::Transaction),
            "error_no_funds" => Some(Self::ErrorNoFunds),
            _ => None,
        }
    }
}

/// Query of a wallet popup URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopupRequest {
    /// `None` opens the plain wallet view.
    pub mode: Option<PopupMode>,
    /// Origin of the page that opened the popup.
    pub origin: Option<String>,
    /// Serialized transaction awaiting approval.
    pub transaction: Option<Bytes>,
    /// Set when the page runs as a popup rather than a full navigation.
    pub embedded: bool,
}

impl PopupRequest {
    pub fn login(origin: String) -> Self {
        Self { mode: Some(PopupMode::Login), origin: Some(origin), transaction: None, embedded: true }
    }

    pub fn wallet(origin: String) -> Self {
        Self { mode: None, origin: Some(origin), transaction: None, embedded: true }
    }

    pub fn transaction(origin: String, serialized: Bytes) -> Self {
        Self {
            mode: Some(PopupMode::Transaction),
            origin: Some(origin),
            transaction: Some(serialized),
            embedded: true,
        }
    }

    pub fn no_funds(origin: String) -> Self {
        Self {
            mode: Some(PopupMode::ErrorNoFunds),
            origin: Some(origin),
            transaction: None,
            embedded: true,
        }
    }

    /// The popup URL on the wallet origin `base`.
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_path(WALLET_PATH);
        url.set_fragment(None);
        url.set_query(None);
        {
            let mut query = url.query_pairs_mut();
            if let Some(origin) = &self.origin {
                query.append_pair("origin", origin);
            }
            if let Some(mode) = self.mode {
                query.append_pair("mode", mode.as_str());
            }
            if let Some(tx) = &self.transaction {
                query.append_pair("tx", &hex::encode_prefixed(tx));
            }
            if self.embedded {
                query.append_pair("embedded", "true");
            }
        }
        url
    }

    /// Reads the request back on the wallet page.
    pub fn from_url(url: &Url) -> Result<Self, BridgeError> {
        if url.path() != WALLET_PATH {
            return Err(BridgeError::InvalidPopupUrl(format!("unexpected path {}", url.path())));
        }
        let mut request = Self::default();
        for (key, value) in url.query_pairs() {
            match &*key {
                "origin" => request.origin = Some(value.into_owned()),
                "mode" => {
                    request.mode = Some(PopupMode::parse(&value).ok_or_else(|| {
                        BridgeError::InvalidPopupUrl(format!("unknown mode {value}"))
                    })?)
                }
                "tx" => {
                    let tx = hex::decode(&*value)
                        .map_err(|err| BridgeError::InvalidPopupUrl(format!("tx: {err}")))?;
                    request.transaction = Some(tx.into());
                }
                "embedded" => request.embedded = value == "true",
                _ => {}
            }
        }
        if request.mode == Some(PopupMode::Transaction) && request.transaction.is_none() {
            return Err(BridgeError::InvalidPopupUrl("transaction mode without tx".into()));
        }
        Ok(request)
    }
}

/// A popup owned by the host for one purpose.
#[derive(Clone, Debug)]
pub struct PopupWindowHandle {
    purpose: PopupPurpose,
    window: Arc<dyn PopupWindow>,
}

impl PopupWindowHandle {
    pub fn purpose(&self) -> PopupPurpose {
        self.purpose
    }

    pub fn window(&self) -> &Arc<dyn PopupWindow> {
        &self.window
    }

    pub fn is_live(&self) -> bool {
        !self.window.is_closed()
    }
}

/// What a freshly opened popup reports to whoever waits on it.
#[derive(Debug)]
pub struct PopupEvents {
    pub events: UnboundedReceiver<WindowEvent>,
    /// Resolves once the popup no longer owns its slot, loaded or not.
    pub replaced: oneshot::Receiver<()>,
}

#[derive(Debug)]
struct Slot {
    handle: PopupWindowHandle,
    replaced: oneshot::Sender<()>,
}

type Slots = Mutex<HashMap<PopupPurpose, Slot>>;

/// Opens, focuses and replaces the host's popups.
///
/// Handles are replaced on reopen, never reused for a different window.
pub struct PopupManager {
    windows: Arc<dyn WindowSystem>,
    base: Url,
    size: PopupConfig,
    slots: Arc<Slots>,
}

impl fmt::Debug for PopupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopupManager")
            .field("base", &self.base.as_str())
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl PopupManager {
    pub fn new(windows: Arc<dyn WindowSystem>, base: Url, size: PopupConfig) -> Self {
        let slots = Arc::new(Slots::default());

        // popups must not outlive the page that opened them
        let weak = Arc::downgrade(&slots);
        windows.on_page_unload(Box::new(move || {
            let Some(slots) = weak.upgrade() else { return };
            for slot in slots.lock().values() {
                if slot.handle.is_live() {
                    slot.handle.window.close();
                }
            }
        }));

        Self { windows, base, size, slots }
    }

    /// The live popup for `purpose`, if any.
    pub fn handle(&self, purpose: PopupPurpose) -> Option<PopupWindowHandle> {
        self.slots
            .lock()
            .get(&purpose)
            .map(|slot| &slot.handle)
            .filter(|handle| handle.is_live())
            .cloned()
    }

    /// Focuses the live popup for `purpose`, or opens a new one.
    ///
    /// Returns the new window's events, or `None` when an existing window was focused.
    pub fn open_or_focus(
        &self,
        purpose: PopupPurpose,
        request: &PopupRequest,
    ) -> Result<Option<PopupEvents>, BridgeError> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&purpose).filter(|slot| slot.handle.is_live()) {
            trace!(target: "bridge::popup", ?purpose, "focusing open popup");
            slot.handle.window.focus();
            return Ok(None);
        }
        self.open_into(&mut slots, purpose, request).map(Some)
    }

    /// Closes any popup open for `purpose` and opens a fresh one.
    ///
    /// Whoever waits on the evicted popup is told through [`PopupEvents::replaced`], even when
    /// the window never finished loading and so never reports an unload.
    pub fn open_fresh(
        &self,
        purpose: PopupPurpose,
        request: &PopupRequest,
    ) -> Result<PopupEvents, BridgeError> {
        let mut slots = self.slots.lock();
        if let Some(stale) = slots.remove(&purpose) {
            if stale.handle.is_live() {
                debug!(target: "bridge::popup", ?purpose, "closing stale popup");
                stale.handle.window.close();
            }
            let _ = stale.replaced.send(());
        }
        self.open_into(&mut slots, purpose, request)
    }

    fn open_into(
        &self,
        slots: &mut HashMap<PopupPurpose, Slot>,
        purpose: PopupPurpose,
        request: &PopupRequest,
    ) -> Result<PopupEvents, BridgeError> {
        let url = request.to_url(&self.base);
        let features =
            WindowFeatures::centered(self.windows.screen(), self.size.width, self.size.height);
        let Some(opened) = self.windows.open(&url, &features) else {
            warn!(target: "bridge::popup", ?purpose, "popup blocked");
            return Err(BridgeError::WindowBlocked);
        };
        debug!(target: "bridge::popup", ?purpose, %url, "opened popup");

        let (replaced_tx, replaced) = oneshot::channel();
        let handle = PopupWindowHandle { purpose, window: opened.window };
        // dropping a previous slot's sender settles its waiter too
        slots.insert(purpose, Slot { handle, replaced: replaced_tx });
        Ok(PopupEvents { events: opened.events, replaced })
    }
}
