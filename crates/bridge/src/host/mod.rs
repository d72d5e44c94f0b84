//! The host peer: runs in the dapp page and drives the wallet frame and its popups.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use serde_json::Value;
use url::Url;
use wallet_bridge_primitives::TransactionRequest;

use crate::{
    ApprovalSurface, BridgeConfig, BridgeError, FeeResolver, PendingTransaction, Port,
    TransactionAuthorizer,
    agent::SessionRecord,
    api::{HostMethod, SessionCreationParams, WalletApi},
    paymaster::ChainClient,
    platform::WindowSystem,
    rpc::{MethodHandler, RpcChannel, RpcError},
};

mod delivery;
pub use delivery::{
    ApprovalMessage, LocalEventBus, PendingApproval, TRANSACTION_VIEW, TransactionApproval,
    TxDelivery,
};
pub(crate) use delivery::await_popup_approval;

mod popup;
pub use popup::{
    PopupEvents, PopupManager, PopupMode, PopupPurpose, PopupRequest, PopupWindowHandle,
    WALLET_PATH,
};

type LoginCallback = Box<dyn Fn(Address) + Send + Sync>;
type LogoutCallback = Box<dyn Fn() + Send + Sync>;

/// Serves the wallet's out-of-band notifications.
struct HostCallbacks {
    on_login: LoginCallback,
    on_logout: LogoutCallback,
}

#[async_trait]
impl MethodHandler for HostCallbacks {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match HostMethod::parse(method) {
            Some(HostMethod::OnLoginCompleted) => {
                let address: Address = serde_json::from_value(params)
                    .map_err(|err| RpcError::invalid_params(err.to_string()))?;
                debug!(target: "bridge::host", %address, "wallet reported login");
                (self.on_login)(address);
            }
            Some(HostMethod::OnLogoutCompleted) => {
                debug!(target: "bridge::host", "wallet reported logout");
                (self.on_logout)();
            }
            None => return Err(RpcError::method_not_found()),
        }
        Ok(Value::Null)
    }
}

struct Connection {
    wallet: WalletApi,
    // the channel only holds its handler weakly
    _callbacks: Arc<HostCallbacks>,
}

struct HostInner {
    origin: String,
    popups: PopupManager,
    delivery: TxDelivery,
    fees: FeeResolver,
    connection: OnceLock<Connection>,
}

/// Host side of the bridge.
#[derive(Clone)]
pub struct HostBridge {
    inner: Arc<HostInner>,
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("origin", &self.inner.origin)
            .field("connected", &self.inner.connection.get().is_some())
            .finish_non_exhaustive()
    }
}

impl HostBridge {
    pub fn new(
        config: &BridgeConfig,
        windows: Arc<dyn WindowSystem>,
        delivery: TxDelivery,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self, BridgeError> {
        let base: Url = config.wallet_url()?;
        let fees = FeeResolver::from_config(config, chain)?;
        let origin = windows.origin();
        let popups = PopupManager::new(windows, base, config.popup);
        Ok(Self {
            inner: Arc::new(HostInner {
                origin,
                popups,
                delivery,
                fees,
                connection: OnceLock::new(),
            }),
        })
    }

    /// Opens the channel to the wallet frame behind `port`.
    ///
    /// The callbacks may fire at any time, independently of pending calls. Only the first
    /// call has an effect.
    pub fn connect(
        &self,
        port: Port,
        on_login_completed: impl Fn(Address) + Send + Sync + 'static,
        on_logout_completed: impl Fn() + Send + Sync + 'static,
    ) {
        if self.inner.connection.get().is_some() {
            warn!(target: "bridge::host", "host bridge is already connected");
            return;
        }
        let callbacks = Arc::new(HostCallbacks {
            on_login: Box::new(on_login_completed),
            on_logout: Box::new(on_logout_completed),
        });
        let channel = RpcChannel::open(port, &callbacks);
        let connection = Connection { wallet: WalletApi::new(Arc::new(channel)), _callbacks: callbacks };
        if self.inner.connection.set(connection).is_err() {
            warn!(target: "bridge::host", "host bridge is already connected");
        }
    }

    fn wallet(&self) -> Option<&WalletApi> {
        self.inner.connection.get().map(|connection| &connection.wallet)
    }

    fn connected_wallet(&self) -> Result<&WalletApi, BridgeError> {
        self.wallet().ok_or(BridgeError::NotConnected)
    }

    pub fn popups(&self) -> &PopupManager {
        &self.inner.popups
    }

    /// Starts a login unless the wallet already reports an account.
    ///
    /// Completion arrives later through the login callback.
    pub async fn login(&self) -> Result<(), BridgeError> {
        if let Some(address) = self.get_address().await?
            && !address.is_zero()
        {
            trace!(target: "bridge::host", %address, "already logged in");
            return Ok(());
        }
        self.open_login_window()?;
        if let Some(wallet) = self.wallet() {
            wallet.login().await?;
        }
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), BridgeError> {
        self.connected_wallet()?.logout().await
    }

    pub fn open_login_window(&self) -> Result<(), BridgeError> {
        let request = PopupRequest::login(self.inner.origin.clone());
        self.inner.popups.open_or_focus(PopupPurpose::Login, &request).map(drop)
    }

    /// Opens the plain wallet view. Shares the login popup.
    pub fn open_wallet_window(&self) -> Result<(), BridgeError> {
        let request = PopupRequest::wallet(self.inner.origin.clone());
        self.inner.popups.open_or_focus(PopupPurpose::Login, &request).map(drop)
    }

    pub fn open_no_funds_error_window(&self) -> Result<(), BridgeError> {
        let request = PopupRequest::no_funds(self.inner.origin.clone());
        self.inner.popups.open_or_focus(PopupPurpose::NoFundsError, &request).map(drop)
    }

    /// Shows `serialized` for approval and waits for the user's decision.
    pub async fn open_transaction_window(
        &self,
        serialized: &Bytes,
    ) -> Result<TransactionApproval, BridgeError> {
        self.inner.request_approval(serialized).await
    }

    /// Authorizes and signs `tx`, returning the serialized signed transaction.
    pub async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes, BridgeError> {
        let wallet = self.connected_wallet()?.clone();
        let authorizer =
            TransactionAuthorizer::new(Arc::new(wallet), self.inner.fees.clone(), self.inner.clone());
        authorizer.authorize(PendingTransaction::new(tx)).await
    }

    /// Creates a session key and returns its public key.
    pub async fn create_session(&self, params: &SessionCreationParams) -> Result<String, BridgeError> {
        self.connected_wallet()?.create_session(params).await
    }

    pub async fn approve_session(&self, session_pub_key: &str) -> Result<bool, BridgeError> {
        self.connected_wallet()?.approve_session(session_pub_key).await
    }

    /// The wallet's account. `None` without a channel or a logged-in wallet.
    pub async fn get_address(&self) -> Result<Option<Address>, BridgeError> {
        match self.wallet() {
            Some(wallet) => wallet.get_address().await,
            None => Ok(None),
        }
    }

    /// The wallet's session keys. `None` without a channel.
    pub async fn get_local_sessions(&self) -> Result<Option<Vec<SessionRecord>>, BridgeError> {
        match self.wallet() {
            Some(wallet) => wallet.get_local_sessions().await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ApprovalSurface for HostInner {
    async fn request_approval(&self, serialized: &Bytes) -> Result<TransactionApproval, BridgeError> {
        match &self.delivery {
            TxDelivery::InWallet(bus) => {
                let listener = bus.listen_tx_approved();
                bus.dispatch_new_tx(listener.id(), serialized.clone());
                listener.recv().await
            }
            TxDelivery::CrossWindow => {
                let request = PopupRequest::transaction(self.origin.clone(), serialized.clone());
                let events = self.popups.open_fresh(PopupPurpose::Transaction, &request)?;
                await_popup_approval(events).await
            }
        }
    }
}
