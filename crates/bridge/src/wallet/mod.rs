//! The wallet peer: runs in the wallet origin and holds signing authority.

use std::sync::{Arc, OnceLock};

use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use wallet_bridge_primitives::TransactionRequest;

use crate::{
    BridgeError, Port,
    agent::{AgentClient, SessionRecord, SessionRegistry},
    api::{HostApi, SessionCreationParams, WalletMethod},
    rpc::{MethodHandler, RpcChannel, RpcError},
    store::{NonSensitiveStore, NonSensitiveStoreExt, TRANSACTION_APPROVE_PREFIX},
};

pub mod auth;
pub mod credential;

use auth::{AuthProvider, CredentialSigner, LoginManager, ProgressSink, SavedAuth, StoredAuthProvider};

/// Wallet side of the bridge.
///
/// Cheap to clone; clones share the restored auth provider and the channel to the host.
#[derive(Clone)]
pub struct WalletBridge {
    inner: Arc<WalletInner>,
}

struct WalletInner {
    store: Arc<dyn NonSensitiveStore>,
    sessions: SessionRegistry,
    signer: Arc<dyn CredentialSigner>,
    provider: RwLock<Option<Arc<dyn AuthProvider>>>,
    host: OnceLock<HostApi>,
}

impl WalletBridge {
    pub fn new(
        store: Arc<dyn NonSensitiveStore>,
        agent: AgentClient,
        signer: Arc<dyn CredentialSigner>,
    ) -> Self {
        Self {
            inner: Arc::new(WalletInner {
                store,
                sessions: SessionRegistry::new(agent),
                signer,
                provider: RwLock::new(None),
                host: OnceLock::new(),
            }),
        }
    }

    /// Restores the saved login and opens the channel to the host.
    ///
    /// A returning user is reported to the host as logged in as soon as the handshake
    /// completes, without waiting for a new login.
    pub fn connect(&self, port: Port) {
        if self.inner.host.get().is_some() {
            warn!(target: "bridge::wallet", "wallet bridge is already connected");
            return;
        }
        let restored = self.inner.restore();
        let host = HostApi::new(RpcChannel::open(port, &self.inner));
        if self.inner.host.set(host).is_err() {
            warn!(target: "bridge::wallet", "wallet bridge is already connected");
            return;
        }

        if let Some(provider) = restored {
            let inner = self.inner.clone();
            let address = provider.address();
            tokio::spawn(async move { inner.notify_login(address).await });
        }
    }

    /// The logged-in account, if any.
    pub fn address(&self) -> Option<Address> {
        self.inner.provider().map(|provider| provider.address())
    }

    pub fn store(&self) -> &Arc<dyn NonSensitiveStore> {
        &self.inner.store
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Clears the saved login and tells the host.
    pub async fn log_out(&self) -> Result<(), BridgeError> {
        self.inner.log_out().await
    }

    pub async fn try_sign_using_session(
        &self,
        tx: &TransactionRequest,
    ) -> Result<Bytes, BridgeError> {
        self.inner.try_sign_using_session(tx).await
    }

    pub async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        self.inner.sign_transaction(tx).await
    }

    /// Records the user's decision on `digest`, locally and with the signing agent.
    pub fn record_approval(&self, digest: B256, approved: bool) -> Result<(), BridgeError> {
        self.inner.store.set_prefixed(
            TRANSACTION_APPROVE_PREFIX,
            &digest.to_string(),
            if approved { "true" } else { "false" },
        );
        self.inner.sessions.agent().set_approve(digest, approved)
    }

    /// Runs a login ceremony, persists its result and reports the new account to the host.
    pub async fn login_with(
        &self,
        manager: &dyn LoginManager,
        email: &str,
        progress: &ProgressSink,
    ) -> Result<Address, BridgeError> {
        let saved = manager.login(email, progress).await?;
        self.complete_login(saved).await
    }

    /// Runs a signup ceremony, persists its result and reports the new account to the host.
    pub async fn signup_with(
        &self,
        manager: &dyn LoginManager,
        email: &str,
        password: Option<&str>,
        progress: &ProgressSink,
    ) -> Result<Address, BridgeError> {
        let saved = manager.signup(email, password, progress).await?;
        self.complete_login(saved).await
    }

    async fn complete_login(&self, saved: SavedAuth) -> Result<Address, BridgeError> {
        saved.save(self.inner.store.as_ref(), true);
        let provider = self.inner.restore().ok_or(BridgeError::NotLoggedIn)?;
        let address = provider.address();
        debug!(target: "bridge::wallet", %address, auth_type = provider.auth_type().as_str(), "logged in");
        self.inner.notify_login(address).await;
        Ok(address)
    }
}

impl WalletInner {
    fn provider(&self) -> Option<Arc<dyn AuthProvider>> {
        self.provider.read().clone()
    }

    fn logged_in(&self) -> Result<Arc<dyn AuthProvider>, BridgeError> {
        self.provider().ok_or(BridgeError::NotLoggedIn)
    }

    /// Replaces the current provider with whatever the store holds.
    fn restore(&self) -> Option<Arc<dyn AuthProvider>> {
        let restored = StoredAuthProvider::restore(&self.store, &self.signer)
            .map(|provider| Arc::new(provider) as Arc<dyn AuthProvider>);
        *self.provider.write() = restored.clone();
        restored
    }

    async fn notify_login(&self, address: Address) {
        let Some(host) = self.host.get() else { return };
        if let Err(err) = host.on_login_completed(address).await {
            warn!(target: "bridge::wallet", %err, "failed to report login to host");
        }
    }

    async fn log_out(&self) -> Result<(), BridgeError> {
        let provider = self.provider.write().take();
        match provider {
            Some(provider) => provider.logout().await?,
            None => SavedAuth::clear(self.store.as_ref()),
        }
        if let Some(host) = self.host.get() {
            host.on_logout_completed().await?;
        }
        Ok(())
    }

    async fn try_sign_using_session(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        let provider = self.logged_in()?;
        self.sessions.sign_with_session(provider.address(), tx).await
    }

    /// Signs `tx` only if both the local approval flag and the signing agent say the user
    /// approved its digest.
    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        let provider = self.logged_in()?;
        let digest = tx.signed_digest()?;

        let locally_approved = self
            .store
            .get_prefixed(TRANSACTION_APPROVE_PREFIX, &digest.to_string())
            .is_some_and(|flag| flag == "true");
        let agent_approved = self.sessions.agent().check_approve(digest).await?;
        if !(locally_approved && agent_approved) {
            warn!(target: "bridge::wallet", %digest, locally_approved, agent_approved, "refusing to sign unapproved transaction");
            return Err(BridgeError::NotApproved);
        }

        let signature = provider.sign_transaction(digest).await?;
        Ok(tx.clone().with_custom_signature(signature).serialize()?)
    }

    async fn local_sessions(&self) -> Result<Vec<SessionRecord>, BridgeError> {
        let provider = self.logged_in()?;
        self.sessions.sessions(provider.address()).await
    }

    async fn dispatch(&self, method: WalletMethod, params: Value) -> Result<Value, BridgeError> {
        let result = match method {
            WalletMethod::Login => {
                self.restore();
                Value::Null
            }
            WalletMethod::Logout => {
                self.log_out().await?;
                Value::Null
            }
            WalletMethod::GetAddress => {
                serde_json::to_value(self.provider().map(|provider| provider.address()))?
            }
            WalletMethod::SignTransaction => {
                let tx: TransactionRequest = serde_json::from_value(params)?;
                serde_json::to_value(self.sign_transaction(&tx).await?)?
            }
            WalletMethod::TrySignUsingSession => {
                let tx: TransactionRequest = serde_json::from_value(params)?;
                serde_json::to_value(self.try_sign_using_session(&tx).await?)?
            }
            WalletMethod::CreateSession => {
                let params: SessionCreationParams = serde_json::from_value(params)?;
                let account = self.logged_in()?.address();
                serde_json::to_value(self.sessions.create_session(account, params).await?)?
            }
            WalletMethod::ApproveSession => {
                let session_pub_key: String = serde_json::from_value(params)?;
                let account = self.logged_in()?.address();
                serde_json::to_value(self.sessions.approve_session(account, session_pub_key).await?)?
            }
            WalletMethod::GetLocalSessions => serde_json::to_value(self.local_sessions().await?)?,
            WalletMethod::OnLoginCompletedParent => {
                if let Some(provider) = self.restore() {
                    self.notify_login(provider.address()).await;
                }
                Value::Null
            }
        };
        Ok(result)
    }
}

#[async_trait]
impl MethodHandler for WalletInner {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let Some(method) = WalletMethod::parse(method) else {
            return Err(RpcError::method_not_found());
        };
        trace!(target: "bridge::wallet", %method, "serving host call");
        self.dispatch(method, params).await.map_err(|err| err.to_rpc_error())
    }
}
