//! Typed surfaces of the two bridge peers.
//!
//! Every method takes a single JSON argument (`null` when it has none) and produces a single
//! JSON result.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use wallet_bridge_primitives::TransactionRequest;

use crate::{BridgeError, agent::SessionRecord, rpc::RpcChannel};

/// Methods the wallet peer serves to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WalletMethod {
    Login,
    Logout,
    GetAddress,
    SignTransaction,
    TrySignUsingSession,
    CreateSession,
    ApproveSession,
    GetLocalSessions,
    OnLoginCompletedParent,
}

impl WalletMethod {
    pub const ALL: [Self; 9] = [
        Self::Login,
        Self::Logout,
        Self::GetAddress,
        Self::SignTransaction,
        Self::TrySignUsingSession,
        Self::CreateSession,
        Self::ApproveSession,
        Self::GetLocalSessions,
        Self::OnLoginCompletedParent,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::GetAddress => "getAddress",
            Self::SignTransaction => "signTransaction",
            Self::TrySignUsingSession => "trySignUsingSession",
            Self::CreateSession => "createSession",
            Self::ApproveSession => "approveSession",
            Self::GetLocalSessions => "getLocalSessions",
            Self::OnLoginCompletedParent => "onLoginCompletedParent",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == method)
    }
}

impl fmt::Display for WalletMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods the host peer serves to the wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostMethod {
    OnLoginCompleted,
    OnLogoutCompleted,
}

impl HostMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OnLoginCompleted => "onLoginCompleted",
            Self::OnLogoutCompleted => "onLogoutCompleted",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        [Self::OnLoginCompleted, Self::OnLogoutCompleted].into_iter().find(|m| m.as_str() == method)
    }
}

/// Scope of a session key to create.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreationParams {
    pub allowed_addresses: Vec<Address>,
}

/// Host-side client for the wallet peer's methods.
#[derive(Clone, Debug)]
pub struct WalletApi {
    channel: Arc<RpcChannel>,
}

impl WalletApi {
    pub fn new(channel: Arc<RpcChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    pub async fn login(&self) -> Result<(), BridgeError> {
        self.channel.call(WalletMethod::Login.as_str(), ()).await
    }

    pub async fn logout(&self) -> Result<(), BridgeError> {
        self.channel.call(WalletMethod::Logout.as_str(), ()).await
    }

    pub async fn get_address(&self) -> Result<Option<Address>, BridgeError> {
        self.channel.call(WalletMethod::GetAddress.as_str(), ()).await
    }

    pub async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        self.channel.call(WalletMethod::SignTransaction.as_str(), tx).await
    }

    pub async fn try_sign_using_session(
        &self,
        tx: &TransactionRequest,
    ) -> Result<Bytes, BridgeError> {
        self.channel.call(WalletMethod::TrySignUsingSession.as_str(), tx).await
    }

    pub async fn create_session(
        &self,
        params: &SessionCreationParams,
    ) -> Result<String, BridgeError> {
        self.channel.call(WalletMethod::CreateSession.as_str(), params).await
    }

    pub async fn approve_session(&self, session_pub_key: &str) -> Result<bool, BridgeError> {
        self.channel.call(WalletMethod::ApproveSession.as_str(), session_pub_key).await
    }

    pub async fn get_local_sessions(&self) -> Result<Vec<SessionRecord>, BridgeError> {
        self.channel.call(WalletMethod::GetLocalSessions.as_str(), ()).await
    }

    pub async fn on_login_completed_parent(&self) -> Result<(), BridgeError> {
        self.channel.call(WalletMethod::OnLoginCompletedParent.as_str(), ()).await
    }
}

/// Wallet-side client for the host peer's callbacks.
#[derive(Debug)]
pub struct HostApi {
    channel: RpcChannel,
}

impl HostApi {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    pub async fn on_login_completed(&self, address: Address) -> Result<(), BridgeError> {
        self.channel.call(HostMethod::OnLoginCompleted.as_str(), address).await
    }

    pub async fn on_logout_completed(&self) -> Result<(), BridgeError> {
        self.channel.call(HostMethod::OnLogoutCompleted.as_str(), ()).await
    }
}
