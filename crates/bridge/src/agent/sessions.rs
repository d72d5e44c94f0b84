use std::cmp::Reverse;

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use wallet_bridge_primitives::TransactionRequest;

use super::AgentClient;
use crate::{BridgeError, api::SessionCreationParams};

/// A delegated signing key and the recipients it may sign for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_address: Address,
    pub allowed_addresses: Vec<Address>,
    pub user_account: Address,
    /// Creation time in unix seconds, if the agent reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl SessionRecord {
    /// Whether this session may sign for `recipient`. Addresses compare by value, so the hex
    /// casing used on the wire does not matter.
    pub fn allows(&self, recipient: Address) -> bool {
        self.allowed_addresses.contains(&recipient)
    }
}

/// Picks the session to sign for `recipient` with.
///
/// The most recently created matching session wins. Sessions without a creation time rank
/// after dated ones, and ties keep the agent's order.
pub fn find_matching(sessions: &[SessionRecord], recipient: Address) -> Option<&SessionRecord> {
    sessions
        .iter()
        .enumerate()
        .filter(|(_, session)| session.allows(recipient))
        .min_by_key(|(index, session)| (Reverse(session.created_at), *index))
        .map(|(_, session)| session)
}

/// Session keys known to the background signing agent.
#[derive(Clone, Debug)]
pub struct SessionRegistry {
    agent: AgentClient,
}

impl SessionRegistry {
    pub fn new(agent: AgentClient) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &AgentClient {
        &self.agent
    }

    pub async fn sessions(&self, account: Address) -> Result<Vec<SessionRecord>, BridgeError> {
        self.agent.get_sessions(account).await
    }

    /// Signs `tx` with a session covering its recipient and returns the encoded transaction.
    ///
    /// Fails with [`BridgeError::NoSession`] when no session covers the recipient.
    pub async fn sign_with_session(
        &self,
        account: Address,
        tx: &TransactionRequest,
    ) -> Result<Bytes, BridgeError> {
        let recipient = tx.to.ok_or(BridgeError::NoSession)?;
        let digest = tx.signed_digest()?;

        let sessions = self.sessions(account).await?;
        let Some(session) = find_matching(&sessions, recipient) else {
            debug!(%recipient, known = sessions.len(), "no session covers recipient");
            return Err(BridgeError::NoSession);
        };

        trace!(session = %session.session_address, %digest, "requesting session signature");
        let signature =
            self.agent.get_session_signature(account, digest, session.session_address).await?;
        Ok(tx.clone().with_custom_signature(signature).serialize()?)
    }

    /// Asks the agent to create a session key and returns its public key.
    pub async fn create_session(
        &self,
        account: Address,
        params: SessionCreationParams,
    ) -> Result<String, BridgeError> {
        self.agent.create_session(account, params.allowed_addresses).await
    }

    pub async fn approve_session(
        &self,
        account: Address,
        session_pub_key: String,
    ) -> Result<bool, BridgeError> {
        self.agent.approve_session(account, session_pub_key).await
    }
}
