//! Client for the background signing agent.
//!
//! The agent is a long-lived worker shared by every wallet page of the origin. Requests carry
//! a fresh correlation id and a single reader routes each response to the one request with
//! that id, so concurrent requests of the same kind cannot answer each other.

use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, B256, Bytes};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    sync::{mpsc::UnboundedSender, oneshot},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{BridgeError, Port};

mod messages;
pub use messages::{AgentCommand, AgentReply, AgentRequest, AgentResponse};

mod sessions;
pub use sessions::{SessionRecord, SessionRegistry, find_matching};

type PendingReplies = Arc<Mutex<HashMap<Uuid, oneshot::Sender<AgentReply>>>>;

#[derive(Debug)]
struct AgentInner {
    outbound: UnboundedSender<Value>,
    pending: PendingReplies,
    reader: JoinHandle<()>,
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Handle to the background signing agent's message bus.
#[derive(Clone, Debug)]
pub struct AgentClient {
    inner: Arc<AgentInner>,
}

impl AgentClient {
    /// Starts demultiplexing responses arriving on `port`.
    pub fn new(port: Port) -> Self {
        let (outbound, mut inbound) = port.split();
        let pending = PendingReplies::default();

        let reader = tokio::spawn({
            let pending = pending.clone();
            async move {
                while let Some(frame) = inbound.recv().await {
                    let response = match serde_json::from_value::<AgentResponse>(frame) {
                        Ok(response) => response,
                        Err(err) => {
                            warn!(target: "bridge::agent", %err, "dropping malformed agent message");
                            continue;
                        }
                    };
                    let Some(tx) = pending.lock().remove(&response.id) else {
                        trace!(target: "bridge::agent", id = %response.id, "response for settled request");
                        continue;
                    };
                    let _ = tx.send(response.reply);
                }
                trace!(target: "bridge::agent", "agent bus closed");
                pending.lock().clear();
            }
        });

        Self { inner: Arc::new(AgentInner { outbound, pending, reader }) }
    }

    /// Sends `command` and waits for the response carrying the same correlation id.
    pub async fn request(&self, command: AgentCommand) -> Result<AgentReply, BridgeError> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);
        let _guard = PendingGuard { pending: &self.inner.pending, id };

        trace!(target: "bridge::agent", %id, command = command.name(), "request");
        self.post(AgentRequest { id, command })?;

        match rx.await.map_err(|_| BridgeError::AgentUnavailable)? {
            AgentReply::Error { message } => Err(BridgeError::Agent(message)),
            reply => Ok(reply),
        }
    }

    /// Sends `command` without waiting for an answer.
    pub fn notify(&self, command: AgentCommand) -> Result<(), BridgeError> {
        self.post(AgentRequest { id: Uuid::new_v4(), command })
    }

    fn post(&self, request: AgentRequest) -> Result<(), BridgeError> {
        let frame = serde_json::to_value(&request)?;
        self.inner.outbound.send(frame).map_err(|_| BridgeError::AgentUnavailable)
    }

    pub async fn check_approve(&self, tx_hash: B256) -> Result<bool, BridgeError> {
        match self.request(AgentCommand::CheckApprove { tx_hash }).await? {
            AgentReply::CheckApprove { is_approved } => Ok(is_approved),
            other => Err(unexpected("checkApprove", &other)),
        }
    }

    pub async fn get_sessions(&self, user_account: Address) -> Result<Vec<SessionRecord>, BridgeError> {
        match self.request(AgentCommand::GetSessions { user_account }).await? {
            AgentReply::GetSessions { sessions } => Ok(sessions),
            other => Err(unexpected("getSessions", &other)),
        }
    }

    /// Has `session_address` sign `challenge`. The echoed challenge must match byte for byte.
    pub async fn get_session_signature(
        &self,
        user_account: Address,
        challenge: B256,
        session_address: Address,
    ) -> Result<Bytes, BridgeError> {
        let command = AgentCommand::GetSessionSignature { user_account, challenge, session_address };
        match self.request(command).await? {
            AgentReply::GetSessionSignature { challenge: echoed, signature } => {
                if echoed != challenge {
                    return Err(BridgeError::ChallengeMismatch);
                }
                Ok(signature)
            }
            other => Err(unexpected("getSessionSignature", &other)),
        }
    }

    pub async fn create_session(
        &self,
        user_account: Address,
        allowed_addresses: Vec<Address>,
    ) -> Result<String, BridgeError> {
        match self.request(AgentCommand::CreateSession { user_account, allowed_addresses }).await? {
            AgentReply::CreateSession { public_key } => Ok(public_key),
            other => Err(unexpected("createSession", &other)),
        }
    }

    pub async fn approve_session(
        &self,
        user_account: Address,
        session_pub_key: String,
    ) -> Result<bool, BridgeError> {
        match self.request(AgentCommand::ApproveSession { user_account, session_pub_key }).await? {
            AgentReply::ApproveSession { success } => Ok(success),
            other => Err(unexpected("approveSession", &other)),
        }
    }

    /// Records the user's decision on `tx_hash` with the agent.
    pub fn set_approve(&self, tx_hash: B256, is_approved: bool) -> Result<(), BridgeError> {
        self.notify(AgentCommand::SetApprove { tx_hash, is_approved })
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

fn unexpected(expected: &'static str, got: &AgentReply) -> BridgeError {
    BridgeError::UnexpectedReply { expected, got: got.name() }
}

struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}
