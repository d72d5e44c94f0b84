use alloy_primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SessionRecord;

/// A command posted to the background signing agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Correlation id echoed by the matching [`AgentResponse`].
    pub id: Uuid,
    #[serde(flatten)]
    pub command: AgentCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentCommand {
    /// Whether the agent saw the user approve `tx_hash`.
    CheckApprove { tx_hash: B256 },
    GetSessions { user_account: Address },
    /// Asks a session key to sign `challenge`.
    GetSessionSignature { user_account: Address, challenge: B256, session_address: Address },
    CreateSession { user_account: Address, allowed_addresses: Vec<Address> },
    ApproveSession { user_account: Address, session_pub_key: String },
    /// Records the user's decision on `tx_hash`. Not answered.
    SetApprove { tx_hash: B256, is_approved: bool },
}

impl AgentCommand {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CheckApprove { .. } => "checkApprove",
            Self::GetSessions { .. } => "getSessions",
            Self::GetSessionSignature { .. } => "getSessionSignature",
            Self::CreateSession { .. } => "createSession",
            Self::ApproveSession { .. } => "approveSession",
            Self::SetApprove { .. } => "setApprove",
        }
    }
}

/// The agent's answer to an [`AgentRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub id: Uuid,
    #[serde(flatten)]
    pub reply: AgentReply,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requestType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentReply {
    CheckApprove { is_approved: bool },
    GetSessions { sessions: Vec<SessionRecord> },
    GetSessionSignature { challenge: B256, signature: Bytes },
    CreateSession { public_key: String },
    ApproveSession { success: bool },
    Error { message: String },
}

impl AgentReply {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CheckApprove { .. } => "checkApprove",
            Self::GetSessions { .. } => "getSessions",
            Self::GetSessionSignature { .. } => "getSessionSignature",
            Self::CreateSession { .. } => "createSession",
            Self::ApproveSession { .. } => "approveSession",
            Self::Error { .. } => "error",
        }
    }
}
