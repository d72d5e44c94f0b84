use alloy_primitives::{Address, utils::UnitsError};
use wallet_bridge_primitives::TransactionError;

use crate::rpc::{ErrorCode, RpcError};

/// Errors surfaced by the bridge peers and the authorization cascade.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No local session may sign for the transaction's recipient.
    #[error("No session")]
    NoSession,
    /// The user declined, closed the approval popup, or the approval could not be confirmed.
    #[error("Not approved")]
    NotApproved,
    /// The browser refused to open a popup.
    #[error("Window blocked")]
    WindowBlocked,
    #[error("bridge is not connected")]
    NotConnected,
    #[error("bridge channel closed")]
    ChannelClosed,
    #[error("no wallet is logged in")]
    NotLoggedIn,
    #[error("background signing agent is unavailable")]
    AgentUnavailable,
    #[error("signing agent replied with {got} to a {expected} request")]
    UnexpectedReply { expected: &'static str, got: &'static str },
    #[error("signing agent echoed a different challenge")]
    ChallengeMismatch,
    #[error("signing agent error: {0}")]
    Agent(String),
    #[error("Unsupported algo {0}")]
    UnsupportedAlgorithm(i64),
    #[error("invalid popup url: {0}")]
    InvalidPopupUrl(String),
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("no {0} paymaster address configured")]
    MissingPaymaster(&'static str),
    #[error("unknown fee token {0}")]
    UnknownFeeToken(Address),
    #[error("chain client error: {0}")]
    Chain(String),
    #[error("signer error: {0}")]
    Signer(String),
    #[error(transparent)]
    Remote(RpcError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Units(#[from] UnitsError),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl BridgeError {
    /// Whether the user declined, as opposed to something breaking.
    pub fn is_user_declined(&self) -> bool {
        matches!(self, Self::NotApproved)
    }

    /// Converts the error into the payload sent back over the bridge channel.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::NotApproved => RpcError::new(ErrorCode::UserRejected),
            Self::NoSession => RpcError::new(ErrorCode::NoSession),
            Self::NotLoggedIn => RpcError::new(ErrorCode::Unauthorized),
            Self::WindowBlocked => RpcError::new(ErrorCode::WindowBlocked),
            Self::Remote(err) => err.clone(),
            Self::Json(err) => RpcError::invalid_params(err.to_string()),
            err => RpcError::internal_error_with(err.to_string()),
        }
    }
}

impl From<RpcError> for BridgeError {
    fn from(err: RpcError) -> Self {
        match err.code {
            ErrorCode::UserRejected => Self::NotApproved,
            ErrorCode::NoSession => Self::NoSession,
            ErrorCode::Unauthorized => Self::NotLoggedIn,
            ErrorCode::WindowBlocked => Self::WindowBlocked,
            _ => Self::Remote(err),
        }
    }
}
