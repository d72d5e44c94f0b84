//! Error payloads carried by bridge replies.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// Failure reported by the peer that served a call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: Cow<'static, str>,
}

impl RpcError {
    /// An error carrying the default message of `code`.
    pub const fn new(code: ErrorCode) -> Self {
        Self { message: Cow::Borrowed(code.message()), code }
    }

    pub const fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidParams, message)
    }

    /// Catch-all for failures that have no dedicated code.
    pub fn internal_error_with(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, message)
    }

    fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: Cow::Owned(message.into()) }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code.message(), self.code.code(), self.message)
    }
}

impl std::error::Error for RpcError {}

/// Error codes understood by both peers. Travels as a bare integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// The user declined, as in EIP-1193 `4001`.
    UserRejected,
    /// No account is logged in on the wallet side.
    Unauthorized,
    /// No session key covers the request.
    NoSession,
    /// A popup could not be opened.
    WindowBlocked,
    /// Any code this side does not know.
    Other(i64),
}

impl ErrorCode {
    const KNOWN: [Self; 7] = [
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::InternalError,
        Self::UserRejected,
        Self::Unauthorized,
        Self::NoSession,
        Self::WindowBlocked,
    ];

    const fn describe(&self) -> (i64, &'static str) {
        match *self {
            Self::MethodNotFound => (-32601, "Method not found"),
            Self::InvalidParams => (-32602, "Invalid params"),
            Self::InternalError => (-32603, "Internal error"),
            Self::UserRejected => (4001, "Not approved"),
            Self::Unauthorized => (4100, "Not logged in"),
            Self::NoSession => (-32001, "No session"),
            Self::WindowBlocked => (-32002, "Window blocked"),
            Self::Other(code) => (code, "Unknown error"),
        }
    }

    pub const fn code(&self) -> i64 {
        self.describe().0
    }

    pub const fn message(&self) -> &'static str {
        self.describe().1
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self::KNOWN.into_iter().find(|known| known.code() == code).unwrap_or(Self::Other(code))
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}
