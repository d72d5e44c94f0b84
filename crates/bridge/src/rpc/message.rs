use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RpcError;

/// A frame on the bridge channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RpcMessage {
    /// Sent by both peers when they start listening.
    Syn,
    /// Answer to a [`RpcMessage::Syn`].
    Ack,
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
}

impl RpcMessage {
    pub(crate) fn reply(id: u64, outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::Reply { id, result: Some(result), error: None },
            Err(error) => Self::Reply { id, result: None, error: Some(error) },
        }
    }
}
