//! Promise-style RPC over a [`Port`](crate::Port).
//!
//! Each side exposes named methods through a [`MethodHandler`] and calls the other side's
//! methods through an [`RpcChannel`]. Every call gets exactly one reply.

mod channel;
pub use channel::{ConnectionState, MethodHandler, RpcChannel};

mod error;
pub use error::{ErrorCode, RpcError};

mod message;
pub use message::RpcMessage;
