//! Primitive types shared by both sides of the wallet bridge.
//!
//! The bridge signs account-abstraction transactions of type `0x71`, which carry their
//! paymaster parameters and signature override in an [`Eip712Meta`] block next to the usual
//! request fields.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod constants;
pub use constants::*;

mod error;
pub use error::TransactionError;

mod paymaster;
pub use paymaster::{IPaymasterFlow, PaymasterFlow};

mod tokens;
pub use tokens::{Erc20Token, NATIVE_TOKEN, fee_token, fee_tokens};

mod transaction;
pub use transaction::{Eip712Meta, PaymasterParams, TransactionRequest};
