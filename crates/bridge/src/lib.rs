//! # Wallet bridge
//!
//! Connects a dapp page (the host) to a smart-account wallet running in an isolated origin,
//! and authorizes transactions across that boundary.
//!
//! ## Architecture
//!
//! - [`HostBridge`] runs in the dapp page. It owns the RPC channel to the wallet frame and the
//!   popups used for login and transaction approval.
//! - [`WalletBridge`] runs inside the wallet origin. It answers the host's calls, holds the
//!   restored auth provider and talks to the background signing agent.
//! - [`TransactionAuthorizer`] drives a transaction through session signing, fee enrichment
//!   and explicit approval, in that order.
//! - [`FeeResolver`] attaches paymaster parameters according to the configured strategy.
//!
//! Contexts never share memory. Everything crossing a context travels as JSON over a
//! [`Port`].

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

pub mod agent;
pub mod api;
pub mod host;
pub mod paymaster;
pub mod platform;
pub mod rpc;
pub mod store;
pub mod wallet;

mod error;
pub use error::BridgeError;

mod orchestrator;
pub use orchestrator::{ApprovalSurface, PendingTransaction, TransactionAuthorizer, WalletSigning};

mod port;
pub use port::{Port, pair};

pub use host::HostBridge;
pub use paymaster::FeeResolver;
pub use wallet::WalletBridge;

pub use wallet_bridge_config::{self as config, BridgeConfig};
pub use wallet_bridge_primitives as primitives;
