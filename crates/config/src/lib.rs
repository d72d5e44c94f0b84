//! Wallet bridge configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. [`BridgeConfig::default`]
//! 2. `bridge.toml` in the working directory
//! 3. `WALLET_BRIDGE_*` environment variables, with `__` separating nested keys
//!    (`WALLET_BRIDGE_POPUP__WIDTH=500`)

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

use alloy_primitives::Address;
use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map},
};
use serde::{Deserialize, Serialize};
use url::Url;
use wallet_bridge_primitives::{
    NATIVE_TOKEN_ADDRESS, PAYMASTER_GAS_LIMIT_ADJUSTMENT, TESTNET_CHAIN_ID,
};

mod error;
pub use error::ExtractConfigError;

/// Configuration shared by the host and wallet peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Origin serving the wallet pages. Popups open against its `/wallet` path.
    pub wallet_url: String,
    pub chain_id: u64,
    pub popup: PopupConfig,
    pub paymaster: PaymasterConfig,
}

/// Size of the popups opened by the host peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self { width: 400, height: 650 }
    }
}

/// Which paymaster strategy covers transaction fees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymasterStrategy {
    /// The sender pays in the configured fee token.
    #[default]
    TokenFee,
    /// A sponsor pays every fee.
    Subsidizing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymasterConfig {
    pub strategy: PaymasterStrategy,
    /// Token fees are paid in. Defaults to the native asset.
    pub fee_token: Address,
    pub token_paymaster: Option<Address>,
    pub subsidizing_paymaster: Option<Address>,
    /// Allowance the token paymaster must hold, in whole token units.
    pub minimal_allowance: String,
    /// Gas added to the limit once paymaster parameters are attached.
    pub gas_limit_adjustment: u64,
}

impl Default for PaymasterConfig {
    fn default() -> Self {
        Self {
            strategy: PaymasterStrategy::TokenFee,
            fee_token: NATIVE_TOKEN_ADDRESS,
            token_paymaster: None,
            subsidizing_paymaster: None,
            minimal_allowance: "100.0".to_string(),
            gas_limit_adjustment: PAYMASTER_GAS_LIMIT_ADJUSTMENT,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wallet_url: "http://localhost:3000".to_string(),
            chain_id: TESTNET_CHAIN_ID,
            popup: PopupConfig::default(),
            paymaster: PaymasterConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// File name of the optional config file.
    pub const FILE_NAME: &'static str = "bridge.toml";

    /// Prefix of environment variables overriding config values.
    pub const ENV_PREFIX: &'static str = "WALLET_BRIDGE_";

    /// Returns the default figment: defaults, then `bridge.toml`, then the environment.
    pub fn figment() -> Figment {
        Figment::from(Self::default())
            .merge(Toml::file(Self::FILE_NAME))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    /// Parses [`Self::wallet_url`].
    pub fn wallet_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.wallet_url)
    }

    /// Loads the config from the default figment.
    pub fn load() -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment())
    }

    /// Attempts to extract a `BridgeConfig` from `provider`.
    pub fn try_from<T: Provider>(provider: T) -> Result<Self, ExtractConfigError> {
        trace!("load config with provider: {:?}", provider.metadata());
        Figment::from(provider).extract().map_err(ExtractConfigError::new)
    }
}

impl Provider for BridgeConfig {
    fn metadata(&self) -> Metadata {
        Metadata::named("Wallet Bridge Config")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
