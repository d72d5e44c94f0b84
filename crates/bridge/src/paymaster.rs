//! Fee resolution: who pays for a transaction and how much.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, Bytes, U256, utils::parse_units};
use async_trait::async_trait;
use wallet_bridge_config::{BridgeConfig, PaymasterStrategy};
use wallet_bridge_primitives::{
    DEFAULT_GAS_PER_PUBDATA_LIMIT, DEFAULT_GAS_PRICE, Erc20Token, PaymasterFlow, PaymasterParams,
    TransactionRequest, fee_token,
};

use crate::BridgeError;

/// The chain RPC calls fee resolution depends on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256, BridgeError>;

    async fn gas_price(&self) -> Result<U256, BridgeError>;
}

/// The fee a transaction will cost and the parameters that make a paymaster cover it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymasterQuote {
    /// `None` when the sender pays directly in the native asset.
    pub paymaster_params: Option<PaymasterParams>,
    pub fee_token: Option<Address>,
    pub estimated_fee: U256,
    pub minimal_allowance: U256,
}

/// A strategy for covering fees.
pub trait WalletPaymaster: Send + Sync + fmt::Debug {
    fn quote(&self, gas_price: U256, gas_limit: U256) -> PaymasterQuote;
}

/// Converts a gas-denominated fee into units of a token with `decimals` decimals.
///
/// `gas_price * gas_limit * 15 * 10^decimals / 10^18 * 20`, in integer arithmetic.
pub fn token_fee(gas_price: U256, gas_limit: U256, decimals: u8) -> U256 {
    let wei = U256::from(10u64).pow(U256::from(18u64));
    let unit = U256::from(10u64).pow(U256::from(decimals));
    gas_price * gas_limit * U256::from(15u64) * unit / wei * U256::from(20u64)
}

/// The sender pays in a fee token, through an approval-based paymaster unless the token is
/// the native asset.
#[derive(Clone, Debug)]
pub struct TokenFeePaymaster {
    paymaster: Option<Address>,
    token: Erc20Token,
    minimal_allowance: U256,
}

impl TokenFeePaymaster {
    /// `minimal_allowance` is given in whole token units, e.g. `"100.0"`.
    pub fn new(
        paymaster: Option<Address>,
        token: Erc20Token,
        minimal_allowance: &str,
    ) -> Result<Self, BridgeError> {
        if !token.is_native() && paymaster.is_none() {
            return Err(BridgeError::MissingPaymaster("token"));
        }
        let minimal_allowance = if token.is_native() {
            U256::ZERO
        } else {
            parse_units(minimal_allowance, token.decimals)?.get_absolute()
        };
        Ok(Self { paymaster, token, minimal_allowance })
    }

    pub fn token(&self) -> &Erc20Token {
        &self.token
    }
}

impl WalletPaymaster for TokenFeePaymaster {
    fn quote(&self, gas_price: U256, gas_limit: U256) -> PaymasterQuote {
        let paymaster = match self.paymaster {
            Some(paymaster) if !self.token.is_native() => paymaster,
            _ => {
                return PaymasterQuote {
                    paymaster_params: None,
                    fee_token: Some(self.token.address),
                    estimated_fee: gas_price * gas_limit,
                    minimal_allowance: U256::ZERO,
                };
            }
        };

        let flow = PaymasterFlow::ApprovalBased {
            token: self.token.address,
            minimal_allowance: self.minimal_allowance,
            inner_input: Bytes::new(),
        };
        PaymasterQuote {
            paymaster_params: Some(flow.into_params(paymaster)),
            fee_token: Some(self.token.address),
            estimated_fee: token_fee(gas_price, gas_limit, self.token.decimals),
            minimal_allowance: self.minimal_allowance,
        }
    }
}

/// A sponsor covers every fee.
#[derive(Clone, Debug)]
pub struct SubsidizingPaymaster {
    paymaster: Address,
}

impl SubsidizingPaymaster {
    pub fn new(paymaster: Address) -> Self {
        Self { paymaster }
    }
}

impl WalletPaymaster for SubsidizingPaymaster {
    fn quote(&self, _gas_price: U256, _gas_limit: U256) -> PaymasterQuote {
        PaymasterQuote {
            paymaster_params: Some(
                PaymasterFlow::General { inner_input: Bytes::new() }.into_params(self.paymaster),
            ),
            fee_token: None,
            estimated_fee: U256::ZERO,
            minimal_allowance: U256::ZERO,
        }
    }
}

/// Attaches fee parameters to transactions according to the configured strategy.
#[derive(Clone)]
pub struct FeeResolver {
    paymaster: Arc<dyn WalletPaymaster>,
    chain: Arc<dyn ChainClient>,
    gas_limit_adjustment: U256,
}

impl fmt::Debug for FeeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeResolver")
            .field("paymaster", &self.paymaster)
            .field("gas_limit_adjustment", &self.gas_limit_adjustment)
            .finish_non_exhaustive()
    }
}

impl FeeResolver {
    pub fn new(
        paymaster: Arc<dyn WalletPaymaster>,
        chain: Arc<dyn ChainClient>,
        gas_limit_adjustment: u64,
    ) -> Self {
        Self { paymaster, chain, gas_limit_adjustment: U256::from(gas_limit_adjustment) }
    }

    /// Builds the resolver for the strategy selected in `config`.
    pub fn from_config(config: &BridgeConfig, chain: Arc<dyn ChainClient>) -> Result<Self, BridgeError> {
        let settings = &config.paymaster;
        let paymaster: Arc<dyn WalletPaymaster> = match settings.strategy {
            PaymasterStrategy::TokenFee => {
                let token = fee_token(config.chain_id, settings.fee_token)
                    .ok_or(BridgeError::UnknownFeeToken(settings.fee_token))?;
                Arc::new(TokenFeePaymaster::new(
                    settings.token_paymaster,
                    token,
                    &settings.minimal_allowance,
                )?)
            }
            PaymasterStrategy::Subsidizing => Arc::new(SubsidizingPaymaster::new(
                settings.subsidizing_paymaster.ok_or(BridgeError::MissingPaymaster("subsidizing"))?,
            )),
        };
        Ok(Self::new(paymaster, chain, settings.gas_limit_adjustment))
    }

    /// Quotes `gas_limit` at the default gas price, without asking the chain.
    pub fn preview(&self, gas_limit: U256) -> PaymasterQuote {
        self.paymaster.quote(U256::from(DEFAULT_GAS_PRICE), gas_limit)
    }

    /// Resolves the fee of `tx` and attaches the paymaster parameters to it.
    ///
    /// A missing gas limit is estimated first. When parameters are attached to a transaction
    /// that had none, the gas limit grows by the configured adjustment.
    pub async fn enrich(&self, tx: &mut TransactionRequest) -> Result<PaymasterQuote, BridgeError> {
        let gas_limit = match tx.gas_limit {
            Some(gas_limit) => gas_limit,
            None => {
                let estimated = self.chain.estimate_gas(tx).await?;
                trace!(target: "bridge::paymaster", %estimated, "estimated gas");
                tx.gas_limit = Some(estimated);
                estimated
            }
        };
        let gas_price = self.chain.gas_price().await?;
        let quote = self.paymaster.quote(gas_price, gas_limit);

        if let Some(params) = &quote.paymaster_params {
            if tx.paymaster_params().is_none() {
                tx.gas_limit = Some(gas_limit + self.gas_limit_adjustment);
            }
            tx.set_paymaster_params(Some(params.clone()));
        }
        tx.max_fee_per_gas.get_or_insert(gas_price);
        tx.custom_data.gas_per_pubdata.get_or_insert(U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT));

        debug!(
            target: "bridge::paymaster",
            fee = %quote.estimated_fee,
            token = ?quote.fee_token,
            sponsored = quote.paymaster_params.is_some(),
            "resolved fee"
        );
        Ok(quote)
    }
}
