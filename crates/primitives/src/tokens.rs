use alloy_primitives::{Address, address};
use serde::Serialize;

use crate::{NATIVE_TOKEN_ADDRESS, TESTNET_CHAIN_ID};

/// A token that can be used to pay transaction fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Erc20Token {
    pub address: Address,
    pub symbol: &'static str,
    pub decimals: u8,
}

impl Erc20Token {
    /// Whether this is the chain's native asset rather than an ERC-20 contract.
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

/// The chain's native asset, usable for fees on every chain.
pub const NATIVE_TOKEN: Erc20Token =
    Erc20Token { address: NATIVE_TOKEN_ADDRESS, symbol: "ETH", decimals: 18 };

const TESTNET_TOKENS: &[Erc20Token] = &[
    Erc20Token {
        address: address!("0xCf52587df5630b906a6D01d1789aEd10AEF83254"),
        symbol: "USDC",
        decimals: 6,
    },
    NATIVE_TOKEN,
    Erc20Token {
        address: address!("0xCECF7296e03F7753ADc58F39c647C90c5458259A"),
        symbol: "USDT",
        decimals: 6,
    },
    Erc20Token {
        address: address!("0xAd451F0bAf2a6aA7d8b3F97a4Bd504A9E8A78594"),
        symbol: "DAI",
        decimals: 18,
    },
];

/// Fee tokens known for `chain_id`. Unknown chains have none.
pub fn fee_tokens(chain_id: u64) -> &'static [Erc20Token] {
    match chain_id {
        TESTNET_CHAIN_ID => TESTNET_TOKENS,
        _ => &[],
    }
}

/// Looks up a fee token by address. The native asset resolves on any chain.
pub fn fee_token(chain_id: u64, address: Address) -> Option<Erc20Token> {
    if address == NATIVE_TOKEN_ADDRESS {
        return Some(NATIVE_TOKEN);
    }
    fee_tokens(chain_id).iter().find(|token| token.address == address).copied()
}
