use alloy_primitives::{Address, address};

/// Transaction type of account-abstraction transactions.
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Gas per pubdata byte used when a request does not specify one.
pub const DEFAULT_GAS_PER_PUBDATA_LIMIT: u64 = 50_000;

/// Gas price assumed by fee previews when the chain cannot be asked.
pub const DEFAULT_GAS_PRICE: u64 = 250_000_000;

/// Extra gas reserved for the paymaster validation step.
pub const PAYMASTER_GAS_LIMIT_ADJUSTMENT: u64 = 30_000;

/// Chain id of the testnet the bridge ships a fee-token table for.
pub const TESTNET_CHAIN_ID: u64 = 280;

/// Address of the native asset's system contract.
pub const NATIVE_TOKEN_ADDRESS: Address = address!("0x000000000000000000000000000000000000800A");

/// Name of the EIP-712 domain transactions are signed under.
pub const EIP712_DOMAIN_NAME: &str = "zkSync";

/// Version of the EIP-712 domain transactions are signed under.
pub const EIP712_DOMAIN_VERSION: &str = "2";
