use std::borrow::Cow;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_rlp::{Encodable, Header};
use alloy_sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_GAS_PER_PUBDATA_LIMIT, EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION, EIP712_TX_TYPE,
    TransactionError,
};

mod eip712 {
    alloy_sol_types::sol! {
        struct Transaction {
            uint256 txType;
            uint256 from;
            uint256 to;
            uint256 gasLimit;
            uint256 gasPerPubdataByteLimit;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            uint256 paymaster;
            uint256 nonce;
            uint256 value;
            bytes data;
            bytes32[] factoryDeps;
            bytes paymasterInput;
        }
    }
}

/// Paymaster contract and the call data it should run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterParams {
    pub paymaster: Address,
    pub paymaster_input: Bytes,
}

/// Account-abstraction extension of a transaction request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_per_pubdata: Option<U256>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factory_deps: Vec<Bytes>,
    /// Signature produced by the account's validation logic. Overrides any ECDSA signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_signature: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_params: Option<PaymasterParams>,
}

/// A transaction on its way to being authorized.
///
/// Mirrors the JSON shape dapps hand to their provider, with the account-abstraction fields
/// nested under `customData`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub custom_data: Eip712Meta,
}

impl TransactionRequest {
    /// Sets the signature override, consuming and returning `self`.
    pub fn with_custom_signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.custom_data.custom_signature = Some(signature.into());
        self
    }

    /// Replaces the paymaster parameters.
    pub fn set_paymaster_params(&mut self, params: Option<PaymasterParams>) {
        self.custom_data.paymaster_params = params;
    }

    #[inline]
    pub fn paymaster_params(&self) -> Option<&PaymasterParams> {
        self.custom_data.paymaster_params.as_ref()
    }

    /// Gas per pubdata byte, falling back to [`DEFAULT_GAS_PER_PUBDATA_LIMIT`].
    pub fn gas_per_pubdata(&self) -> U256 {
        self.custom_data.gas_per_pubdata.unwrap_or(U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT))
    }

    /// Check if the keys needed to hash and encode this transaction are present, returning a
    /// list of keys that are missing.
    pub fn missing_keys(&self) -> Result<(), Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.chain_id.is_none() {
            missing.push("chain_id");
        }
        if self.from.is_none() {
            missing.push("from");
        }
        if missing.is_empty() { Ok(()) } else { Err(missing) }
    }

    fn required(&self) -> Result<(u64, Address), TransactionError> {
        match (self.chain_id, self.from) {
            (Some(chain_id), Some(from)) => Ok((chain_id, from)),
            _ => Err(TransactionError::MissingFields(self.missing_keys().err().unwrap_or_default())),
        }
    }

    /// The digest the account owner signs: the EIP-712 hash of the transaction under the
    /// chain's domain. The signature override is not part of the digest.
    pub fn signed_digest(&self) -> Result<B256, TransactionError> {
        let (chain_id, from) = self.required()?;
        if !self.custom_data.factory_deps.is_empty() {
            return Err(TransactionError::FactoryDepsUnsupported);
        }

        let max_fee_per_gas = self.max_fee_per_gas.unwrap_or_default();
        let paymaster = self.paymaster_params();
        let tx = eip712::Transaction {
            txType: U256::from(EIP712_TX_TYPE),
            from: address_to_uint(from),
            to: self.to.map(address_to_uint).unwrap_or_default(),
            gasLimit: self.gas_limit.unwrap_or_default(),
            gasPerPubdataByteLimit: self.gas_per_pubdata(),
            maxFeePerGas: max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas.unwrap_or(max_fee_per_gas),
            paymaster: paymaster.map(|p| address_to_uint(p.paymaster)).unwrap_or_default(),
            nonce: U256::from(self.nonce.unwrap_or_default()),
            value: self.value,
            data: self.data.clone(),
            factoryDeps: Vec::new(),
            paymasterInput: paymaster.map(|p| p.paymaster_input.clone()).unwrap_or_default(),
        };

        let domain = Eip712Domain::new(
            Some(Cow::Borrowed(EIP712_DOMAIN_NAME)),
            Some(Cow::Borrowed(EIP712_DOMAIN_VERSION)),
            Some(U256::from(chain_id)),
            None,
            None,
        );
        Ok(tx.eip712_signing_hash(&domain))
    }

    /// Encodes the transaction for submission: the type byte followed by the RLP field list.
    ///
    /// An unsigned transaction encodes an empty signature slot. A signature override that is
    /// present but empty is rejected.
    pub fn serialize(&self) -> Result<Bytes, TransactionError> {
        let (chain_id, from) = self.required()?;
        if self.custom_data.custom_signature.as_ref().is_some_and(|sig| sig.is_empty()) {
            return Err(TransactionError::EmptySignature);
        }

        let mut payload = Vec::new();
        self.nonce.unwrap_or_default().encode(&mut payload);
        self.max_priority_fee_per_gas.unwrap_or_default().encode(&mut payload);
        self.max_fee_per_gas.unwrap_or_default().encode(&mut payload);
        self.gas_limit.unwrap_or_default().encode(&mut payload);
        match self.to {
            Some(to) => to.encode(&mut payload),
            None => Bytes::new().encode(&mut payload),
        }
        self.value.encode(&mut payload);
        self.data.encode(&mut payload);
        // No ECDSA signature: chain id followed by empty r and s.
        chain_id.encode(&mut payload);
        Bytes::new().encode(&mut payload);
        Bytes::new().encode(&mut payload);
        chain_id.encode(&mut payload);
        from.encode(&mut payload);
        self.gas_per_pubdata().encode(&mut payload);
        self.custom_data.factory_deps.encode(&mut payload);
        self.custom_data.custom_signature.clone().unwrap_or_default().encode(&mut payload);
        match self.paymaster_params() {
            Some(params) => {
                let len = params.paymaster.length() + params.paymaster_input.length();
                Header { list: true, payload_length: len }.encode(&mut payload);
                params.paymaster.encode(&mut payload);
                params.paymaster_input.encode(&mut payload);
            }
            None => Header { list: true, payload_length: 0 }.encode(&mut payload),
        }

        let mut out = Vec::with_capacity(payload.len() + 4);
        out.push(EIP712_TX_TYPE);
        Header { list: true, payload_length: payload.len() }.encode(&mut out);
        out.extend_from_slice(&payload);
        Ok(out.into())
    }
}

fn address_to_uint(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}
