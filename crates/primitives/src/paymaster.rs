use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, sol};

use crate::PaymasterParams;

sol! {
    /// Flows a paymaster contract can be asked to run before validating a transaction.
    #[derive(Debug, PartialEq, Eq)]
    interface IPaymasterFlow {
        function general(bytes calldata input) external;
        function approvalBased(address token, uint256 minAllowance, bytes calldata innerInput) external;
    }
}

/// How a paymaster is expected to cover the fee of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymasterFlow {
    /// The paymaster sponsors the transaction unconditionally.
    General { inner_input: Bytes },
    /// The sender pays the paymaster in `token`, which must be approved for at least
    /// `minimal_allowance`.
    ApprovalBased { token: Address, minimal_allowance: U256, inner_input: Bytes },
}

impl PaymasterFlow {
    /// ABI-encoded call data handed to the paymaster.
    pub fn encode_input(&self) -> Bytes {
        match self {
            Self::General { inner_input } => {
                IPaymasterFlow::generalCall { input: inner_input.clone() }.abi_encode().into()
            }
            Self::ApprovalBased { token, minimal_allowance, inner_input } => {
                IPaymasterFlow::approvalBasedCall {
                    token: *token,
                    minAllowance: *minimal_allowance,
                    innerInput: inner_input.clone(),
                }
                .abi_encode()
                .into()
            }
        }
    }

    /// Builds the parameters attached to a transaction for `paymaster`.
    pub fn into_params(self, paymaster: Address) -> PaymasterParams {
        PaymasterParams { paymaster, paymaster_input: self.encode_input() }
    }
}
