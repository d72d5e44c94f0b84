//! The authorization cascade: session key first, explicit approval second.

use std::{fmt, sync::Arc};

use alloy_primitives::Bytes;
use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;
use wallet_bridge_primitives::TransactionRequest;

use crate::{BridgeError, FeeResolver, api::WalletApi, host::TransactionApproval};

/// The wallet peer's two signing paths, as seen from the host.
#[async_trait]
pub trait WalletSigning: Send + Sync {
    /// Signs with a session key covering the recipient, without asking the user.
    async fn try_sign_using_session(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError>;

    /// Signs a transaction the user already approved.
    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError>;
}

#[async_trait]
impl WalletSigning for WalletApi {
    async fn try_sign_using_session(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        Self::try_sign_using_session(self, tx).await
    }

    async fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, BridgeError> {
        Self::sign_transaction(self, tx).await
    }
}

/// Shows a serialized transaction to the user and reports their decision.
#[async_trait]
pub trait ApprovalSurface: Send + Sync {
    async fn request_approval(&self, serialized: &Bytes) -> Result<TransactionApproval, BridgeError>;
}

/// A transaction accepted for authorization.
///
/// Consumed by [`TransactionAuthorizer::authorize`], so one request is authorized at most once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTransaction {
    id: Uuid,
    request: TransactionRequest,
}

impl PendingTransaction {
    pub fn new(request: TransactionRequest) -> Self {
        Self { id: Uuid::new_v4(), request }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &TransactionRequest {
        &self.request
    }
}

/// Runs transactions through the cascade.
#[derive(Clone)]
pub struct TransactionAuthorizer {
    wallet: Arc<dyn WalletSigning>,
    fees: FeeResolver,
    approvals: Arc<dyn ApprovalSurface>,
}

impl fmt::Debug for TransactionAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionAuthorizer").field("fees", &self.fees).finish_non_exhaustive()
    }
}

impl TransactionAuthorizer {
    pub fn new(
        wallet: Arc<dyn WalletSigning>,
        fees: FeeResolver,
        approvals: Arc<dyn ApprovalSurface>,
    ) -> Self {
        Self { wallet, fees, approvals }
    }

    /// Authorizes `pending` and returns the signed, serialized transaction.
    ///
    /// 1. A session key covering the recipient signs silently.
    /// 2. Otherwise the fee is resolved and attached.
    /// 3. The user approves the enriched transaction, either signing it on the spot or leaving
    ///    the signature to one last call to the wallet.
    ///
    /// Any failure of the session attempt falls through to approval. A decline ends the
    /// cascade; nothing is retried.
    #[instrument(target = "bridge::cascade", skip_all, fields(id = %pending.id))]
    pub async fn authorize(&self, pending: PendingTransaction) -> Result<Bytes, BridgeError> {
        let PendingTransaction { request: mut tx, .. } = pending;

        match self.wallet.try_sign_using_session(&tx).await {
            Ok(signed) => {
                debug!(target: "bridge::cascade", "signed with session key");
                return Ok(signed);
            }
            Err(err) => debug!(target: "bridge::cascade", %err, "no session signature"),
        }

        self.fees.enrich(&mut tx).await?;
        let serialized = tx.serialize()?;

        let approval = self.approvals.request_approval(&serialized).await?;
        if let Some(params) = approval.paymaster_params {
            debug!(target: "bridge::cascade", paymaster = %params.paymaster, "paymaster picked in approval view");
            tx.set_paymaster_params(Some(params));
        }

        match approval.instant_signature {
            Some(signature) => {
                debug!(target: "bridge::cascade", "approved with instant signature");
                Ok(tx.with_custom_signature(signature).serialize()?)
            }
            None => self.wallet.sign_transaction(&tx).await,
        }
    }
}
