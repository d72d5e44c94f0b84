/// Errors produced while hashing or encoding a [`TransactionRequest`](crate::TransactionRequest).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("empty signatures are not supported")]
    EmptySignature,
    #[error("factory dependencies are not supported")]
    FactoryDepsUnsupported,
}
