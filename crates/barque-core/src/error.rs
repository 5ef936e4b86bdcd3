use bitcoin::{Amount, Txid};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("fee estimate did not converge after {0} iterations")]
    FeeConvergence(usize),

    /// The transaction is unknown to the chain backend. During the unroll
    /// scan this is a protocol signal ("not yet broadcast"), not a fault.
    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("transaction {0} has no anchor output")]
    AnchorNotFound(Txid),

    /// A signature, input, leaf, or exit path expected by the protocol is
    /// missing at finalization time.
    #[error("invalid state: {0}")]
    State(String),

    #[error("broadcast rejected: {0}")]
    Broadcast(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Transport-level failures from the Explorer or Indexer HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
