//! Chain and protocol data providers.
//!
//! Defines the [`Explorer`] and [`Indexer`] traits the core consumes and
//! provides HTTP implementations ([`EsploraClient`], [`ArkIndexerClient`])
//! plus test mocks (`mock::MockProvider`).

mod esplora;
mod indexer;
#[cfg(test)]
pub mod mock;

pub use esplora::EsploraClient;
pub use indexer::ArkIndexerClient;

use async_trait::async_trait;
use bitcoin::{Address, OutPoint, Txid};

use crate::error::CoreError;
use crate::types::{ChainTip, ChainTx, Coin, CoinStatus};

/// Blockchain explorer surface the core needs.
///
/// Implementations are expected to handle connection management and
/// response deserialization internally.
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Confirmation status of a transaction. A transaction unknown to the
    /// backend fails with [`CoreError::TxNotFound`]; the unroll scan
    /// reinterprets that as "not yet broadcast" rather than a fault.
    async fn tx_status(&self, txid: &Txid) -> Result<CoinStatus, CoreError>;

    /// Current next-block fee rate in sat/vbyte.
    async fn fee_rate(&self) -> Result<u64, CoreError>;

    /// Broadcast a single transaction hex, or a two-element
    /// `[parent, child]` package. Returns the (last) submitted txid.
    async fn broadcast(&self, txs: &[String]) -> Result<Txid, CoreError>;

    /// Unspent coins paying to `address`.
    async fn coins(&self, address: &Address) -> Result<Vec<Coin>, CoreError>;

    /// Current chain tip height and block time.
    async fn chain_tip(&self) -> Result<ChainTip, CoreError>;
}

/// Ark protocol indexer surface the core needs.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// The full ancestry chain of a VTXO, ordered leaf (index 0) to root.
    async fn vtxo_chain(&self, outpoint: &OutPoint) -> Result<Vec<ChainTx>, CoreError>;

    /// Off-chain transaction content for the given txids, as base64 PSBTs,
    /// in request order.
    async fn virtual_txs(&self, txids: &[Txid]) -> Result<Vec<String>, CoreError>;
}
