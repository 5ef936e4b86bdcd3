//! Domain types for Barque's coin and VTXO model.
//!
//! Contains the on-chain coin types (`Coin`, `CoinStatus`), the virtual
//! coin type (`VirtualCoin`), the VTXO ancestry chain node (`ChainTx`),
//! and chain tip / confirmation status snapshots.

use bitcoin::{Amount, BlockHash, OutPoint, Txid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// On-chain Coins
// ==============================================================================

/// A plain on-chain UTXO as reported by the chain explorer.
///
/// Immutable once observed; set membership changes only by re-querying
/// the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub status: CoinStatus,
}

/// Confirmation status of a coin or transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinStatus {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_hash: Option<BlockHash>,
    pub block_time: Option<u64>,
}

impl CoinStatus {
    pub fn unconfirmed() -> Self {
        Self::default()
    }

    pub fn confirmed_at(height: u32, time: u64) -> Self {
        Self {
            confirmed: true,
            block_height: Some(height),
            block_hash: None,
            block_time: Some(time),
        }
    }
}

// ==============================================================================
// Virtual Coins (VTXOs)
// ==============================================================================

/// A protocol-issued virtual coin: an off-chain output bound to a
/// commitment structure, redeemable on-chain via a timelocked script path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualCoin {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub status: CoinStatus,
    /// Tap-tree descriptor of the VTXO script; decoded by an external
    /// script library (see [`crate::script::ScriptDecoder`]).
    pub script: String,
    pub expires_at: Option<u64>,
    pub is_preconfirmed: bool,
    pub is_swept: bool,
    /// `true` once every node of the VTXO's ancestry chain is on-chain.
    pub is_unrolled: bool,
    pub is_spent: bool,
    pub commitment_txids: Vec<Txid>,
}

// ==============================================================================
// VTXO Ancestry Chain
// ==============================================================================

/// Role of one node in a VTXO's ancestry chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainTxKind {
    Commitment,
    Tree,
    Ark,
    Checkpoint,
    /// Catch-all for node types this client does not know; treated like
    /// COMMITMENT (always on-chain, never broadcast by us).
    #[serde(other)]
    Unspecified,
}

impl ChainTxKind {
    /// COMMITMENT and UNSPECIFIED nodes are always on-chain by protocol
    /// construction and never need broadcasting.
    pub fn always_onchain(self) -> bool {
        matches!(self, Self::Commitment | Self::Unspecified)
    }
}

impl std::fmt::Display for ChainTxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Commitment => write!(f, "commitment"),
            Self::Tree => write!(f, "tree"),
            Self::Ark => write!(f, "ark"),
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// One node of a VTXO's ancestry chain, ordered leaf (index 0) to root
/// (last index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTx {
    pub txid: Txid,
    #[serde(rename = "type")]
    pub kind: ChainTxKind,
}

// ==============================================================================
// Chain Tip
// ==============================================================================

/// A snapshot of the chain tip: height plus the tip block's timestamp.
///
/// Also used for a transaction's confirmation point when resolving
/// relative timelocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u32,
    pub time: u64,
}
