//! Core wallet logic for Barque, an Ark layer-2 wallet.
//!
//! The crate covers three concerns:
//!
//! - **Fee estimation** ([`fee`]): a deterministic virtual-size model for
//!   the handful of transaction shapes the wallet builds.
//! - **Spending** ([`select`], [`send`]): largest-first coin selection and
//!   the fee-convergence loop that turns a target amount into a signed
//!   transaction.
//! - **Unilateral exit** ([`unroll`], [`exit`], [`bump`]): the state
//!   machine that force-publishes a VTXO's off-chain ancestry chain using
//!   anchor-based fee-bump packages, and the timelocked sweep that claims
//!   the funds once on-chain.
//!
//! Network access goes through the [`provider::Explorer`] and
//! [`provider::Indexer`] traits; signing goes through
//! [`identity::Identity`]. All on-chain values use [`bitcoin::Amount`].

pub mod bump;
pub mod error;
pub mod exit;
pub mod fee;
pub mod identity;
pub mod provider;
pub mod script;
pub mod select;
pub mod send;
#[cfg(test)]
pub(crate) mod test_util;
pub mod types;
pub mod unroll;

pub use error::{CoreError, ProviderError};
pub use identity::{Identity, KeyIdentity};
pub use provider::{ArkIndexerClient, EsploraClient, Explorer, Indexer};
pub use types::{ChainTip, ChainTx, ChainTxKind, Coin, CoinStatus, VirtualCoin};
