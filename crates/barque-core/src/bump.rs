//! CPFP package construction over fee-free anchor (P2A) outputs.
//!
//! A parent transaction in a VTXO chain pays no fee itself; it exposes an
//! anchor output so a child can pay for the whole package. The bumper
//! locates the anchor, prices the parent+child package at the current
//! rate, and builds a signed child spending the anchor plus wallet coins.
//! Building and broadcasting are independent outcomes: this module only
//! builds, and submission failures surface to the caller as
//! [`CoreError::Broadcast`].

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use tracing::debug;

use crate::error::CoreError;
use crate::fee::FeeEstimator;
use crate::identity::Identity;
use crate::provider::Explorer;
use crate::select::select_coins;
use crate::send::finalize_key_spends;

/// The pay-to-anchor scriptPubKey: `OP_1 <0x4e73>`.
pub const ANCHOR_SCRIPT_PUBKEY: [u8; 4] = [0x51, 0x02, 0x4e, 0x73];

/// Fee rates below this floor are bumped up before pricing a package.
pub const MIN_PACKAGE_FEE_RATE: u64 = 1;

/// The canonical zero-value anchor output.
pub fn anchor_output() -> TxOut {
    TxOut {
        value: Amount::ZERO,
        script_pubkey: ScriptBuf::from_bytes(ANCHOR_SCRIPT_PUBKEY.to_vec()),
    }
}

/// Locate the anchor output of `tx`, if it has one.
pub fn find_anchor_output(tx: &Transaction) -> Option<(u32, &TxOut)> {
    tx.output
        .iter()
        .enumerate()
        .find(|(_, out)| out.script_pubkey.as_bytes() == ANCHOR_SCRIPT_PUBKEY)
        .map(|(vout, out)| (vout as u32, out))
}

/// A built parent+child fee-bump package, ready for submission.
#[derive(Debug, Clone)]
pub struct BumpPackage {
    pub parent: Transaction,
    pub child: Transaction,
}

impl BumpPackage {
    /// `[parent hex, child hex]`, the order package submission expects.
    pub fn to_hex(&self) -> [String; 2] {
        [serialize_hex(&self.parent), serialize_hex(&self.child)]
    }
}

/// Build a child transaction that pays the fee for `parent` and itself.
///
/// The child's size is estimated as one key-spend wallet input, the anchor
/// input, and one destination output; selection may add further inputs,
/// which is accepted (the package only overpays slightly). Coins are
/// selected for exactly the package fee with a forced change output, so
/// the child returns `anchor value + change` to the wallet address.
pub async fn bump_with_anchor(
    explorer: &dyn Explorer,
    identity: &dyn Identity,
    parent: &Transaction,
    wallet_address: &Address,
) -> Result<BumpPackage, CoreError> {
    let parent_txid = parent.compute_txid();
    let (anchor_vout, anchor) =
        find_anchor_output(parent).ok_or(CoreError::AnchorNotFound(parent_txid))?;

    let child_vsize = FeeEstimator::new()
        .add_key_spend_input(true)
        .add_p2a_input()
        .add_output_address(wallet_address)
        .vsize();
    let package_vsize = parent.vsize() as u64 + child_vsize.0;

    let fee_rate = explorer.fee_rate().await?.max(MIN_PACKAGE_FEE_RATE);
    let fee = Amount::from_sat(fee_rate * package_vsize);
    if fee == Amount::ZERO {
        return Err(CoreError::InvalidAmount(
            "package fee rounds to zero".to_owned(),
        ));
    }

    let coins = explorer.coins(wallet_address).await?;
    let selection = select_coins(&coins, fee, true)?;

    let mut input = vec![TxIn {
        previous_output: bitcoin::OutPoint::new(parent_txid, anchor_vout),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::new(),
    }];
    input.extend(selection.inputs.iter().map(|coin| TxIn {
        previous_output: coin.outpoint,
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::new(),
    }));

    let mut child = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output: vec![TxOut {
            value: anchor.value + selection.change,
            script_pubkey: wallet_address.script_pubkey(),
        }],
    };

    // Anchor first, then the wallet coins, matching the input order.
    // Selected coins were fetched for the wallet address, so their
    // scriptPubKey is the wallet's own.
    let mut prevouts = vec![anchor.clone()];
    prevouts.extend(selection.inputs.iter().map(|coin| TxOut {
        value: coin.value,
        script_pubkey: wallet_address.script_pubkey(),
    }));
    finalize_key_spends(&mut child, &prevouts, identity).await?;

    debug!(
        parent = %parent_txid,
        child = %child.compute_txid(),
        package_vsize,
        fee_rate,
        fee = %fee,
        "built anchor fee-bump package"
    );

    Ok(BumpPackage {
        parent: parent.clone(),
        child,
    })
}
