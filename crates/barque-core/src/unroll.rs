//! The unilateral-exit ("unroll") protocol state machine.
//!
//! An [`UnrollSession`] walks a VTXO's immutable ancestry chain and emits
//! [`Step`]s: wait for a confirmation, broadcast the next chain node as a
//! fee-bumped package, or done. Every step is re-derived from current
//! on-chain confirmation status plus the chain fetched at construction —
//! there is no cursor — so a session can be rebuilt from just the VTXO
//! outpoint after a crash, and resuming never duplicates or skips a
//! broadcast.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, Psbt, ScriptBuf, Transaction, TxIn, TxOut, Txid, Witness,
};
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::bump::{bump_with_anchor, MIN_PACKAGE_FEE_RATE};
use crate::error::{CoreError, ProviderError};
use crate::exit::first_matured_path;
use crate::fee::FeeEstimator;
use crate::identity::Identity;
use crate::provider::{Explorer, Indexer};
use crate::script::ScriptDecoder;
use crate::send::DUST_LIMIT;
use crate::types::{ChainTip, ChainTx, ChainTxKind, VirtualCoin};

/// Poll interval while waiting for a broadcast node to confirm.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay between executing a step and deriving the next one, giving the
/// indexer time to reflect the just-submitted state.
pub const STEP_DELAY: Duration = Duration::from_secs(1);

/// Witness bytes of one tapscript signature: stack item count (1), push
/// length (1), Schnorr signature (64).
const TAPSCRIPT_SIG_WITNESS_SIZE: u64 = 66;

/// The unit of unroll progress. Matched exhaustively by the driver.
#[derive(Debug, Clone)]
pub enum Step {
    /// A chain node is in the mempool; wait for it to confirm.
    Wait { txid: Txid },
    /// Broadcast `tx` as a `[parent, child]` fee-bump package.
    Unroll { tx: Transaction, package: [String; 2] },
    /// Every chain node is on-chain. Terminal.
    Done { vtxo_txid: Txid },
}

pub struct UnrollSession {
    outpoint: OutPoint,
    /// Fetched once at construction, held read-only for the session.
    chain: Vec<ChainTx>,
    explorer: Arc<dyn Explorer>,
    indexer: Arc<dyn Indexer>,
    identity: Arc<dyn Identity>,
    wallet_address: Address,
}

impl UnrollSession {
    /// Fetch the VTXO's ancestry chain and start a session.
    pub async fn begin(
        outpoint: OutPoint,
        explorer: Arc<dyn Explorer>,
        indexer: Arc<dyn Indexer>,
        identity: Arc<dyn Identity>,
        wallet_address: Address,
    ) -> Result<Self, CoreError> {
        let chain = indexer.vtxo_chain(&outpoint).await?;
        if chain.is_empty() {
            return Err(CoreError::State(format!(
                "vtxo {outpoint} has an empty ancestry chain"
            )));
        }
        info!(vtxo = %outpoint, chain_len = chain.len(), "unroll session started");
        Ok(Self {
            outpoint,
            chain,
            explorer,
            indexer,
            identity,
            wallet_address,
        })
    }

    pub fn chain(&self) -> &[ChainTx] {
        &self.chain
    }

    /// Derive the next step from scratch.
    ///
    /// Scans the chain from the root (most recent) toward the leaf,
    /// skipping node types that are on-chain by protocol construction. A
    /// confirmed node does not stop the scan; an unconfirmed one yields
    /// [`Step::Wait`]; a `TxNotFound` lookup is the protocol signal that
    /// this node is the next to broadcast.
    pub async fn next(&self) -> Result<Step, CoreError> {
        let mut candidate = None;
        for node in self.chain.iter().rev() {
            if node.kind.always_onchain() {
                continue;
            }
            match self.explorer.tx_status(&node.txid).await {
                Ok(status) if status.confirmed => continue,
                Ok(_) => {
                    debug!(txid = %node.txid, kind = %node.kind, "chain node in mempool");
                    return Ok(Step::Wait { txid: node.txid });
                }
                Err(CoreError::TxNotFound(_)) => {
                    candidate = Some(node);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let Some(node) = candidate else {
            info!(vtxo = %self.outpoint, "every chain node is on-chain");
            return Ok(Step::Done {
                vtxo_txid: self.outpoint.txid,
            });
        };

        debug!(txid = %node.txid, kind = %node.kind, "next chain node to broadcast");
        let tx = self.finalized_virtual_tx(node).await?;
        let package = bump_with_anchor(
            self.explorer.as_ref(),
            self.identity.as_ref(),
            &tx,
            &self.wallet_address,
        )
        .await?;
        Ok(Step::Unroll {
            tx,
            package: package.to_hex(),
        })
    }

    /// Fetch the node's off-chain transaction and finalize its witness.
    async fn finalized_virtual_tx(&self, node: &ChainTx) -> Result<Transaction, CoreError> {
        let psbts = self
            .indexer
            .virtual_txs(std::slice::from_ref(&node.txid))
            .await?;
        let encoded = psbts.into_iter().next().ok_or_else(|| {
            CoreError::State(format!("indexer returned no virtual tx for {}", node.txid))
        })?;
        let psbt: Psbt = encoded.parse().map_err(|e| {
            CoreError::from(ProviderError::InvalidResponse(format!(
                "decode virtual tx psbt for {}: {e}",
                node.txid
            )))
        })?;

        match node.kind {
            ChainTxKind::Tree => finalize_tree(psbt),
            _ => finalize_generic(psbt),
        }
    }

    /// Run the step's idempotent action.
    ///
    /// WAIT polls until the transaction confirms; its total duration is
    /// unbounded on purpose, cancellation is layered by the caller.
    /// UNROLL submits the package; submission failures propagate as
    /// [`CoreError::Broadcast`], never swallowed. DONE is a no-op.
    pub async fn execute(&self, step: &Step) -> Result<(), CoreError> {
        match step {
            Step::Wait { txid } => loop {
                let status = self.explorer.tx_status(txid).await?;
                if status.confirmed {
                    info!(%txid, "chain node confirmed");
                    return Ok(());
                }
                debug!(%txid, "still unconfirmed, polling again");
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            },
            Step::Unroll { tx, package } => {
                let txid = self.explorer.broadcast(package).await?;
                info!(parent = %tx.compute_txid(), child = %txid, "unroll package submitted");
                Ok(())
            }
            Step::Done { .. } => Ok(()),
        }
    }

    /// Drive the session to completion: derive a step, execute it, pause,
    /// repeat until [`Step::Done`].
    pub async fn run(&self) -> Result<Txid, CoreError> {
        let mut first = true;
        loop {
            if !first {
                tokio::time::sleep(STEP_DELAY).await;
            }
            first = false;

            let step = self.next().await?;
            self.execute(&step).await?;
            if let Step::Done { vtxo_txid } = step {
                return Ok(vtxo_txid);
            }
        }
    }
}

/// A TREE node carries a single stored key signature; that signature is
/// the entire witness.
fn finalize_tree(mut psbt: Psbt) -> Result<Transaction, CoreError> {
    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        let signature = input.tap_key_sig.ok_or_else(|| {
            CoreError::State(format!("tree input {index} is missing its key signature"))
        })?;
        input.final_script_witness = Some(Witness::from_slice(&[signature.to_vec()]));
    }
    Ok(psbt.extract_tx_unchecked_fee_rate())
}

/// Generic finalization for ARK/CHECKPOINT nodes: keep an already-final
/// witness, otherwise fall back to the stored key signature.
fn finalize_generic(mut psbt: Psbt) -> Result<Transaction, CoreError> {
    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        if input.final_script_witness.is_some() {
            continue;
        }
        if let Some(signature) = input.tap_key_sig {
            input.final_script_witness = Some(Witness::from_slice(&[signature.to_vec()]));
            continue;
        }
        return Err(CoreError::State(format!(
            "input {index} cannot be finalized: no witness or key signature"
        )));
    }
    Ok(psbt.extract_tx_unchecked_fee_rate())
}

/// Sweep the matured exit paths of fully-unrolled VTXOs to `destination`
/// in a single transaction.
///
/// Fails if any VTXO is not yet fully unrolled, not confirmed on-chain,
/// or has no matured exit path.
pub async fn complete_unroll(
    explorer: &dyn Explorer,
    identity: &dyn Identity,
    decoder: &dyn ScriptDecoder,
    vtxos: &[VirtualCoin],
    destination: &Address,
) -> Result<Txid, CoreError> {
    if vtxos.is_empty() {
        return Err(CoreError::State("no vtxos to complete".to_owned()));
    }

    let tip = explorer.chain_tip().await?;
    let fee_rate = explorer.fee_rate().await?.max(MIN_PACKAGE_FEE_RATE);
    let statuses = try_join_all(
        vtxos
            .iter()
            .map(|vtxo| explorer.tx_status(&vtxo.outpoint.txid)),
    )
    .await?;

    let mut estimator = FeeEstimator::new();
    let mut total = Amount::ZERO;
    let mut spends = Vec::with_capacity(vtxos.len());
    for (vtxo, status) in vtxos.iter().zip(&statuses) {
        if !vtxo.is_unrolled {
            return Err(CoreError::State(format!(
                "vtxo {} is not fully unrolled",
                vtxo.outpoint
            )));
        }
        if !status.confirmed {
            return Err(CoreError::State(format!(
                "vtxo {} is not confirmed on-chain",
                vtxo.outpoint
            )));
        }
        let confirmed = ChainTip {
            height: status.block_height.ok_or_else(|| {
                CoreError::State(format!("vtxo {} status has no block height", vtxo.outpoint))
            })?,
            time: status.block_time.ok_or_else(|| {
                CoreError::State(format!("vtxo {} status has no block time", vtxo.outpoint))
            })?,
        };

        let spend_info = decoder.decode(&vtxo.script)?;
        let path = first_matured_path(&spend_info.exit_paths, confirmed, tip)
            .ok_or_else(|| {
                CoreError::State(format!("vtxo {} has no matured exit path", vtxo.outpoint))
            })?
            .clone();

        estimator = estimator.add_tapscript_input(
            TAPSCRIPT_SIG_WITNESS_SIZE,
            path.script.len() as u64,
            path.control_block.len() as u64,
        );
        total = total
            .checked_add(vtxo.value)
            .ok_or_else(|| CoreError::InvalidAmount("vtxo values overflow".to_owned()))?;
        let prevout = TxOut {
            value: vtxo.value,
            script_pubkey: spend_info.script_pubkey,
        };
        spends.push((vtxo, path, prevout));
    }
    estimator = estimator.add_output_address(destination);

    let fee = estimator.vsize().fee(fee_rate);
    let value = total.checked_sub(fee).ok_or(CoreError::InsufficientFunds {
        needed: fee,
        available: total,
    })?;
    if value < DUST_LIMIT {
        return Err(CoreError::InvalidAmount(format!(
            "sweep output {value} is below the dust limit"
        )));
    }

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: spends
            .iter()
            .map(|(vtxo, path, _)| TxIn {
                previous_output: vtxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: path.timelock.to_sequence(),
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value,
            script_pubkey: destination.script_pubkey(),
        }],
    };

    let prevouts: Vec<TxOut> = spends.iter().map(|(_, _, prevout)| prevout.clone()).collect();
    for (index, (_, path, _)) in spends.iter().enumerate() {
        let signature = identity
            .sign_tapscript(&tx, index, &prevouts, &path.script)
            .await?;
        let mut witness = Witness::new();
        witness.push(signature.to_vec());
        witness.push(path.script.as_bytes());
        witness.push(&path.control_block);
        tx.input[index].witness = witness;
    }

    let txid = explorer.broadcast(&[serialize_hex(&tx)]).await?;
    info!(%txid, vtxos = vtxos.len(), fee = %fee, "completed unroll sweep");
    Ok(txid)
}
