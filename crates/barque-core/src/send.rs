//! On-chain send planning: the fee-convergence loop and transaction build.
//!
//! The fee depends on the input/output count and the input count depends
//! on amount + fee, so the planner iterates selection and estimation to a
//! fixed point, bounded to [`MAX_FEE_ITERATIONS`] passes.

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use tracing::debug;

use crate::error::CoreError;
use crate::fee::FeeEstimator;
use crate::identity::Identity;
use crate::select::select_coins;
use crate::types::Coin;

/// Minimum economically spendable output value; smaller change is dropped.
pub const DUST_LIMIT: Amount = Amount::from_sat(546);

/// Cap on fee-convergence passes; exceeding it is [`CoreError::FeeConvergence`].
pub const MAX_FEE_ITERATIONS: usize = 10;

/// A converged (inputs, change, fee) triple for an on-chain send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub inputs: Vec<Coin>,
    /// Raw surplus of the selection over amount + fee. Only emitted as an
    /// output when `include_change` is set.
    pub change: Amount,
    pub fee: Amount,
    pub include_change: bool,
}

/// Iterate coin selection and fee estimation to a fixed point.
///
/// Starting from a zero fee, each pass selects coins for `amount + fee`,
/// estimates the size of a transaction with one payment output (plus a
/// change output when the selection's surplus clears the dust limit), and
/// recomputes the fee. The loop converges when the fee stops growing.
///
/// Change below the dust limit is dropped from the built transaction
/// without another convergence pass, and the winning iteration's fee
/// figure is kept even though dropping the output slightly shrinks the
/// true size. Recomputing would change fee totals observable by existing
/// callers, so this numeric behavior is deliberate and load-bearing.
pub fn plan_send(
    coins: &[Coin],
    amount: Amount,
    fee_rate: u64,
    recipient: &Address,
    change_address: &Address,
) -> Result<SendPlan, CoreError> {
    let mut fee = Amount::ZERO;

    for iteration in 0..MAX_FEE_ITERATIONS {
        let target = amount
            .checked_add(fee)
            .ok_or_else(|| CoreError::InvalidAmount("amount + fee overflows".to_owned()))?;
        let selection = select_coins(coins, target, false)?;
        let include_change = selection.change >= DUST_LIMIT;

        let mut estimator = selection
            .inputs
            .iter()
            .fold(FeeEstimator::new(), |est, _| est.add_key_spend_input(true))
            .add_output_address(recipient);
        if include_change {
            estimator = estimator.add_output_address(change_address);
        }

        let new_fee = estimator.vsize().fee(fee_rate);
        debug!(
            iteration,
            inputs = selection.inputs.len(),
            include_change,
            fee = %new_fee,
            "fee convergence pass"
        );
        if new_fee <= fee {
            return Ok(SendPlan {
                inputs: selection.inputs,
                change: selection.change,
                fee: new_fee,
                include_change,
            });
        }
        fee = new_fee;
    }

    Err(CoreError::FeeConvergence(MAX_FEE_ITERATIONS))
}

/// Build the unsigned transaction a [`SendPlan`] describes.
pub fn build_send_tx(
    plan: &SendPlan,
    amount: Amount,
    recipient: &Address,
    change_address: &Address,
) -> Transaction {
    let input = plan
        .inputs
        .iter()
        .map(|coin| TxIn {
            previous_output: coin.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let mut output = vec![TxOut {
        value: amount,
        script_pubkey: recipient.script_pubkey(),
    }];
    if plan.include_change {
        output.push(TxOut {
            value: plan.change,
            script_pubkey: change_address.script_pubkey(),
        });
    }

    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

/// Sign and finalize every key-spend input of `tx` that the identity
/// controls, i.e. whose prevout pays to its key-spend taproot script.
/// Inputs with other prevout scripts (such as anchor outputs) are left
/// untouched.
pub async fn finalize_key_spends(
    tx: &mut Transaction,
    prevouts: &[TxOut],
    identity: &dyn Identity,
) -> Result<(), CoreError> {
    let secp = bitcoin::key::Secp256k1::verification_only();
    let own_script = ScriptBuf::new_p2tr(&secp, identity.x_only_public_key()?, None);

    let mut signatures = Vec::new();
    for (index, prevout) in prevouts.iter().enumerate() {
        if prevout.script_pubkey == own_script {
            let signature = identity.sign_key_spend(tx, index, prevouts).await?;
            signatures.push((index, signature));
        }
    }

    for (index, signature) in signatures {
        let input = tx
            .input
            .get_mut(index)
            .ok_or_else(|| CoreError::State(format!("no input at index {index} to finalize")))?;
        input.witness = Witness::from_slice(&[signature.to_vec()]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{coin, p2tr_address, test_identity};

    #[test]
    fn dust_boundary_converges_to_single_output() {
        // One coin covering amount + no-change fee + 800: the first pass
        // prices a with-change transaction, the second sees sub-dust change
        // and settles on the smaller no-change size without oscillating.
        let coins = vec![coin(1, 51_910)];
        let recipient = p2tr_address();
        let change = p2tr_address();

        let plan = plan_send(&coins, Amount::from_sat(50_000), 10, &recipient, &change).unwrap();
        assert_eq!(plan.inputs.len(), 1);
        assert_eq!(plan.fee, Amount::from_sat(1_110));
        assert!(!plan.include_change);
        assert_eq!(plan.change, Amount::from_sat(370));

        let tx = build_send_tx(&plan, Amount::from_sat(50_000), &recipient, &change);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
    }

    #[test]
    fn two_coin_send_drops_sub_dust_change() {
        let coins = vec![coin(1, 100_000), coin(2, 12_000)];
        let recipient = p2tr_address();
        let change = p2tr_address();

        let plan = plan_send(&coins, Amount::from_sat(111_500), 1, &recipient, &change).unwrap();
        assert_eq!(plan.inputs.len(), 2);
        assert!(!plan.include_change);
        // 2 key-spend inputs, 1 taproot output: 169 vB at 1 sat/vB.
        assert_eq!(plan.fee, Amount::from_sat(169));

        let tx = build_send_tx(&plan, Amount::from_sat(111_500), &recipient, &change);
        assert_eq!(tx.output.len(), 1);
    }

    #[test]
    fn ample_change_is_kept() {
        let coins = vec![coin(1, 1_000_000)];
        let recipient = p2tr_address();
        let change = p2tr_address();

        let plan = plan_send(&coins, Amount::from_sat(50_000), 2, &recipient, &change).unwrap();
        assert!(plan.include_change);
        // 1 key-spend input, 2 taproot outputs: 154 vB at 2 sat/vB.
        assert_eq!(plan.fee, Amount::from_sat(308));
        assert_eq!(plan.change, Amount::from_sat(1_000_000 - 50_000 - 308));

        let tx = build_send_tx(&plan, Amount::from_sat(50_000), &recipient, &change);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].value, plan.change);
    }

    #[test]
    fn planning_is_idempotent() {
        let coins = vec![coin(1, 51_910)];
        let recipient = p2tr_address();
        let change = p2tr_address();
        let first = plan_send(&coins, Amount::from_sat(50_000), 10, &recipient, &change).unwrap();
        let second = plan_send(&coins, Amount::from_sat(50_000), 10, &recipient, &change).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn insufficient_funds_propagates() {
        let coins = vec![coin(1, 10_000)];
        let err = plan_send(
            &coins,
            Amount::from_sat(50_000),
            1,
            &p2tr_address(),
            &p2tr_address(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn finalize_signs_only_owned_inputs() {
        let identity = test_identity();
        let own = identity.address(bitcoin::Network::Regtest);
        let coins = vec![coin(1, 100_000)];
        let plan = plan_send(&coins, Amount::from_sat(50_000), 1, &p2tr_address(), &own).unwrap();
        let mut tx = build_send_tx(&plan, Amount::from_sat(50_000), &p2tr_address(), &own);

        // Prevout 0 belongs to the identity, so its witness gets a single
        // 64-byte Schnorr signature.
        let prevouts = vec![TxOut {
            value: Amount::from_sat(100_000),
            script_pubkey: own.script_pubkey(),
        }];
        finalize_key_spends(&mut tx, &prevouts, &identity)
            .await
            .unwrap();
        assert_eq!(tx.input[0].witness.len(), 1);
        assert_eq!(tx.input[0].witness[0].len(), 64);
    }
}
