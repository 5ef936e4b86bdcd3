//! Greedy largest-first coin selection.

use bitcoin::Amount;

use crate::error::CoreError;
use crate::types::Coin;

/// The result of a selection: the chosen inputs and the surplus over the
/// target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub inputs: Vec<Coin>,
    pub change: Amount,
}

impl CoinSelection {
    pub fn empty() -> Self {
        Self {
            inputs: Vec::new(),
            change: Amount::ZERO,
        }
    }

    pub fn total(&self) -> Amount {
        self.inputs.iter().map(|c| c.value).sum()
    }
}

/// Select coins to cover `target`, largest first.
///
/// Coins are sorted descending by value (ties keep their input order; the
/// sort is stable) and accumulated until the running sum reaches the
/// target. With `force_change` the sum must strictly exceed the target,
/// guaranteeing a non-zero change output.
///
/// A zero target selects nothing. Exhausting the coins without reaching
/// the target fails with [`CoreError::InsufficientFunds`].
pub fn select_coins(
    coins: &[Coin],
    target: Amount,
    force_change: bool,
) -> Result<CoinSelection, CoreError> {
    if target == Amount::ZERO {
        return Ok(CoinSelection::empty());
    }

    let mut sorted: Vec<&Coin> = coins.iter().collect();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let mut inputs = Vec::new();
    let mut sum = Amount::ZERO;
    for coin in sorted {
        inputs.push(coin.clone());
        sum = sum
            .checked_add(coin.value)
            .ok_or_else(|| CoreError::InvalidAmount("coin values overflow".to_owned()))?;

        let satisfied = if force_change {
            sum > target
        } else {
            sum >= target
        };
        if satisfied {
            return Ok(CoinSelection {
                inputs,
                change: sum - target,
            });
        }
    }

    Err(CoreError::InsufficientFunds {
        needed: target,
        available: sum,
    })
}
