//! Exit-path timelock resolution.

use crate::script::{ExitPath, ExitTimelock};
use crate::types::ChainTip;

/// Return the first path (in declared order) whose relative timelock has
/// matured, given where the VTXO confirmed and the current chain tip.
///
/// Block-denominated locks compare heights; second-denominated locks
/// compare the tip's block time against the confirmation block time.
/// Returns `None` when no path has matured yet.
pub fn first_matured_path<'a>(
    paths: &'a [ExitPath],
    confirmed: ChainTip,
    tip: ChainTip,
) -> Option<&'a ExitPath> {
    paths.iter().find(|path| match path.timelock {
        ExitTimelock::Blocks(blocks) => {
            tip.height >= confirmed.height.saturating_add(u32::from(blocks))
        }
        ExitTimelock::Seconds(seconds) => tip.time >= confirmed.time.saturating_add(seconds),
    })
}
