//! VTXO script surface.
//!
//! A VTXO's tap-tree descriptor is decoded by an external script library
//! (the [`ScriptDecoder`] seam); the core only consumes the decoded shape:
//! the output script and the alternative timelocked exit paths.

use bitcoin::{Script, ScriptBuf, Sequence};

use crate::error::CoreError;

/// A relative timelock guarding an exit path, denominated either in
/// blocks since confirmation or in elapsed seconds since the confirming
/// block's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTimelock {
    Blocks(u16),
    Seconds(u64),
}

impl ExitTimelock {
    /// The nSequence value that satisfies this timelock. Second-denominated
    /// locks round up to the next 512-second interval, the granularity
    /// BIP-68 encodes.
    pub fn to_sequence(self) -> Sequence {
        match self {
            Self::Blocks(blocks) => Sequence::from_height(blocks),
            Self::Seconds(seconds) => {
                Sequence::from_512_second_intervals(seconds.div_ceil(512) as u16)
            }
        }
    }
}

/// One timelocked spending path of a VTXO tap tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPath {
    pub script: ScriptBuf,
    pub control_block: Vec<u8>,
    pub timelock: ExitTimelock,
}

/// The decoded spending surface of a VTXO: its on-chain scriptPubKey and
/// its exit paths, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtxoSpendInfo {
    pub script_pubkey: ScriptBuf,
    pub exit_paths: Vec<ExitPath>,
}

impl VtxoSpendInfo {
    /// Look up the exit path carrying the given leaf script.
    pub fn find_leaf(&self, script: &Script) -> Option<&ExitPath> {
        self.exit_paths
            .iter()
            .find(|path| path.script.as_script() == script)
    }
}

/// External decoder from a tap-tree descriptor string to spend info.
pub trait ScriptDecoder: Send + Sync {
    fn decode(&self, descriptor: &str) -> Result<VtxoSpendInfo, CoreError>;
}
