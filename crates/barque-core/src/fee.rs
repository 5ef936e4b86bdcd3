//! Deterministic transaction size and fee estimation.
//!
//! Computes a transaction's virtual size and linear fee without a
//! serialized transaction, by accumulating per-input and per-output byte
//! costs as the planner decides its composition. The constants here match
//! Bitcoin's serialization exactly; they are load-bearing for fee
//! correctness, not approximations.

use bitcoin::{Address, Amount};

/// Non-witness bytes every transaction carries: version (4), input and
/// output count varints (1 + 1), locktime (4).
pub const BASE_TX_SIZE: u64 = 10;

/// Non-witness bytes of an input with an empty scriptSig: outpoint (36),
/// scriptSig length prefix (1), sequence (4).
pub const INPUT_NON_WITNESS_SIZE: u64 = 41;

/// Segwit marker and flag, counted once when any input carries a witness.
pub const WITNESS_HEADER_SIZE: u64 = 2;

pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// DER signature with sighash byte (~72) plus compressed pubkey (33),
/// each with a push opcode.
const P2PKH_SCRIPT_SIG_SIZE: u64 = 107;

/// Witness stack of a taproot key spend with the default sighash:
/// item count (1), push length (1), Schnorr signature (64).
const KEY_SPEND_WITNESS_SIZE: u64 = 66;

/// Length of the Bitcoin compact-size encoding of `n`.
pub fn varint_size(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Accumulating size estimator. Every `add_*` method consumes and returns
/// the estimator, so a full estimate composes as a single expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeEstimator {
    stripped_size: u64,
    witness_size: u64,
    has_witness: bool,
    inputs: usize,
    outputs: usize,
}

impl FeeEstimator {
    pub fn new() -> Self {
        Self {
            stripped_size: BASE_TX_SIZE,
            ..Self::default()
        }
    }

    /// A taproot key-spend input. The witness is a single 64-byte Schnorr
    /// signature, one byte longer when the sighash is not the default.
    pub fn add_key_spend_input(mut self, default_sighash: bool) -> Self {
        self.stripped_size += INPUT_NON_WITNESS_SIZE;
        self.witness_size += KEY_SPEND_WITNESS_SIZE + u64::from(!default_sighash);
        self.has_witness = true;
        self.inputs += 1;
        self
    }

    /// A pay-to-anchor (P2A) input. Anchor outputs are anyone-can-spend
    /// with an empty witness; the single empty-stack marker byte is only
    /// serialized when another input carries a witness, so it is recorded
    /// without setting the witness flag.
    pub fn add_p2a_input(mut self) -> Self {
        self.stripped_size += INPUT_NON_WITNESS_SIZE;
        self.witness_size += 1;
        self.inputs += 1;
        self
    }

    /// A legacy P2PKH input. The 107-byte scriptSig stays below the
    /// compact-size boundary, so the length prefix already counted in
    /// [`INPUT_NON_WITNESS_SIZE`] does not grow.
    pub fn add_p2pkh_input(mut self) -> Self {
        self.stripped_size += INPUT_NON_WITNESS_SIZE + P2PKH_SCRIPT_SIG_SIZE;
        self.witness_size += 1;
        self.inputs += 1;
        self
    }

    /// A tapscript (leaf) spend input. `leaf_witness_size` covers the stack
    /// item count and the signature items themselves; the leaf script and
    /// control block are appended length-prefixed.
    pub fn add_tapscript_input(
        mut self,
        leaf_witness_size: u64,
        leaf_script_size: u64,
        control_block_size: u64,
    ) -> Self {
        self.stripped_size += INPUT_NON_WITNESS_SIZE;
        self.witness_size += leaf_witness_size
            + varint_size(leaf_script_size)
            + leaf_script_size
            + varint_size(control_block_size)
            + control_block_size;
        self.has_witness = true;
        self.inputs += 1;
        self
    }

    /// An output paying to `address`: amount (8) plus the length-prefixed
    /// scriptPubKey the address decodes to.
    pub fn add_output_address(self, address: &Address) -> Self {
        self.add_output(address.script_pubkey().len() as u64)
    }

    /// An output with a scriptPubKey of `script_size` bytes.
    pub fn add_output(mut self, script_size: u64) -> Self {
        self.stripped_size += 8 + varint_size(script_size) + script_size;
        self.outputs += 1;
        self
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    pub fn output_count(&self) -> usize {
        self.outputs
    }

    /// Virtual size in vbytes: `ceil(weight / 4)` where
    /// `weight = stripped * 4 + witness header + witness bytes`, the
    /// witness terms present only when some input carries a witness.
    pub fn vsize(&self) -> TxVirtualSize {
        let mut weight = self.stripped_size * WITNESS_SCALE_FACTOR;
        if self.has_witness {
            weight += WITNESS_HEADER_SIZE + self.witness_size;
        }
        TxVirtualSize(weight.div_ceil(WITNESS_SCALE_FACTOR))
    }
}

/// A virtual size in vbytes, priced at integer sat/vbyte rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxVirtualSize(pub u64);

impl TxVirtualSize {
    pub fn fee(self, sat_per_vb: u64) -> Amount {
        Amount::from_sat(self.0 * sat_per_vb)
    }
}

impl std::fmt::Display for TxVirtualSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} vB", self.0)
    }
}
