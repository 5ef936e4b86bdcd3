//! Signing abstraction.
//!
//! The core never holds key material directly; it asks an [`Identity`] for
//! taproot signatures and assembles witnesses itself. [`KeyIdentity`] is
//! the in-process single-key implementation used by the CLI and tests;
//! hardware or remote signers implement the same trait.

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, Secp256k1, TapTweak};
use bitcoin::secp256k1::{All, Message, XOnlyPublicKey};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::{taproot, Address, Network, Script, Transaction, TxOut};

use crate::error::CoreError;

#[async_trait]
pub trait Identity: Send + Sync {
    /// The x-only public key this identity signs for.
    fn x_only_public_key(&self) -> Result<XOnlyPublicKey, CoreError>;

    /// Produce a taproot key-spend signature for `tx`'s input at `input`.
    async fn sign_key_spend(
        &self,
        tx: &Transaction,
        input: usize,
        prevouts: &[TxOut],
    ) -> Result<taproot::Signature, CoreError>;

    /// Produce a tapscript signature for `tx`'s input at `input`, spending
    /// the leaf carrying `leaf_script`.
    async fn sign_tapscript(
        &self,
        tx: &Transaction,
        input: usize,
        prevouts: &[TxOut],
        leaf_script: &Script,
    ) -> Result<taproot::Signature, CoreError>;
}

/// A single Schnorr keypair held in memory.
pub struct KeyIdentity {
    secp: Secp256k1<All>,
    keypair: Keypair,
}

impl KeyIdentity {
    pub fn from_seckey_hex(hex: &str) -> Result<Self, CoreError> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_str(&secp, hex)
            .map_err(|e| CoreError::State(format!("invalid secret key: {e}")))?;
        Ok(Self { secp, keypair })
    }

    /// The key-spend-only taproot address of this key.
    pub fn address(&self, network: Network) -> Address {
        let (key, _) = self.keypair.x_only_public_key();
        Address::p2tr(&self.secp, key, None, network)
    }

    fn sighash_message(
        tx: &Transaction,
        input: usize,
        prevouts: &[TxOut],
        leaf_script: Option<&Script>,
    ) -> Result<Message, CoreError> {
        let mut cache = SighashCache::new(tx);
        let sighash = match leaf_script {
            None => cache.taproot_key_spend_signature_hash(
                input,
                &Prevouts::All(prevouts),
                TapSighashType::Default,
            ),
            Some(script) => cache.taproot_script_spend_signature_hash(
                input,
                &Prevouts::All(prevouts),
                TapLeafHash::from_script(script, LeafVersion::TapScript),
                TapSighashType::Default,
            ),
        }
        .map_err(|e| CoreError::State(format!("compute taproot sighash: {e}")))?;
        Ok(Message::from_digest(sighash.to_byte_array()))
    }
}

#[async_trait]
impl Identity for KeyIdentity {
    fn x_only_public_key(&self) -> Result<XOnlyPublicKey, CoreError> {
        Ok(self.keypair.x_only_public_key().0)
    }

    async fn sign_key_spend(
        &self,
        tx: &Transaction,
        input: usize,
        prevouts: &[TxOut],
    ) -> Result<taproot::Signature, CoreError> {
        let msg = Self::sighash_message(tx, input, prevouts, None)?;
        // Key spends sign with the output-tweaked key (no script tree).
        let tweaked = self.keypair.tap_tweak(&self.secp, None);
        let signature = self.secp.sign_schnorr_no_aux_rand(&msg, &tweaked.to_inner());
        Ok(taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        })
    }

    async fn sign_tapscript(
        &self,
        tx: &Transaction,
        input: usize,
        prevouts: &[TxOut],
        leaf_script: &Script,
    ) -> Result<taproot::Signature, CoreError> {
        let msg = Self::sighash_message(tx, input, prevouts, Some(leaf_script))?;
        let signature = self.secp.sign_schnorr_no_aux_rand(&msg, &self.keypair);
        Ok(taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_identity;

    #[test]
    fn address_is_key_spend_taproot() {
        let identity = test_identity();
        let address = identity.address(Network::Regtest);
        assert!(address.script_pubkey().is_p2tr());
    }

    #[test]
    fn rejects_malformed_secret_key() {
        assert!(KeyIdentity::from_seckey_hex("not-hex").is_err());
        assert!(KeyIdentity::from_seckey_hex("00").is_err());
    }
}
