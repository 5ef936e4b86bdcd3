//! Shared fixtures for unit tests.

use bitcoin::hashes::Hash;
use bitcoin::key::Secp256k1;
use bitcoin::secp256k1::{schnorr, PublicKey, SecretKey};
use bitcoin::sighash::TapSighashType;
use bitcoin::{taproot, Address, Amount, CompressedPublicKey, Network, OutPoint, Txid};

use crate::identity::KeyIdentity;
use crate::types::{Coin, CoinStatus};

/// A txid whose first byte is `b` and the rest zero.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

/// A confirmed on-chain coin of `sats` satoshis at `txid_from_byte(b):0`.
pub fn coin(b: u8, sats: u64) -> Coin {
    Coin {
        outpoint: OutPoint::new(txid_from_byte(b), 0),
        value: Amount::from_sat(sats),
        status: CoinStatus::confirmed_at(100, 1_700_000_000),
    }
}

/// The in-process signer all signing tests share. Its taproot address
/// differs from [`p2tr_address`].
pub fn test_identity() -> KeyIdentity {
    KeyIdentity::from_seckey_hex(
        "0101010101010101010101010101010101010101010101010101010101010101",
    )
    .expect("static test key is valid")
}

/// A fixed regtest P2WPKH address, unrelated to [`test_identity`].
pub fn p2wpkh_address() -> Address {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[2u8; 32]).expect("static test key is valid");
    let pk = CompressedPublicKey(PublicKey::from_secret_key(&secp, &sk));
    Address::p2wpkh(&pk, Network::Regtest)
}

/// A fixed regtest key-spend P2TR address, unrelated to [`test_identity`].
pub fn p2tr_address() -> Address {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&[3u8; 32]).expect("static test key is valid");
    let (xonly, _) = PublicKey::from_secret_key(&secp, &sk).x_only_public_key();
    Address::p2tr(&secp, xonly, None, Network::Regtest)
}

/// A syntactically valid taproot signature with no cryptographic meaning.
pub fn dummy_taproot_sig() -> taproot::Signature {
    taproot::Signature {
        signature: schnorr::Signature::from_slice(&[1u8; 64]).expect("64 bytes"),
        sighash_type: TapSighashType::Default,
    }
}
