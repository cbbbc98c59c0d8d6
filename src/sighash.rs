//! Signature hashes: the digest a transaction signature commits to
//!
//! Two algorithms, chosen by the SIGHASH_FORKID bit of the sighash type:
//! the legacy serialization-of-a-modified-copy digest, and the fork-id
//! digest that commits to the spent amount through cached sub-hashes.
//! Version 0 witness spends always use the second layout (BIP143).

use serde::{Deserialize, Serialize};

use crate::codec::{BufferWriter, Serializable};
use crate::constants::*;
use crate::ecdsa::{self, Signature};
use crate::error::{Result, SignerError};
use crate::hash::sha256d;
use crate::keys::{PrivateKey, PublicKey};
use crate::schnorr;
use crate::script::Script;
use crate::transaction::{Output, Transaction};
use crate::types::*;

/// Which digest an input's signatures commit to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigVersion {
    /// Legacy or fork-id, picked by the sighash type
    #[default]
    Base,
    /// BIP143 digest of a version 0 witness program
    WitnessV0,
}

/// Digest returned by legacy SIGHASH_SINGLE when the input has no
/// matching output
pub const SIGHASH_SINGLE_BUG: Hash = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Sighash: 𝒯𝒳 × ℕ × 𝕊 × ℕ → ℍ
///
/// 1. If sighash_type ∧ FORKID: fork-id digest over (tx, index, subscript, satoshis)
/// 2. Otherwise: legacy digest over (tx, index, subscript)
pub fn sighash(
    tx: &Transaction,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
) -> Result<Hash> {
    check_index(tx, input_index)?;
    if sighash_type & SIGHASH_FORKID != 0 {
        Ok(fork_id_sighash(tx, sighash_type, input_index, subscript, satoshis))
    } else {
        legacy_sighash(tx, sighash_type, input_index, subscript)
    }
}

/// BIP143 digest; `subscript` is the witness script
pub fn witness_sighash(
    tx: &Transaction,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
) -> Result<Hash> {
    check_index(tx, input_index)?;
    Ok(fork_id_sighash(tx, sighash_type, input_index, subscript, satoshis))
}

/// Digest for `sig_version`
pub fn sighash_for(
    sig_version: SigVersion,
    tx: &Transaction,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
) -> Result<Hash> {
    match sig_version {
        SigVersion::Base => sighash(tx, sighash_type, input_index, subscript, satoshis),
        SigVersion::WitnessV0 => witness_sighash(tx, sighash_type, input_index, subscript, satoshis),
    }
}

fn check_index(tx: &Transaction, input_index: usize) -> Result<()> {
    if input_index >= tx.inputs.len() {
        return Err(SignerError::InputIndexOutOfRange {
            index: input_index,
            len: tx.inputs.len(),
        });
    }
    Ok(())
}

/// Legacy digest
///
/// 1. subscript' = subscript without OP_CODESEPARATOR
/// 2. Every input script := ∅, except input[index] := subscript'
/// 3. NONE: outputs := ∅; NONE/SINGLE: other inputs' sequence := 0
/// 4. SINGLE: index ≥ |outputs| ⇒ return 1; else outputs := outputs[..=index],
///    with every earlier output blanked to (-1, ∅)
/// 5. ANYONECANPAY: inputs := [input[index]]
/// 6. Return sha256d(copy || sighash_type as u32le)
fn legacy_sighash(
    tx: &Transaction,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
) -> Result<Hash> {
    let base_type = sighash_type & SIGHASH_BASE_MASK;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;
    let subscript = subscript.remove_codeseparators()?;

    let outputs: Vec<Output> = match base_type {
        SIGHASH_NONE => Vec::new(),
        SIGHASH_SINGLE => {
            if input_index >= tx.outputs.len() {
                log::debug!("SIGHASH_SINGLE without matching output for input {}", input_index);
                return Ok(SIGHASH_SINGLE_BUG);
            }
            let mut outputs = vec![Output::new(u64::MAX, Script::empty()); input_index];
            outputs.push(tx.outputs[input_index].clone());
            outputs
        }
        _ => tx.outputs.clone(),
    };

    let mut writer = BufferWriter::new();
    writer.write_i32_le(tx.version);

    let indices: Vec<usize> = if anyone_can_pay {
        vec![input_index]
    } else {
        (0..tx.inputs.len()).collect()
    };
    writer.write_varint(indices.len() as u64);
    for i in indices {
        let mut input = tx.inputs[i].base().clone();
        if i == input_index {
            input.script = subscript.clone();
        } else {
            input.script = Script::empty();
            if base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE {
                input.sequence_number = 0;
            }
        }
        input.write(&mut writer);
    }

    writer.write_varint(outputs.len() as u64);
    for output in &outputs {
        output.write(&mut writer);
    }
    writer.write_u32_le(tx.lock_time);
    writer.write_u32_le(u32::from(sighash_type));
    Ok(sha256d(&writer.into_bytes()))
}

/// Fork-id (and BIP143) digest
///
/// version || hashPrevouts || hashSequence || outpoint || subscript ||
/// satoshis || sequence || hashOutputs || lock_time || sighash_type
fn fork_id_sighash(
    tx: &Transaction,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
) -> Hash {
    let base_type = sighash_type & SIGHASH_BASE_MASK;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;
    let zero = [0u8; 32];

    let hash_prevouts = if anyone_can_pay {
        zero
    } else {
        let mut writer = BufferWriter::new();
        for input in &tx.inputs {
            input.base().write_outpoint(&mut writer);
        }
        sha256d(&writer.into_bytes())
    };

    let hash_sequence =
        if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE {
            zero
        } else {
            let mut writer = BufferWriter::new();
            for input in &tx.inputs {
                writer.write_u32_le(input.base().sequence_number);
            }
            sha256d(&writer.into_bytes())
        };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        let mut writer = BufferWriter::new();
        for output in &tx.outputs {
            output.write(&mut writer);
        }
        sha256d(&writer.into_bytes())
    } else if base_type == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        sha256d(&tx.outputs[input_index].to_bytes())
    } else {
        zero
    };

    let input = tx.inputs[input_index].base();
    let mut writer = BufferWriter::new();
    writer.write_i32_le(tx.version);
    writer.write(&hash_prevouts);
    writer.write(&hash_sequence);
    input.write_outpoint(&mut writer);
    writer.write_var_length_buffer(subscript.as_bytes());
    writer.write_u64_le(satoshis);
    writer.write_u32_le(input.sequence_number);
    writer.write(&hash_outputs);
    writer.write_u32_le(tx.lock_time);
    writer.write_u32_le(u32::from(sighash_type));
    sha256d(&writer.into_bytes())
}

/// Sign input `input_index` of `tx`
pub fn sign(
    tx: &Transaction,
    key: &PrivateKey,
    sighash_type: u8,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
    signing_method: SigningMethod,
) -> Result<Signature> {
    let digest = sighash(tx, sighash_type, input_index, subscript, satoshis)?;
    Ok(sign_digest(&digest, key, signing_method)?.with_sighash_type(sighash_type))
}

/// Sign an already computed digest with either scheme
pub fn sign_digest(
    digest: &Hash,
    key: &PrivateKey,
    signing_method: SigningMethod,
) -> Result<Signature> {
    match signing_method {
        SigningMethod::Ecdsa => ecdsa::sign(digest, key),
        SigningMethod::Schnorr => schnorr::sign(digest, key),
    }
}

/// Verify with the scheme the signature carries; ECDSA must be low-S
pub fn verify_digest(digest: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
    match signature.signing_method {
        SigningMethod::Ecdsa => ecdsa::verify_low_s(digest, signature, public_key),
        SigningMethod::Schnorr => schnorr::verify(digest, signature, public_key),
    }
}

/// Verify a signature over input `input_index` of `tx`; high-S is rejected
pub fn verify(
    tx: &Transaction,
    signature: &Signature,
    public_key: &PublicKey,
    input_index: usize,
    subscript: &Script,
    satoshis: u64,
) -> Result<bool> {
    let sighash_type = signature.sighash_type.ok_or_else(|| {
        SignerError::InvalidSignature("signature has no sighash type".to_string())
    })?;
    let digest = sighash(tx, sighash_type, input_index, subscript, satoshis)?;
    Ok(verify_digest(&digest, signature, public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Input, PublicKeyHashInput};
    use crate::transaction::TxInput;
    use pretty_assertions::assert_eq;

    fn p2pkh_input(prev_hex: &str, sequence: u32, locking: &Script, satoshis: u64) -> Input {
        let mut base = TxInput::from_hex_id(prev_hex, 0)
            .unwrap()
            .with_output(Output::new(satoshis, locking.clone()));
        base.sequence_number = sequence;
        Input::PublicKeyHash(PublicKeyHashInput::new(base).unwrap())
    }

    #[test]
    fn test_fork_id_vector() {
        let locking = Script::from_hex("76a91402b74813b047606b4b3fbdfb1a6e8e053fdb8dab88ac").unwrap();
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            260_000_000,
        ));
        tx.add_output(Output::new(100, locking.clone()));
        tx.add_output(Output::new(259_899_900, locking.clone()));

        let digest = sighash(&tx, SIGHASH_ALL | SIGHASH_FORKID, 0, &locking, 260_000_000).unwrap();
        assert_eq!(
            hex::encode(digest),
            "1e2121837829018daf3aeadab76f1a542c49a3600ded7bd74323ee74ce0d840c"
        );
    }

    #[test]
    fn test_legacy_vector() {
        let locking = Script::from_hex("76a914d951eb562f1ff26b6cbe89f04eda365ea6bd95ce88ac").unwrap();
        let mut tx = Transaction::new();
        tx.version = 1;
        tx.add_input(p2pkh_input(
            "bf6c1139ea01ca054b8d00aa0a088daaeab4f3b8e111626c6be7d603a9dd8dff",
            0xffff_ffff,
            &locking,
            50_000_000,
        ));
        tx.add_output(Output::new(
            49_990_000,
            Script::from_hex("76a9147865b0b301119fc3eadc7f3406ff1339908e46d488ac").unwrap(),
        ));

        let digest = sighash(&tx, SIGHASH_ALL, 0, &locking, 0).unwrap();
        assert_eq!(
            hex::encode(digest),
            "ad16084eccf26464a84c5ee2f8b96b4daff9a3154ac3c1b320346aed042abe57"
        );
    }

    #[test]
    fn test_single_without_matching_output() {
        let locking = Script::from_hex("76a91402b74813b047606b4b3fbdfb1a6e8e053fdb8dab88ac").unwrap();
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            1000,
        ));
        assert_eq!(
            sighash(&tx, SIGHASH_SINGLE, 0, &locking, 1000).unwrap(),
            SIGHASH_SINGLE_BUG
        );
        // fork-id SINGLE commits to a zero hashOutputs instead
        assert_ne!(
            sighash(&tx, SIGHASH_SINGLE | SIGHASH_FORKID, 0, &locking, 1000).unwrap(),
            SIGHASH_SINGLE_BUG
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let tx = Transaction::new();
        assert_eq!(
            sighash(&tx, SIGHASH_ALL, 0, &Script::empty(), 0),
            Err(SignerError::InputIndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn test_sighash_flags_change_digest() {
        let locking = Script::from_hex("76a91402b74813b047606b4b3fbdfb1a6e8e053fdb8dab88ac").unwrap();
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            1000,
        ));
        tx.add_output(Output::new(900, locking.clone()));
        let all = sighash(&tx, SIGHASH_ALL, 0, &locking, 1000).unwrap();
        let none = sighash(&tx, SIGHASH_NONE, 0, &locking, 1000).unwrap();
        let acp = sighash(&tx, SIGHASH_ALL | SIGHASH_ANYONECANPAY, 0, &locking, 1000).unwrap();
        assert_ne!(all, none);
        assert_ne!(all, acp);
    }

    #[test]
    fn test_sign_then_verify() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap();
        let locking = Script::build_public_key_hash_out(&key.public_key().hash160());
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            5000,
        ));
        let sighash_type = SIGHASH_ALL | SIGHASH_FORKID;
        let signature =
            sign(&tx, &key, sighash_type, 0, &locking, 5000, SigningMethod::Ecdsa).unwrap();
        assert!(verify(&tx, &signature, &key.public_key(), 0, &locking, 5000).unwrap());
        // the fork-id digest commits to the amount
        assert!(!verify(&tx, &signature, &key.public_key(), 0, &locking, 5001).unwrap());
    }

    #[test]
    fn test_schnorr_sign_then_verify() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap();
        let locking = Script::build_public_key_hash_out(&key.public_key().hash160());
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            5000,
        ));
        let sighash_type = SIGHASH_ALL | SIGHASH_FORKID;
        let signature =
            sign(&tx, &key, sighash_type, 0, &locking, 5000, SigningMethod::Schnorr).unwrap();
        assert!(signature.is_schnorr());
        assert_eq!(signature.to_tx_format().unwrap().len(), 65);
        assert!(verify(&tx, &signature, &key.public_key(), 0, &locking, 5000).unwrap());
        assert!(!verify(&tx, &signature, &key.public_key(), 0, &locking, 4999).unwrap());

        // the same bytes read as ECDSA do not verify
        let as_ecdsa = signature.with_signing_method(SigningMethod::Ecdsa);
        assert!(!verify(&tx, &as_ecdsa, &key.public_key(), 0, &locking, 5000).unwrap());
    }

    #[test]
    fn test_witness_digest_ignores_fork_id_bit() {
        let locking = Script::from_hex("76a91402b74813b047606b4b3fbdfb1a6e8e053fdb8dab88ac").unwrap();
        let mut tx = Transaction::new();
        tx.add_input(p2pkh_input(
            "f671dc000ad12795e86b59b27e0c367d9b026bbd4141c227b9285867a53bb6f7",
            0,
            &locking,
            260_000_000,
        ));
        tx.add_output(Output::new(100, locking.clone()));
        tx.add_output(Output::new(259_899_900, locking.clone()));

        // same layout as the fork-id digest, so the fork-id vector carries over
        let forked = SIGHASH_ALL | SIGHASH_FORKID;
        assert_eq!(
            witness_sighash(&tx, forked, 0, &locking, 260_000_000).unwrap(),
            sighash(&tx, forked, 0, &locking, 260_000_000).unwrap()
        );
        let witness = sighash_for(SigVersion::WitnessV0, &tx, SIGHASH_ALL, 0, &locking, 260_000_000).unwrap();
        assert_ne!(witness, sighash(&tx, SIGHASH_ALL, 0, &locking, 260_000_000).unwrap());
        assert_eq!(
            witness_sighash(&tx, SIGHASH_ALL, 1, &locking, 0),
            Err(SignerError::InputIndexOutOfRange { index: 1, len: 1 })
        );
    }
}
