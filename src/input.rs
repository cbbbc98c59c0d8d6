//! Input signing state machine
//!
//! Each concrete input kind owns the wire part of the input ([`TxInput`])
//! and knows how to produce, accept and clear the signatures that redeem
//! its connected output. [`Input`] is the closed set of kinds a
//! transaction can hold.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::ecdsa::Signature;
use crate::error::{Result, SignerError};
use crate::keys::{PrivateKey, PublicKey};
use crate::multisig::MultiSigInput;
use crate::script::{Script, ScriptType};
use crate::sighash::{self, SigVersion};
use crate::transaction::{Transaction, TxInput};
use crate::types::*;

/// A signature bound to one input of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub public_key: PublicKey,
    pub prev_tx_id: Hash,
    pub output_index: u32,
    pub input_index: usize,
    pub signature: Signature,
    pub sighash_type: u8,
}

impl TransactionSignature {
    /// Encoded signature || sighash byte
    pub fn to_tx_format(&self) -> Result<ByteString> {
        self.signature
            .with_sighash_type(self.sighash_type)
            .to_tx_format()
    }
}

/// Sign `base` for `key`, recording the key as it appears in the script
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_signature(
    tx: &Transaction,
    base: &TxInput,
    key: &PrivateKey,
    public_key: PublicKey,
    input_index: usize,
    sighash_type: u8,
    signing_method: SigningMethod,
    subscript: &Script,
    sig_version: SigVersion,
) -> Result<TransactionSignature> {
    let satoshis = base.connected_output()?.satoshis;
    let digest =
        sighash::sighash_for(sig_version, tx, sighash_type, input_index, subscript, satoshis)?;
    let signature =
        sighash::sign_digest(&digest, key, signing_method)?.with_sighash_type(sighash_type);
    Ok(TransactionSignature {
        public_key,
        prev_tx_id: base.prev_tx_id,
        output_index: base.output_index,
        input_index,
        signature,
        sighash_type,
    })
}

/// Verify `signature` against `base`, requiring a matching outpoint and
/// low-S for ECDSA
pub(crate) fn verify_signature(
    tx: &Transaction,
    base: &TxInput,
    signature: &TransactionSignature,
    subscript: &Script,
    sig_version: SigVersion,
) -> Result<bool> {
    if signature.prev_tx_id != base.prev_tx_id || signature.output_index != base.output_index {
        return Ok(false);
    }
    let satoshis = base.connected_output()?.satoshis;
    let digest = sighash::sighash_for(
        sig_version,
        tx,
        signature.sighash_type,
        signature.input_index,
        subscript,
        satoshis,
    )?;
    Ok(sighash::verify_digest(
        &digest,
        &signature.signature,
        &signature.public_key,
    ))
}

// ============================================================================
// PAY-TO-PUBLIC-KEY-HASH
// ============================================================================

/// Spends `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyHashInput {
    pub base: TxInput,
    signature: Option<TransactionSignature>,
}

impl PublicKeyHashInput {
    /// Requires a connected P2PKH output
    pub fn new(base: TxInput) -> Result<Self> {
        let output = base.connected_output()?;
        if !output.script.is_public_key_hash_out() {
            return Err(SignerError::ScriptMismatch(format!(
                "expected pay-to-public-key-hash output, got {}",
                output.script
            )));
        }
        Ok(PublicKeyHashInput {
            base,
            signature: None,
        })
    }

    pub fn signature(&self) -> Option<&TransactionSignature> {
        self.signature.as_ref()
    }

    pub fn get_signatures(
        &self,
        tx: &Transaction,
        key: &PrivateKey,
        input_index: usize,
        sighash_type: u8,
        signing_method: SigningMethod,
        key_hash: Option<&Hash160>,
    ) -> Result<Vec<TransactionSignature>> {
        let output = self.base.connected_output()?;
        let public_key = key.public_key();
        let key_hash = key_hash.copied().unwrap_or_else(|| public_key.hash160());
        if output.script.public_key_hash()? != key_hash {
            return Ok(Vec::new());
        }
        let signature = create_signature(
            tx,
            &self.base,
            key,
            public_key,
            input_index,
            sighash_type,
            signing_method,
            &output.script,
            SigVersion::Base,
        )?;
        Ok(vec![signature])
    }

    pub fn is_valid_signature(&self, tx: &Transaction, signature: &TransactionSignature) -> bool {
        let output = match self.base.connected_output() {
            Ok(output) => output,
            Err(_) => return false,
        };
        verify_signature(tx, &self.base, signature, &output.script, SigVersion::Base)
            .unwrap_or(false)
    }

    pub fn add_signature(&mut self, tx: &Transaction, signature: &TransactionSignature) -> Result<()> {
        if self.is_fully_signed() {
            return Err(SignerError::AlreadyFullySigned);
        }
        let expected = self.base.connected_output()?.script.public_key_hash()?;
        if signature.public_key.hash160() != expected {
            return Err(SignerError::UnknownPublicKey(signature.public_key.to_hex()));
        }
        if !self.is_valid_signature(tx, signature) {
            return Err(SignerError::InvalidSignature(format!(
                "signature by {} does not verify for input {}",
                signature.public_key, signature.input_index
            )));
        }
        self.base.script =
            Script::build_public_key_hash_in(&signature.to_tx_format()?, &signature.public_key);
        self.signature = Some(signature.clone());
        Ok(())
    }

    pub fn clear_signatures(&mut self) {
        self.base.script = Script::empty();
        self.signature = None;
    }

    pub fn is_fully_signed(&self) -> bool {
        self.base.script.is_public_key_hash_in()
    }

    /// Signature push (73) + public key push (34)
    pub fn estimate_size(&self) -> usize {
        INPUT_BASE_SIZE + MAX_SIGNATURE_PUSH_SIZE + MAX_PUBKEY_PUSH_SIZE
    }
}

// ============================================================================
// PAY-TO-PUBLIC-KEY
// ============================================================================

/// Spends `<pubkey> OP_CHECKSIG`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyInput {
    pub base: TxInput,
    signature: Option<TransactionSignature>,
}

impl PublicKeyInput {
    /// Requires a connected P2PK output
    pub fn new(base: TxInput) -> Result<Self> {
        let output = base.connected_output()?;
        if !output.script.is_public_key_out() {
            return Err(SignerError::ScriptMismatch(format!(
                "expected pay-to-public-key output, got {}",
                output.script
            )));
        }
        Ok(PublicKeyInput {
            base,
            signature: None,
        })
    }

    pub fn signature(&self) -> Option<&TransactionSignature> {
        self.signature.as_ref()
    }

    pub fn get_signatures(
        &self,
        tx: &Transaction,
        key: &PrivateKey,
        input_index: usize,
        sighash_type: u8,
        signing_method: SigningMethod,
    ) -> Result<Vec<TransactionSignature>> {
        let output = self.base.connected_output()?;
        let output_key = output.script.public_key()?;
        if !output_key.same_point(&key.public_key()) {
            return Ok(Vec::new());
        }
        let signature = create_signature(
            tx,
            &self.base,
            key,
            output_key,
            input_index,
            sighash_type,
            signing_method,
            &output.script,
            SigVersion::Base,
        )?;
        Ok(vec![signature])
    }

    pub fn is_valid_signature(&self, tx: &Transaction, signature: &TransactionSignature) -> bool {
        let output = match self.base.connected_output() {
            Ok(output) => output,
            Err(_) => return false,
        };
        verify_signature(tx, &self.base, signature, &output.script, SigVersion::Base)
            .unwrap_or(false)
    }

    pub fn add_signature(&mut self, tx: &Transaction, signature: &TransactionSignature) -> Result<()> {
        if self.is_fully_signed() {
            return Err(SignerError::AlreadyFullySigned);
        }
        let output_key = self.base.connected_output()?.script.public_key()?;
        if !output_key.same_point(&signature.public_key) {
            return Err(SignerError::UnknownPublicKey(signature.public_key.to_hex()));
        }
        if !self.is_valid_signature(tx, signature) {
            return Err(SignerError::InvalidSignature(format!(
                "signature by {} does not verify for input {}",
                signature.public_key, signature.input_index
            )));
        }
        self.base.script = Script::build_public_key_in(&signature.to_tx_format()?);
        self.signature = Some(signature.clone());
        Ok(())
    }

    pub fn clear_signatures(&mut self) {
        self.base.script = Script::empty();
        self.signature = None;
    }

    pub fn is_fully_signed(&self) -> bool {
        self.base.script.is_public_key_in()
    }

    pub fn estimate_size(&self) -> usize {
        INPUT_BASE_SIZE + MAX_SIGNATURE_PUSH_SIZE
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Every input kind the engine can sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    PublicKeyHash(PublicKeyHashInput),
    PublicKey(PublicKeyInput),
    MultiSig(MultiSigInput),
}

impl Input {
    /// Pick the signing kind from the connected output's script
    ///
    /// Bare multisig outputs keep the key order found in the script.
    /// Script-hash and witness-script-hash outputs hide their keys; they
    /// are selected only once a scriptSig or witness reveals the multisig
    /// script, and otherwise must be built with [`MultiSigInput::new`].
    pub fn select(base: TxInput) -> Result<Self> {
        let script_type = base.connected_output()?.script.classify();
        match script_type {
            ScriptType::PublicKeyHashOut => Ok(Input::PublicKeyHash(PublicKeyHashInput::new(base)?)),
            ScriptType::PublicKeyOut => Ok(Input::PublicKey(PublicKeyInput::new(base)?)),
            ScriptType::MultisigOut => Ok(Input::MultiSig(MultiSigInput::from_bare_output(base)?)),
            ScriptType::ScriptHashOut | ScriptType::WitnessScriptHashOut => {
                Ok(Input::MultiSig(MultiSigInput::from_revealed_script(base)?))
            }
            ScriptType::Unknown => Err(SignerError::UnsupportedOperation(
                "no signing method for this output script".to_string(),
            )),
        }
    }

    pub fn base(&self) -> &TxInput {
        match self {
            Input::PublicKeyHash(input) => &input.base,
            Input::PublicKey(input) => &input.base,
            Input::MultiSig(input) => &input.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut TxInput {
        match self {
            Input::PublicKeyHash(input) => &mut input.base,
            Input::PublicKey(input) => &mut input.base,
            Input::MultiSig(input) => &mut input.base,
        }
    }

    /// Signatures `key` can contribute to this input; empty when the key
    /// does not satisfy the connected output
    pub fn get_signatures(
        &self,
        tx: &Transaction,
        key: &PrivateKey,
        input_index: usize,
        sighash_type: u8,
        signing_method: SigningMethod,
        key_hash: Option<&Hash160>,
    ) -> Result<Vec<TransactionSignature>> {
        match self {
            Input::PublicKeyHash(input) => input.get_signatures(
                tx,
                key,
                input_index,
                sighash_type,
                signing_method,
                key_hash,
            ),
            Input::PublicKey(input) => {
                input.get_signatures(tx, key, input_index, sighash_type, signing_method)
            }
            Input::MultiSig(input) => {
                input.get_signatures(tx, key, input_index, sighash_type, signing_method)
            }
        }
    }

    pub fn add_signature(&mut self, tx: &Transaction, signature: &TransactionSignature) -> Result<()> {
        match self {
            Input::PublicKeyHash(input) => input.add_signature(tx, signature),
            Input::PublicKey(input) => input.add_signature(tx, signature),
            Input::MultiSig(input) => input.add_signature(tx, signature),
        }
    }

    pub fn clear_signatures(&mut self) {
        match self {
            Input::PublicKeyHash(input) => input.clear_signatures(),
            Input::PublicKey(input) => input.clear_signatures(),
            Input::MultiSig(input) => input.clear_signatures(),
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        match self {
            Input::PublicKeyHash(input) => input.is_fully_signed(),
            Input::PublicKey(input) => input.is_fully_signed(),
            Input::MultiSig(input) => input.is_fully_signed(),
        }
    }

    pub fn is_valid_signature(&self, tx: &Transaction, signature: &TransactionSignature) -> bool {
        match self {
            Input::PublicKeyHash(input) => input.is_valid_signature(tx, signature),
            Input::PublicKey(input) => input.is_valid_signature(tx, signature),
            Input::MultiSig(input) => input.is_valid_signature(tx, signature),
        }
    }

    pub fn signing_state(&self) -> SigningState {
        match self {
            Input::MultiSig(input) => {
                SigningState::from_counts(input.count_signatures(), input.threshold())
            }
            single => SigningState::from_counts(usize::from(single.is_fully_signed()), 1),
        }
    }

    /// Whether this input is signed through the witness
    pub fn spends_witness(&self) -> bool {
        matches!(self, Input::MultiSig(input) if input.kind().is_witness())
    }

    /// Upper bound on the serialized input once fully signed
    pub fn estimate_size(&self) -> usize {
        match self {
            Input::PublicKeyHash(input) => input.estimate_size(),
            Input::PublicKey(input) => input.estimate_size(),
            Input::MultiSig(input) => input.estimate_size(),
        }
    }
}
