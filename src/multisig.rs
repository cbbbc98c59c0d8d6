//! m-of-n multisig inputs: bare, pay-to-script-hash, and version 0
//! witness script hash (native or nested in P2SH)
//!
//! Signature slots are indexed by key position. The scriptSig and witness
//! are rebuilt after every mutation from the present signatures in key
//! order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::varint_size;
use crate::constants::*;
use crate::ecdsa::Signature;
use crate::error::{Result, SignerError};
use crate::input::{create_signature, verify_signature, TransactionSignature};
use crate::keys::{PrivateKey, PublicKey};
use crate::script::Script;
use crate::sighash::SigVersion;
use crate::transaction::{Transaction, TxInput};
use crate::types::*;

/// How the multisig script is committed to by the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiSigKind {
    /// The output is the multisig script itself
    Bare,
    /// The output is `OP_HASH160 <hash160(redeem)> OP_EQUAL`
    ScriptHash,
    /// The output is `OP_0 <sha256(witness script)>`
    WitnessScriptHash,
    /// The output is P2SH of `OP_0 <sha256(witness script)>`
    NestedWitness,
}

impl MultiSigKind {
    /// Signatures live in the witness and commit to the BIP143 digest
    pub fn is_witness(self) -> bool {
        matches!(self, MultiSigKind::WitnessScriptHash | MultiSigKind::NestedWitness)
    }

    pub fn sig_version(self) -> SigVersion {
        if self.is_witness() {
            SigVersion::WitnessV0
        } else {
            SigVersion::Base
        }
    }
}

/// Outcome of matching unordered signatures to ordered keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSignatures {
    /// One slot per public key
    pub slots: Vec<Option<TransactionSignature>>,
    /// Raw signatures that matched no key
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSigInput {
    pub base: TxInput,
    public_keys: Vec<PublicKey>,
    key_index: HashMap<ByteString, usize>,
    threshold: usize,
    signatures: Vec<Option<TransactionSignature>>,
    kind: MultiSigKind,
    /// The multisig script; the witness script for witness kinds
    redeem_script: Script,
}

impl MultiSigInput {
    /// Validate `(public_keys, threshold)` against the connected output
    ///
    /// 1. 1 ≤ threshold ≤ |keys| ≤ 16 and keys are distinct
    /// 2. keys are sorted by serialized form when `sort` is set
    /// 3. with ms = multisig(keys, m) and w = OP_0 <sha256(ms)>, the output
    ///    must be one of ms, P2SH(ms), w or P2SH(w)
    /// 4. anything else is a `ScriptMismatch`
    ///
    /// An existing scriptSig or witness is kept as is and its signatures are
    /// not in the slots yet; see [`MultiSigInput::needs_import`]. Nested
    /// witness inputs get their fixed `<w>` scriptSig.
    pub fn new(
        base: TxInput,
        public_keys: Vec<PublicKey>,
        threshold: usize,
        sort: bool,
    ) -> Result<Self> {
        let n = public_keys.len();
        if threshold == 0 || threshold > n || n > MAX_MULTISIG_KEYS {
            return Err(SignerError::InvalidParameters(format!(
                "{}-of-{} multisig is out of range",
                threshold, n
            )));
        }

        let mut public_keys = public_keys;
        if sort {
            public_keys.sort();
        }
        let key_index: HashMap<ByteString, usize> = public_keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.to_bytes(), i))
            .collect();
        if key_index.len() != n {
            return Err(SignerError::InvalidParameters(
                "multisig public keys must be distinct".to_string(),
            ));
        }

        let redeem_script = Script::build_multisig_out(&public_keys, threshold)?;
        let witness_program = Script::build_witness_script_hash_out(&redeem_script);
        let output = &base.connected_output()?.script;
        let kind = if *output == redeem_script {
            MultiSigKind::Bare
        } else if *output == Script::build_script_hash_out(&redeem_script) {
            MultiSigKind::ScriptHash
        } else if *output == witness_program {
            MultiSigKind::WitnessScriptHash
        } else if *output == Script::build_script_hash_out(&witness_program) {
            MultiSigKind::NestedWitness
        } else {
            return Err(SignerError::ScriptMismatch(format!(
                "output {} is not a {}-of-{} multisig over the given keys",
                output, threshold, n
            )));
        };

        let mut base = base;
        if kind == MultiSigKind::NestedWitness {
            base.script = Script::build_redeem_push(&witness_program);
        }
        Ok(MultiSigInput {
            base,
            public_keys,
            key_index,
            threshold,
            signatures: vec![None; n],
            kind,
            redeem_script,
        })
    }

    /// Bare multisig keys and threshold read back from the output script
    pub fn from_bare_output(base: TxInput) -> Result<Self> {
        let (threshold, pushed) = base
            .connected_output()?
            .script
            .multisig_params()
            .ok_or_else(|| SignerError::ScriptMismatch("not a multisig output".to_string()))?;
        let keys = parse_keys(&pushed)?;
        Self::new(base, keys, threshold, false)
    }

    /// Keys and threshold of a script-hash or witness-script-hash spend,
    /// taken from the multisig script its scriptSig or witness reveals
    ///
    /// Keys keep the order of the revealed script. Nothing revealed is an
    /// `UnsupportedOperation`; a script that does not hash to the output is
    /// a `ScriptMismatch`.
    pub fn from_revealed_script(base: TxInput) -> Result<Self> {
        let output = &base.connected_output()?.script;
        let revealed = if output.is_witness_script_hash_out() {
            base.witness.last().cloned()
        } else {
            match base.script.last_push() {
                Some(redeem) if Script(redeem.clone()).is_witness_script_hash_out() => {
                    base.witness.last().cloned()
                }
                redeem => redeem,
            }
        };
        let revealed = revealed.map(Script).ok_or_else(|| {
            SignerError::UnsupportedOperation(
                "script hash output needs its redeem keys".to_string(),
            )
        })?;
        let (threshold, pushed) = revealed.multisig_params().ok_or_else(|| {
            SignerError::UnsupportedOperation(format!(
                "revealed script {} is not a multisig script",
                revealed
            ))
        })?;
        let keys = parse_keys(&pushed)?;
        Self::new(base, keys, threshold, false)
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn kind(&self) -> MultiSigKind {
        self.kind
    }

    /// The script signatures commit to
    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    pub fn signatures(&self) -> &[Option<TransactionSignature>] {
        &self.signatures
    }

    pub fn get_signatures(
        &self,
        tx: &Transaction,
        key: &PrivateKey,
        input_index: usize,
        sighash_type: u8,
        signing_method: SigningMethod,
    ) -> Result<Vec<TransactionSignature>> {
        if self.kind.is_witness() && signing_method == SigningMethod::Schnorr {
            return Err(SignerError::UnsupportedOperation(
                "witness programs take ECDSA signatures only".to_string(),
            ));
        }
        let signer = key.public_key();
        let mut out = Vec::new();
        for public_key in self.public_keys.iter().filter(|pk| pk.same_point(&signer)) {
            out.push(create_signature(
                tx,
                &self.base,
                key,
                *public_key,
                input_index,
                sighash_type,
                signing_method,
                &self.redeem_script,
                self.kind.sig_version(),
            )?);
        }
        Ok(out)
    }

    pub fn is_valid_signature(&self, tx: &Transaction, signature: &TransactionSignature) -> bool {
        verify_signature(
            tx,
            &self.base,
            signature,
            &self.redeem_script,
            self.kind.sig_version(),
        )
        .unwrap_or(false)
    }

    /// Place `signature` in its key's slot
    ///
    /// Fails with `AlreadyFullySigned` once the threshold is met,
    /// `UnknownPublicKey` for keys outside the set and `InvalidSignature`
    /// when verification fails. The input is unchanged on error.
    pub fn add_signature(&mut self, tx: &Transaction, signature: &TransactionSignature) -> Result<()> {
        if self.count_missing_signatures() == 0 {
            return Err(SignerError::AlreadyFullySigned);
        }
        let slot = *self
            .key_index
            .get(&signature.public_key.to_bytes())
            .ok_or_else(|| SignerError::UnknownPublicKey(signature.public_key.to_hex()))?;
        if !self.is_valid_signature(tx, signature) {
            return Err(SignerError::InvalidSignature(format!(
                "signature by {} does not verify for input {}",
                signature.public_key, signature.input_index
            )));
        }
        let previous = self.signatures[slot].replace(signature.clone());
        if let Err(e) = self.update_script() {
            self.signatures[slot] = previous;
            return Err(e);
        }
        log::debug!(
            "multisig input {}: {}/{} signatures",
            signature.input_index,
            self.count_signatures(),
            self.threshold
        );
        Ok(())
    }

    pub fn clear_signatures(&mut self) {
        self.signatures = vec![None; self.public_keys.len()];
        self.render(&[]);
    }

    pub fn count_signatures(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    pub fn count_missing_signatures(&self) -> usize {
        self.threshold.saturating_sub(self.count_signatures())
    }

    pub fn is_fully_signed(&self) -> bool {
        self.count_missing_signatures() == 0
    }

    /// Keys whose slot is still empty, in key order
    pub fn public_keys_without_signature(&self) -> Vec<PublicKey> {
        self.public_keys
            .iter()
            .zip(&self.signatures)
            .filter(|(_, slot)| slot.is_none())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Serialized bytes once signed, witness included
    ///
    /// OP_0 + m signature pushes, plus the redeem push for P2SH. Witness
    /// kinds carry the same elements as stack items plus the witness
    /// script, and nested ones a 35-byte scriptSig.
    pub fn estimate_size(&self) -> usize {
        let signatures = OPCODES_SIZE + self.threshold * MAX_SIGNATURE_PUSH_SIZE;
        let witness = varint_size(self.threshold as u64 + 2)
            + signatures
            + varint_size(self.redeem_script.len() as u64)
            + self.redeem_script.len();
        match self.kind {
            MultiSigKind::Bare => INPUT_BASE_SIZE + signatures,
            MultiSigKind::ScriptHash => {
                INPUT_BASE_SIZE + signatures + push_size(&self.redeem_script)
            }
            MultiSigKind::WitnessScriptHash => INPUT_BASE_SIZE + 1 + witness,
            MultiSigKind::NestedWitness => INPUT_BASE_SIZE + 1 + 35 + witness,
        }
    }

    /// Whether the scriptSig or witness holds signatures missing from the
    /// slots, as when built over an input that was already partly signed
    pub fn needs_import(&self) -> bool {
        self.carried_signatures()
            .map_or(false, |carried| carried.len() > self.count_signatures())
    }

    /// Write the scriptSig and witness for `signatures`
    fn render(&mut self, signatures: &[ByteString]) {
        let witness_stack = || {
            let mut stack = Vec::with_capacity(signatures.len() + 2);
            stack.push(Vec::new());
            stack.extend(signatures.iter().cloned());
            stack.push(self.redeem_script.to_bytes());
            stack
        };
        let (script, witness) = match self.kind {
            MultiSigKind::Bare => (Script::build_multisig_in(signatures), Vec::new()),
            MultiSigKind::ScriptHash => (
                Script::build_p2sh_multisig_in(signatures, &self.redeem_script),
                Vec::new(),
            ),
            MultiSigKind::WitnessScriptHash => (Script::empty(), witness_stack()),
            MultiSigKind::NestedWitness => (
                Script::build_redeem_push(&Script::build_witness_script_hash_out(
                    &self.redeem_script,
                )),
                witness_stack(),
            ),
        };
        self.base.script = script;
        self.base.witness = witness;
    }

    fn update_script(&mut self) -> Result<()> {
        let signatures = self
            .signatures
            .iter()
            .flatten()
            .map(TransactionSignature::to_tx_format)
            .collect::<Result<Vec<_>>>()?;
        self.render(&signatures);
        Ok(())
    }

    /// Match unordered raw signatures to ordered public keys
    ///
    /// Greedy: each raw signature, in order, claims the first still
    /// unclaimed key it verifies against. Signatures that parse badly or
    /// match no key are counted in `unmatched`. 64-byte bodies are read as
    /// Schnorr, everything else as DER.
    pub fn normalize_signatures(
        tx: &Transaction,
        input: &TxInput,
        input_index: usize,
        subscript: &Script,
        sig_version: SigVersion,
        raw_signatures: &[ByteString],
        public_keys: &[PublicKey],
    ) -> Result<NormalizedSignatures> {
        input.connected_output()?;
        let mut slots: Vec<Option<TransactionSignature>> = vec![None; public_keys.len()];
        let mut unmatched = 0;

        for raw in raw_signatures {
            let signature = match Signature::from_tx_format(raw) {
                Ok(signature) => signature,
                Err(e) => {
                    log::debug!("skipping unparseable multisig signature: {}", e);
                    unmatched += 1;
                    continue;
                }
            };
            let sighash_type = signature.sighash_type.unwrap_or(SIGHASH_ALL);

            let mut claimed = false;
            for (slot, public_key) in public_keys.iter().enumerate() {
                if slots[slot].is_some() {
                    continue;
                }
                let candidate = TransactionSignature {
                    public_key: *public_key,
                    prev_tx_id: input.prev_tx_id,
                    output_index: input.output_index,
                    input_index,
                    signature,
                    sighash_type,
                };
                if verify_signature(tx, input, &candidate, subscript, sig_version)? {
                    slots[slot] = Some(candidate);
                    claimed = true;
                    break;
                }
            }
            if !claimed {
                unmatched += 1;
            }
        }

        Ok(NormalizedSignatures { slots, unmatched })
    }

    /// Signature pushes carried by the current scriptSig or witness
    fn carried_signatures(&self) -> Result<Vec<ByteString>> {
        if self.kind.is_witness() {
            return self.witness_signatures();
        }
        let chunks = self.base.script.chunks()?;
        let mut pushes: Vec<ByteString> = Vec::new();
        match chunks.split_first() {
            None => {}
            Some((first, rest)) if first.opcode == OP_0 && first.data.is_none() => {
                for chunk in rest {
                    match &chunk.data {
                        Some(data) => pushes.push(data.clone()),
                        // empty placeholder for a missing signature
                        None if chunk.opcode == OP_0 => {}
                        None => {
                            return Err(SignerError::InvalidScript(
                                "non-push in multisig scriptSig".to_string(),
                            ))
                        }
                    }
                }
            }
            Some(_) => {
                return Err(SignerError::InvalidScript(
                    "multisig scriptSig must start with OP_0".to_string(),
                ))
            }
        }
        if self.kind == MultiSigKind::ScriptHash {
            if let Some(redeem) = pushes.pop() {
                if redeem != self.redeem_script.as_bytes() {
                    return Err(SignerError::ScriptMismatch(
                        "scriptSig redeem script differs from the input's".to_string(),
                    ));
                }
            }
        }
        Ok(pushes)
    }

    /// [empty, sig..., witness script]
    fn witness_signatures(&self) -> Result<Vec<ByteString>> {
        let (first, rest) = match self.base.witness.split_first() {
            Some(split) => split,
            None => return Ok(Vec::new()),
        };
        if !first.is_empty() {
            return Err(SignerError::InvalidScript(
                "witness multisig stack must start with an empty item".to_string(),
            ));
        }
        let (script, signatures) = rest.split_last().ok_or_else(|| {
            SignerError::InvalidScript("witness stack has no witness script".to_string())
        })?;
        if script.as_slice() != self.redeem_script.as_bytes() {
            return Err(SignerError::ScriptMismatch(
                "witness script differs from the input's".to_string(),
            ));
        }
        Ok(signatures.iter().filter(|s| !s.is_empty()).cloned().collect())
    }

    /// Restore signature slots from the current scriptSig or witness
    ///
    /// Returns the number of signatures that matched no key and were dropped.
    pub fn import_script_sig(&mut self, tx: &Transaction, input_index: usize) -> Result<usize> {
        let pushes = self.carried_signatures()?;
        let normalized = Self::normalize_signatures(
            tx,
            &self.base,
            input_index,
            &self.redeem_script,
            self.kind.sig_version(),
            &pushes,
            &self.public_keys,
        )?;
        if normalized.unmatched > 0 {
            log::warn!(
                "input {}: dropped {} signatures matching no public key",
                input_index,
                normalized.unmatched
            );
        }
        self.signatures = normalized.slots;
        self.update_script()?;
        Ok(normalized.unmatched)
    }
}

fn parse_keys(pushed: &[ByteString]) -> Result<Vec<PublicKey>> {
    pushed.iter().map(|bytes| PublicKey::from_bytes(bytes)).collect()
}

/// Size in bytes of `script` pushed as a single element
pub fn push_size(script: &Script) -> usize {
    let len = script.len();
    let prefix = match len {
        n if n < OP_PUSHDATA1 as usize => 1,
        n if n <= 0xff => 2,
        n if n <= 0xffff => 3,
        _ => 5,
    };
    prefix + len
}
