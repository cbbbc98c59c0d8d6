//! Script templates used by the signing engine
//!
//! This is not an interpreter. It recognizes and builds the handful of
//! standard templates inputs can redeem (P2PKH, P2PK, bare multisig, P2SH
//! and P2WSH) plus the scriptSigs that satisfy them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, SignerError};
use crate::hash::{hash160, sha256};
use crate::keys::PublicKey;
use crate::types::*;

/// One parsed script element: an opcode, or a push with its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub opcode: u8,
    pub data: Option<ByteString>,
}

impl Chunk {
    pub fn op(opcode: u8) -> Self {
        Chunk { opcode, data: None }
    }

    pub fn push(data: &[u8]) -> Self {
        let opcode = match data.len() {
            n if n < OP_PUSHDATA1 as usize => n as u8,
            n if n <= 0xff => OP_PUSHDATA1,
            n if n <= 0xffff => OP_PUSHDATA2,
            _ => OP_PUSHDATA4,
        };
        Chunk {
            opcode,
            data: Some(data.to_vec()),
        }
    }
}

/// Output classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    PublicKeyHashOut,
    PublicKeyOut,
    ScriptHashOut,
    WitnessScriptHashOut,
    MultisigOut,
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script(pub ByteString);

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl From<ByteString> for Script {
    fn from(bytes: ByteString) -> Self {
        Script(bytes)
    }
}

impl Script {
    pub fn new(bytes: ByteString) -> Self {
        Script(bytes)
    }

    pub fn empty() -> Self {
        Script(Vec::new())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        hex::decode(s)
            .map(Script)
            .map_err(|e| SignerError::InvalidScript(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> ByteString {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut bytes = Vec::new();
        for chunk in chunks {
            bytes.push(chunk.opcode);
            if let Some(data) = &chunk.data {
                match chunk.opcode {
                    OP_PUSHDATA1 => bytes.push(data.len() as u8),
                    OP_PUSHDATA2 => bytes.extend_from_slice(&(data.len() as u16).to_le_bytes()),
                    OP_PUSHDATA4 => bytes.extend_from_slice(&(data.len() as u32).to_le_bytes()),
                    _ => {}
                }
                bytes.extend_from_slice(data);
            }
        }
        Script(bytes)
    }

    /// Split into opcodes and pushes; truncated pushes are an error
    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        let bytes = &self.0;
        let mut chunks = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let opcode = bytes[pos];
            pos += 1;
            let len = match opcode {
                n if n > 0 && n < OP_PUSHDATA1 => n as usize,
                OP_PUSHDATA1 => {
                    let len = read_len(bytes, pos, 1)?;
                    pos += 1;
                    len
                }
                OP_PUSHDATA2 => {
                    let len = read_len(bytes, pos, 2)?;
                    pos += 2;
                    len
                }
                OP_PUSHDATA4 => {
                    let len = read_len(bytes, pos, 4)?;
                    pos += 4;
                    len
                }
                _ => {
                    chunks.push(Chunk::op(opcode));
                    continue;
                }
            };
            if pos + len > bytes.len() {
                return Err(SignerError::InvalidScript(format!(
                    "push of {} bytes at offset {} overruns script",
                    len, pos
                )));
            }
            chunks.push(Chunk {
                opcode,
                data: Some(bytes[pos..pos + len].to_vec()),
            });
            pos += len;
        }
        Ok(chunks)
    }

    pub fn classify(&self) -> ScriptType {
        if self.is_public_key_hash_out() {
            ScriptType::PublicKeyHashOut
        } else if self.is_public_key_out() {
            ScriptType::PublicKeyOut
        } else if self.is_script_hash_out() {
            ScriptType::ScriptHashOut
        } else if self.is_witness_script_hash_out() {
            ScriptType::WitnessScriptHashOut
        } else if self.is_multisig_out() {
            ScriptType::MultisigOut
        } else {
            ScriptType::Unknown
        }
    }

    /// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    pub fn is_public_key_hash_out(&self) -> bool {
        let b = &self.0;
        b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
    }

    /// <pubkey> OP_CHECKSIG
    pub fn is_public_key_out(&self) -> bool {
        match self.chunks() {
            Ok(chunks) => {
                chunks.len() == 2
                    && chunks[1].opcode == OP_CHECKSIG
                    && chunks[0]
                        .data
                        .as_deref()
                        .map_or(false, |key| PublicKey::from_bytes(key).is_ok())
            }
            Err(_) => false,
        }
    }

    /// OP_HASH160 <20> OP_EQUAL
    pub fn is_script_hash_out(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == 20 && b[22] == OP_EQUAL
    }

    /// OP_0 <32>
    pub fn is_witness_script_hash_out(&self) -> bool {
        let b = &self.0;
        b.len() == 34 && b[0] == OP_0 && b[1] == 32
    }

    /// OP_m <pubkey>... OP_n OP_CHECKMULTISIG
    pub fn is_multisig_out(&self) -> bool {
        self.multisig_params().is_some()
    }

    /// Threshold and key pushes of a multisig output
    pub fn multisig_params(&self) -> Option<(usize, Vec<ByteString>)> {
        let chunks = self.chunks().ok()?;
        if chunks.len() < 4 || chunks[chunks.len() - 1].opcode != OP_CHECKMULTISIG {
            return None;
        }
        let m = small_int(chunks[0].opcode)?;
        let n = small_int(chunks[chunks.len() - 2].opcode)?;
        let keys: Vec<ByteString> = chunks[1..chunks.len() - 2]
            .iter()
            .map(|c| c.data.clone())
            .collect::<Option<Vec<_>>>()?;
        if keys.len() != n || m == 0 || m > n {
            return None;
        }
        Some((m, keys))
    }

    /// <sig> <pubkey>
    pub fn is_public_key_hash_in(&self) -> bool {
        match self.chunks() {
            Ok(chunks) => {
                chunks.len() == 2
                    && chunks[0].data.as_ref().map_or(false, |s| !s.is_empty())
                    && chunks[1]
                        .data
                        .as_ref()
                        .map_or(false, |k| k.len() == 33 || k.len() == 65)
            }
            Err(_) => false,
        }
    }

    /// <sig>
    pub fn is_public_key_in(&self) -> bool {
        match self.chunks() {
            Ok(chunks) => {
                chunks.len() == 1 && chunks[0].data.as_ref().map_or(false, |s| !s.is_empty())
            }
            Err(_) => false,
        }
    }

    /// 20-byte hash of a P2PKH or P2SH output
    pub fn public_key_hash(&self) -> Result<Hash160> {
        let range = if self.is_public_key_hash_out() {
            3..23
        } else if self.is_script_hash_out() {
            2..22
        } else {
            return Err(SignerError::InvalidScript(
                "not a hash output script".to_string(),
            ));
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.0[range]);
        Ok(hash)
    }

    /// Key of a P2PK output
    pub fn public_key(&self) -> Result<PublicKey> {
        if !self.is_public_key_out() {
            return Err(SignerError::InvalidScript(
                "not a public key output script".to_string(),
            ));
        }
        let chunks = self.chunks()?;
        let key = chunks[0].data.as_deref().unwrap_or_default();
        PublicKey::from_bytes(key)
    }

    /// Copy with every OP_CODESEPARATOR removed
    pub fn remove_codeseparators(&self) -> Result<Script> {
        let chunks: Vec<Chunk> = self
            .chunks()?
            .into_iter()
            .filter(|c| c.opcode != OP_CODESEPARATOR)
            .collect();
        Ok(Script::from_chunks(&chunks))
    }

    // ============================================================================
    // OUTPUT BUILDERS
    // ============================================================================

    pub fn build_public_key_hash_out(hash: &Hash160) -> Script {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        bytes.extend_from_slice(hash);
        bytes.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(bytes)
    }

    pub fn build_public_key_out(key: &PublicKey) -> Script {
        Script::from_chunks(&[Chunk::push(&key.to_bytes()), Chunk::op(OP_CHECKSIG)])
    }

    /// OP_m <keys in the given order> OP_n OP_CHECKMULTISIG
    pub fn build_multisig_out(keys: &[PublicKey], threshold: usize) -> Result<Script> {
        if threshold == 0 || threshold > keys.len() || keys.len() > MAX_MULTISIG_KEYS {
            return Err(SignerError::InvalidParameters(format!(
                "{}-of-{} multisig",
                threshold,
                keys.len()
            )));
        }
        let mut chunks = vec![Chunk::op(small_int_op(threshold))];
        chunks.extend(keys.iter().map(|k| Chunk::push(&k.to_bytes())));
        chunks.push(Chunk::op(small_int_op(keys.len())));
        chunks.push(Chunk::op(OP_CHECKMULTISIG));
        Ok(Script::from_chunks(&chunks))
    }

    /// OP_HASH160 <hash160(script)> OP_EQUAL
    pub fn build_script_hash_out(script: &Script) -> Script {
        let mut bytes = Vec::with_capacity(23);
        bytes.extend_from_slice(&[OP_HASH160, 20]);
        bytes.extend_from_slice(&hash160(&script.0));
        bytes.push(OP_EQUAL);
        Script(bytes)
    }

    /// OP_0 <sha256(script)>
    pub fn build_witness_script_hash_out(script: &Script) -> Script {
        let mut bytes = Vec::with_capacity(34);
        bytes.extend_from_slice(&[OP_0, 32]);
        bytes.extend_from_slice(&sha256(&script.0));
        Script(bytes)
    }

    // ============================================================================
    // INPUT BUILDERS
    // ============================================================================

    /// <sig> <pubkey>; `signature` is already in transaction format
    pub fn build_public_key_hash_in(signature: &[u8], key: &PublicKey) -> Script {
        Script::from_chunks(&[Chunk::push(signature), Chunk::push(&key.to_bytes())])
    }

    pub fn build_public_key_in(signature: &[u8]) -> Script {
        Script::from_chunks(&[Chunk::push(signature)])
    }

    /// OP_0 <sig>...
    pub fn build_multisig_in(signatures: &[ByteString]) -> Script {
        let mut chunks = vec![Chunk::op(OP_0)];
        chunks.extend(signatures.iter().map(|s| Chunk::push(s)));
        Script::from_chunks(&chunks)
    }

    /// OP_0 <sig>... <redeem script>
    pub fn build_p2sh_multisig_in(signatures: &[ByteString], redeem_script: &Script) -> Script {
        let mut chunks = vec![Chunk::op(OP_0)];
        chunks.extend(signatures.iter().map(|s| Chunk::push(s)));
        chunks.push(Chunk::push(&redeem_script.0));
        Script::from_chunks(&chunks)
    }

    /// <redeem script>, the whole scriptSig of a P2SH-wrapped witness spend
    pub fn build_redeem_push(redeem_script: &Script) -> Script {
        Script::from_chunks(&[Chunk::push(&redeem_script.0)])
    }

    /// Data of the final chunk when it is a push
    pub fn last_push(&self) -> Option<ByteString> {
        self.chunks().ok()?.pop()?.data
    }
}

fn read_len(bytes: &[u8], pos: usize, width: usize) -> Result<usize> {
    if pos + width > bytes.len() {
        return Err(SignerError::InvalidScript(
            "truncated push length".to_string(),
        ));
    }
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(&bytes[pos..pos + width]);
    Ok(u32::from_le_bytes(buf) as usize)
}

/// OP_1..OP_16 → 1..16
fn small_int(opcode: u8) -> Option<usize> {
    if (OP_1..=OP_16).contains(&opcode) {
        Some((opcode - OP_1 + 1) as usize)
    } else {
        None
    }
}

/// 1..16 → OP_1..OP_16
fn small_int_op(n: usize) -> u8 {
    OP_1 + (n as u8) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;

    fn key(n: u8) -> PublicKey {
        PrivateKey::from_bytes(&[n; 32]).unwrap().public_key()
    }

    #[test]
    fn test_p2pkh_round_trip() {
        let hash = key(1).hash160();
        let script = Script::build_public_key_hash_out(&hash);
        assert_eq!(script.classify(), ScriptType::PublicKeyHashOut);
        assert_eq!(script.public_key_hash().unwrap(), hash);
    }

    #[test]
    fn test_p2pk_classification() {
        let script = Script::build_public_key_out(&key(1));
        assert_eq!(script.len(), 35);
        assert_eq!(script.classify(), ScriptType::PublicKeyOut);
        assert_eq!(script.public_key().unwrap(), key(1));
    }

    #[test]
    fn test_multisig_out() {
        let keys = vec![key(1), key(2), key(3)];
        let script = Script::build_multisig_out(&keys, 2).unwrap();
        assert_eq!(script.as_bytes()[0], 0x52);
        assert_eq!(script.as_bytes()[script.len() - 2], 0x53);
        assert_eq!(script.classify(), ScriptType::MultisigOut);
        let (m, pushed) = script.multisig_params().unwrap();
        assert_eq!(m, 2);
        assert_eq!(pushed[1], key(2).to_bytes());

        let p2sh = Script::build_script_hash_out(&script);
        assert_eq!(p2sh.classify(), ScriptType::ScriptHashOut);
        assert_eq!(p2sh.public_key_hash().unwrap(), hash160(script.as_bytes()));
    }

    #[test]
    fn test_witness_script_hash_out() {
        let multisig = Script::build_multisig_out(&[key(1), key(2)], 1).unwrap();
        let p2wsh = Script::build_witness_script_hash_out(&multisig);
        assert_eq!(p2wsh.len(), 34);
        assert_eq!(&p2wsh.as_bytes()[2..], &sha256(multisig.as_bytes())[..]);
        assert_eq!(p2wsh.classify(), ScriptType::WitnessScriptHashOut);

        let nested = Script::build_script_hash_out(&p2wsh);
        assert_eq!(nested.classify(), ScriptType::ScriptHashOut);
        let push = Script::build_redeem_push(&p2wsh);
        assert_eq!(push.last_push(), Some(p2wsh.to_bytes()));
        assert_eq!(Script(vec![OP_0]).last_push(), None);
    }

    #[test]
    fn test_multisig_out_rejects_bad_threshold() {
        let keys = vec![key(1), key(2)];
        assert!(Script::build_multisig_out(&keys, 0).is_err());
        assert!(Script::build_multisig_out(&keys, 3).is_err());
    }

    #[test]
    fn test_chunks_pushdata() {
        let data = vec![0xab; 300];
        let script = Script::from_chunks(&[Chunk::push(&data), Chunk::op(OP_CHECKSIG)]);
        assert_eq!(script.as_bytes()[0], OP_PUSHDATA2);
        let chunks = script.chunks().unwrap();
        assert_eq!(chunks[0].data.as_deref(), Some(&data[..]));
        assert_eq!(chunks[1], Chunk::op(OP_CHECKSIG));
    }

    #[test]
    fn test_chunks_truncated_push() {
        assert!(Script(vec![0x05, 0x01, 0x02]).chunks().is_err());
        assert!(Script(vec![OP_PUSHDATA2, 0x01]).chunks().is_err());
    }

    #[test]
    fn test_input_templates() {
        let sig = vec![0x30; 71];
        assert!(Script::build_public_key_hash_in(&sig, &key(1)).is_public_key_hash_in());
        assert!(Script::build_public_key_in(&sig).is_public_key_in());
        assert!(!Script::empty().is_public_key_in());
        let multisig_in = Script::build_multisig_in(&[sig.clone()]);
        assert_eq!(multisig_in.chunks().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_codeseparators() {
        let script = Script(vec![OP_DUP, OP_CODESEPARATOR, 0x01, OP_CODESEPARATOR, OP_CHECKSIG]);
        // the pushed 0xab byte is data, not an opcode
        assert_eq!(
            script.remove_codeseparators().unwrap(),
            Script(vec![OP_DUP, 0x01, OP_CODESEPARATOR, OP_CHECKSIG])
        );
    }
}
