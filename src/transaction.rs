//! Transaction container: outputs, inputs and the signing entry points
//!
//! Only what signing needs is modelled here. Fee computation, change
//! handling and policy checks belong to the wallet layer above.

use serde::{Deserialize, Serialize};

use crate::codec::{varint_size, BufferReader, BufferWriter, Serializable};
use crate::constants::*;
use crate::error::{Result, SignerError};
use crate::hash::sha256d;
use crate::input::{Input, TransactionSignature};
use crate::keys::PrivateKey;
use crate::script::Script;
use crate::types::*;

/// Output: 𝒯 = ℕ × 𝕊
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub satoshis: u64,
    pub script: Script,
}

impl Output {
    pub fn new(satoshis: u64, script: Script) -> Self {
        Output { satoshis, script }
    }

    pub fn size(&self) -> usize {
        8 + varint_size(self.script.len() as u64) + self.script.len()
    }
}

impl Serializable for Output {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self> {
        let satoshis = reader.read_u64_le()?;
        let script = Script::new(reader.read_var_length_buffer()?.to_vec());
        Ok(Output { satoshis, script })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer.write_u64_le(self.satoshis);
        writer.write_var_length_buffer(self.script.as_bytes());
    }
}

/// Wire part of an input plus the output it spends
///
/// `prev_tx_id` is kept in display order and reversed on the wire. The
/// connected `output` never appears on the wire; the witness stack only
/// in the segwit serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prev_tx_id: Hash,
    pub output_index: u32,
    pub sequence_number: u32,
    pub script: Script,
    #[serde(default)]
    pub witness: Vec<ByteString>,
    pub output: Option<Output>,
}

impl TxInput {
    pub fn new(prev_tx_id: Hash, output_index: u32) -> Self {
        TxInput {
            prev_tx_id,
            output_index,
            sequence_number: DEFAULT_SEQUENCE,
            script: Script::empty(),
            witness: Vec::new(),
            output: None,
        }
    }

    /// Parse a display-order (big-endian hex) transaction id
    pub fn from_hex_id(prev_tx_id: &str, output_index: u32) -> Result<Self> {
        let bytes = hex::decode(prev_tx_id).map_err(|e| SignerError::InvalidEncoding(e.to_string()))?;
        let prev_tx_id: Hash = bytes.try_into().map_err(|_| {
            SignerError::InvalidEncoding("transaction id must be 32 bytes".to_string())
        })?;
        Ok(Self::new(prev_tx_id, output_index))
    }

    pub fn with_output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    pub fn connected_output(&self) -> Result<&Output> {
        self.output.as_ref().ok_or(SignerError::MissingConnectedOutput)
    }

    /// Coinbase marker: all-zero id and index 0xffffffff
    pub fn is_null(&self) -> bool {
        self.prev_tx_id == [0u8; 32] && self.output_index == NULL_OUTPUT_INDEX
    }

    pub fn is_final(&self) -> bool {
        self.sequence_number == DEFAULT_SEQUENCE
    }

    /// prev id (wire order) || output index
    pub fn write_outpoint(&self, writer: &mut BufferWriter) {
        writer.write_reverse(&self.prev_tx_id);
        writer.write_u32_le(self.output_index);
    }
}

impl Serializable for TxInput {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self> {
        let mut prev_tx_id = [0u8; 32];
        prev_tx_id.copy_from_slice(&reader.read_reverse(32)?);
        let output_index = reader.read_u32_le()?;
        let script = Script::new(reader.read_var_length_buffer()?.to_vec());
        let sequence_number = reader.read_u32_le()?;
        Ok(TxInput {
            prev_tx_id,
            output_index,
            sequence_number,
            script,
            witness: Vec::new(),
            output: None,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        self.write_outpoint(writer);
        writer.write_var_length_buffer(self.script.as_bytes());
        writer.write_u32_le(self.sequence_number);
    }
}

/// Transaction: 𝒯𝒳 = ℤ × ℐ* × 𝒯* × ℕ
#[derive(Debug, Clone)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: DEFAULT_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, input: Input) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: Output) -> &mut Self {
        self.outputs.push(output);
        self
    }

    /// Parse a serialized transaction, attaching `connected` outputs to
    /// inputs in order and selecting each input's signing variant
    ///
    /// Signatures already present in multisig scriptSigs and witnesses are
    /// imported into their key slots, so the result can be co-signed.
    pub fn parse(bytes: &[u8], connected: &[Output]) -> Result<Self> {
        let mut reader = BufferReader::new(bytes);
        let version = reader.read_i32_le()?;
        let mut input_count = reader.read_count(41)?;
        let segwit = input_count == 0 && reader.peek_u8() == Ok(SEGWIT_FLAG);
        if segwit {
            reader.read_u8()?;
            input_count = reader.read_count(41)?;
        }
        if input_count != connected.len() {
            return Err(SignerError::InvalidParameters(format!(
                "{} inputs but {} connected outputs",
                input_count,
                connected.len()
            )));
        }
        let mut bases = Vec::with_capacity(input_count);
        for output in connected {
            bases.push(TxInput::read(&mut reader)?.with_output(output.clone()));
        }
        let output_count = reader.read_count(9)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(Output::read(&mut reader)?);
        }
        if segwit {
            for base in &mut bases {
                let item_count = reader.read_count(1)?;
                for _ in 0..item_count {
                    base.witness.push(reader.read_var_length_buffer()?.to_vec());
                }
            }
        }
        let lock_time = reader.read_u32_le()?;
        if !reader.finished() {
            return Err(SignerError::InvalidEncoding(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }

        let inputs = bases
            .into_iter()
            .map(Input::select)
            .collect::<Result<Vec<_>>>()?;
        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        };
        let dropped = tx.import_multisig_signatures()?;
        if dropped > 0 {
            log::warn!("{}: dropped {} unmatched multisig signatures", tx.id(), dropped);
        }
        Ok(tx)
    }

    /// Any input carrying a witness stack
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.base().witness.is_empty())
    }

    /// Segwit serialization when any input has a witness, legacy otherwise
    pub fn write(&self, writer: &mut BufferWriter) {
        self.write_with(writer, true);
    }

    fn write_with(&self, writer: &mut BufferWriter, include_witness: bool) {
        let segwit = include_witness && self.has_witness();
        writer.write_i32_le(self.version);
        if segwit {
            writer.write_u8(SEGWIT_MARKER);
            writer.write_u8(SEGWIT_FLAG);
        }
        writer.write_varint(self.inputs.len() as u64);
        for input in &self.inputs {
            input.base().write(writer);
        }
        writer.write_varint(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(writer);
        }
        if segwit {
            for input in &self.inputs {
                let witness = &input.base().witness;
                writer.write_varint(witness.len() as u64);
                for item in witness {
                    writer.write_var_length_buffer(item);
                }
            }
        }
        writer.write_u32_le(self.lock_time);
    }

    pub fn to_bytes(&self) -> ByteString {
        let mut writer = BufferWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    /// Legacy serialization, witnesses stripped
    pub fn to_bytes_without_witness(&self) -> ByteString {
        let mut writer = BufferWriter::new();
        self.write_with(&mut writer, false);
        writer.into_bytes()
    }

    /// sha256d of the witness-free serialization, wire order
    pub fn hash(&self) -> Hash {
        sha256d(&self.to_bytes_without_witness())
    }

    /// sha256d of the full serialization, wire order
    pub fn witness_hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }

    /// Display-order hex id
    pub fn id(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        hex::encode(hash)
    }

    pub fn input(&self, index: usize) -> Result<&Input> {
        self.inputs.get(index).ok_or(SignerError::InputIndexOutOfRange {
            index,
            len: self.inputs.len(),
        })
    }

    /// Every ECDSA signature `key` can contribute, across all inputs
    pub fn get_signatures(
        &self,
        key: &PrivateKey,
        sighash_type: u8,
    ) -> Result<Vec<TransactionSignature>> {
        self.get_signatures_with(key, sighash_type, SigningMethod::Ecdsa)
    }

    pub fn get_signatures_with(
        &self,
        key: &PrivateKey,
        sighash_type: u8,
        signing_method: SigningMethod,
    ) -> Result<Vec<TransactionSignature>> {
        let mut signatures = Vec::new();
        for (index, input) in self.inputs.iter().enumerate() {
            signatures.extend(input.get_signatures(
                self,
                key,
                index,
                sighash_type,
                signing_method,
                None,
            )?);
        }
        Ok(signatures)
    }

    /// Route a signature to the input it names
    ///
    /// A multisig input still carrying unimported signatures in its
    /// scriptSig or witness imports them first.
    pub fn apply_signature(&mut self, signature: &TransactionSignature) -> Result<()> {
        let index = signature.input_index;
        let mut input = self.input(index)?.clone();
        if let Input::MultiSig(multisig) = &mut input {
            if multisig.needs_import() {
                multisig.import_script_sig(self, index)?;
            }
        }
        input.add_signature(self, signature)?;
        self.inputs[index] = input;
        Ok(())
    }

    /// Sign every input `key` can satisfy with ECDSA; returns the number
    /// of signatures applied
    pub fn sign(&mut self, key: &PrivateKey, sighash_type: u8) -> Result<usize> {
        self.sign_with(key, sighash_type, SigningMethod::Ecdsa)
    }

    pub fn sign_with(
        &mut self,
        key: &PrivateKey,
        sighash_type: u8,
        signing_method: SigningMethod,
    ) -> Result<usize> {
        let signatures = self.get_signatures_with(key, sighash_type, signing_method)?;
        for signature in &signatures {
            self.apply_signature(signature)?;
        }
        log::debug!(
            "applied {} signatures from {} to {}",
            signatures.len(),
            key.public_key(),
            self.id()
        );
        Ok(signatures.len())
    }

    /// Re-populate multisig slots from the scriptSigs already present, e.g.
    /// after [`Transaction::parse`]; returns the number of dropped signatures
    pub fn import_multisig_signatures(&mut self) -> Result<usize> {
        let mut dropped = 0;
        for index in 0..self.inputs.len() {
            if let Input::MultiSig(input) = &self.inputs[index] {
                let mut input = input.clone();
                dropped += input.import_script_sig(self, index)?;
                self.inputs[index] = Input::MultiSig(input);
            }
        }
        Ok(dropped)
    }

    pub fn is_fully_signed(&self) -> bool {
        self.inputs.iter().all(Input::is_fully_signed)
    }

    /// Upper bound on the serialized size once every input is signed
    pub fn estimate_size(&self) -> usize {
        // marker, flag and an empty stack per non-witness input
        let witness_header = if self.inputs.iter().any(Input::spends_witness) {
            2 + self.inputs.iter().filter(|input| !input.spends_witness()).count()
        } else {
            0
        };
        4 + witness_header
            + varint_size(self.inputs.len() as u64)
            + self.inputs.iter().map(Input::estimate_size).sum::<usize>()
            + varint_size(self.outputs.len() as u64)
            + self.outputs.iter().map(Output::size).sum::<usize>()
            + 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PublicKeyHashInput;

    fn key() -> PrivateKey {
        PrivateKey::from_bytes(&[7u8; 32]).unwrap()
    }

    fn funded_tx() -> Transaction {
        let script = Script::build_public_key_hash_out(&key().public_key().hash160());
        let base = TxInput::new([0x11; 32], 1).with_output(Output::new(50_000, script.clone()));
        let mut tx = Transaction::new();
        tx.add_input(Input::PublicKeyHash(PublicKeyHashInput::new(base).unwrap()));
        tx.add_output(Output::new(40_000, script));
        tx
    }

    #[test]
    fn test_output_round_trip() {
        let output = Output::new(1234, Script(vec![0x51]));
        let bytes = output.to_bytes();
        assert_eq!(bytes.len(), output.size());
        assert_eq!(Output::from_bytes(&bytes).unwrap(), output);
    }

    #[test]
    fn test_tx_input_wire_order() {
        let mut prev = [0u8; 32];
        prev[0] = 0xaa;
        let input = TxInput::new(prev, 2);
        let bytes = input.to_bytes();
        assert_eq!(bytes[31], 0xaa);
        assert_eq!(&bytes[32..36], &[2, 0, 0, 0]);
        assert_eq!(bytes.len(), 41);
        assert_eq!(TxInput::from_bytes(&bytes).unwrap(), input);
    }

    #[test]
    fn test_null_and_final() {
        let coinbase = TxInput::new([0u8; 32], NULL_OUTPUT_INDEX);
        assert!(coinbase.is_null());
        assert!(coinbase.is_final());
        let mut input = TxInput::new([1u8; 32], 0);
        input.sequence_number = 0;
        assert!(!input.is_null());
        assert!(!input.is_final());
    }

    #[test]
    fn test_sign_and_parse() {
        let mut tx = funded_tx();
        assert!(!tx.is_fully_signed());
        assert_eq!(tx.sign(&key(), SIGHASH_ALL).unwrap(), 1);
        assert!(tx.is_fully_signed());

        let connected = vec![tx.inputs[0].base().connected_output().unwrap().clone()];
        let parsed = Transaction::parse(&tx.to_bytes(), &connected).unwrap();
        assert_eq!(parsed.id(), tx.id());
        assert!(parsed.is_fully_signed());
    }

    #[test]
    fn test_segwit_serialization() {
        let mut tx = funded_tx();
        let legacy = tx.to_bytes();
        assert!(!tx.has_witness());
        assert_eq!(tx.witness_hash(), tx.hash());

        tx.inputs[0].base_mut().witness = vec![Vec::new(), vec![0xab; 3]];
        let segwit = tx.to_bytes();
        assert_eq!(&segwit[4..6], &[SEGWIT_MARKER, SEGWIT_FLAG]);
        // marker, flag, item count, empty item, sized item
        assert_eq!(segwit.len(), legacy.len() + 2 + 1 + 1 + 4);
        assert_eq!(tx.to_bytes_without_witness(), legacy);
        assert_eq!(tx.hash(), sha256d(&legacy));
        assert_ne!(tx.witness_hash(), tx.hash());

        let mut reader = BufferReader::new(&segwit);
        reader.read(4).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0);
        assert_eq!(reader.peek_u8(), Ok(1));
    }

    #[test]
    fn test_parse_requires_matching_outputs() {
        let tx = funded_tx();
        assert!(matches!(
            Transaction::parse(&tx.to_bytes(), &[]),
            Err(SignerError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_apply_signature_index_out_of_range() {
        let mut tx = funded_tx();
        let mut signature = tx.get_signatures(&key(), SIGHASH_ALL).unwrap().remove(0);
        signature.input_index = 5;
        assert_eq!(
            tx.apply_signature(&signature),
            Err(SignerError::InputIndexOutOfRange { index: 5, len: 1 })
        );
    }
}
