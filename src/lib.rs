//! # UTXO Signer
//!
//! Transaction-signing and merkle-proof engine for Bitcoin-derived UTXO
//! chains (Bitcoin, Bitcoin Cash, Litecoin, Dogecoin, eCash).
//!
//! The crate turns prior outputs into signable inputs, produces
//! deterministic chain-specific signatures for each input according to its
//! redemption type, tracks multi-party signing progress, and verifies that
//! a merkle block's partial tree commits to the transactions it claims.
//!
//! ## Layers
//!
//! - Codec: byte cursors, varints, base58
//! - Crypto: hashes, keys, RFC 6979 ECDSA with low-S and key recovery,
//!   Bitcoin Cash Schnorr
//! - Signing: legacy, fork-id and witness sighash, the per-input state
//!   machine, multisig normalization
//! - Proofs: merkle blocks
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: no I/O, no global state, nothing shared between calls
//! 2. **Bit-exact Encodings**: byte order and sighash match consensus peers
//! 3. **Exact Version Pinning**: all signature-critical dependencies pinned to exact versions
//! 4. **Fail Closed**: malformed proofs and signatures are errors, never partial successes
//!
//! ## Usage
//!
//! ```rust
//! use utxo_signer::{Input, Output, PrivateKey, Script, SigningEngine, Transaction, TxInput};
//!
//! let engine = SigningEngine::new();
//! let key = PrivateKey::from_bytes(&[1u8; 32]).unwrap();
//! let locking = Script::build_public_key_hash_out(&key.public_key().hash160());
//!
//! let base = TxInput::new([7u8; 32], 0).with_output(Output::new(10_000, locking.clone()));
//! let mut tx = Transaction::new();
//! tx.add_input(Input::select(base).unwrap());
//! tx.add_output(Output::new(9_000, locking));
//!
//! assert_eq!(engine.sign_transaction(&mut tx, &key).unwrap(), 1);
//! assert!(tx.is_fully_signed());
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod config;
pub mod codec;
pub mod base58;
pub mod hash;
pub mod keys;
pub mod ecdsa;
pub mod schnorr;
pub mod script;
pub mod transaction;
pub mod sighash;
pub mod input;
pub mod multisig;
pub mod merkle;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{Result, SignerError};
pub use config::{Chain, SignerConfig};
pub use codec::{BufferReader, BufferWriter, Serializable};
pub use keys::{PrivateKey, PublicKey};
pub use ecdsa::Signature;
pub use script::{Script, ScriptType};
pub use transaction::{Output, Transaction, TxInput};
pub use input::{Input, PublicKeyHashInput, PublicKeyInput, TransactionSignature};
pub use sighash::SigVersion;
pub use multisig::{MultiSigInput, MultiSigKind, NormalizedSignatures};
pub use merkle::{BlockHeader, MerkleBlock};

/// Configured entry point over the signing and proof modules
///
/// # Examples
///
/// ```
/// use utxo_signer::{Chain, SignerConfig, SigningEngine, SIGHASH_ALL, SIGHASH_FORKID};
///
/// let engine = SigningEngine::with_config(SignerConfig::for_chain(Chain::BitcoinCash));
/// assert_eq!(engine.sighash_type(), SIGHASH_ALL | SIGHASH_FORKID);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SigningEngine {
    config: SignerConfig,
}

impl SigningEngine {
    /// Engine with the default (Bitcoin, SIGHASH_ALL, sorted keys) configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use utxo_signer::SigningEngine;
    ///
    /// let engine = SigningEngine::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SignerConfig) -> Self {
        SigningEngine { config }
    }

    /// Engine from a JSON configuration document
    ///
    /// # Examples
    ///
    /// ```
    /// use utxo_signer::{Chain, SigningEngine};
    ///
    /// let engine = SigningEngine::from_json(r#"{"chain": "litecoin"}"#).unwrap();
    /// assert_eq!(engine.config().chain, Chain::Litecoin);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(SigningEngine {
            config: SignerConfig::from_json(json)?,
        })
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    pub fn sighash_type(&self) -> u8 {
        self.config.sighash_type()
    }

    /// Sign every input `key` can satisfy with the configured sighash type
    /// and signing method
    pub fn sign_transaction(&self, tx: &mut Transaction, key: &PrivateKey) -> Result<usize> {
        tx.sign_with(key, self.sighash_type(), self.config.signing_method)
    }

    /// Multisig input over `public_keys`, sorted when the configuration says so
    pub fn multisig_input(
        &self,
        base: TxInput,
        public_keys: Vec<PublicKey>,
        threshold: usize,
    ) -> Result<Input> {
        Ok(Input::MultiSig(MultiSigInput::new(
            base,
            public_keys,
            threshold,
            self.config.sort_public_keys,
        )?))
    }

    /// Sign a raw 32-byte digest
    ///
    /// # Examples
    ///
    /// ```
    /// use utxo_signer::{PrivateKey, SigningEngine};
    ///
    /// let engine = SigningEngine::new();
    /// let key = PrivateKey::from_bytes(&[3u8; 32]).unwrap();
    /// let digest = [0x5a; 32];
    /// let signature = engine.sign_hash(&digest, &key).unwrap();
    /// assert!(signature.has_low_s());
    /// assert!(engine.verify_hash(&digest, &signature, &key.public_key()));
    /// ```
    pub fn sign_hash(&self, hash: &Hash, key: &PrivateKey) -> Result<Signature> {
        sighash::sign_digest(hash, key, self.config.signing_method)
    }

    /// Verify a raw digest under the signature's own scheme, low-S for ECDSA
    pub fn verify_hash(&self, hash: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
        sighash::verify_digest(hash, signature, public_key)
    }

    /// Key that produced `signature`, using its recovery id
    pub fn recover_public_key(&self, hash: &Hash, signature: &Signature) -> Result<PublicKey> {
        let recovery_id = signature.recovery_id.ok_or_else(|| {
            SignerError::InvalidSignature("signature has no recovery id".to_string())
        })?;
        ecdsa::recover_public_key(hash, signature, recovery_id, true)
    }

    pub fn validate_merkle_block(&self, block: &MerkleBlock) -> bool {
        block.valid_merkle_tree()
    }

    /// Matched transaction hashes of a merkle block whose root checks out
    pub fn filtered_transactions(&self, block: &MerkleBlock) -> Result<Vec<Hash>> {
        block.validate()
    }
}
