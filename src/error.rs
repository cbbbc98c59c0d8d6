//! Error types for signing and proof verification

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("Read out of bounds: requested {requested} bytes, {remaining} remaining")]
    OutOfBounds { requested: usize, remaining: usize },

    #[error("Varint value {0} cannot be represented without precision loss")]
    PrecisionLoss(u64),

    #[error("Invalid base58 character {character:?} at index {index}")]
    InvalidCharacter { character: char, index: usize },

    #[error("Invalid base58check checksum")]
    InvalidChecksum,

    #[error("Input has no connected output")]
    MissingConnectedOutput,

    #[error("Script mismatch: {0}")]
    ScriptMismatch(String),

    #[error("Public key not part of this input: {0}")]
    UnknownPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Input already has all required signatures")]
    AlreadyFullySigned,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid recovery point: {0}")]
    InvalidRecoveryPoint(String),

    #[error("Invalid merkle tree: {0}")]
    InvalidMerkleTree(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Input index {index} out of range for {len} inputs")]
    InputIndexOutOfRange { index: usize, len: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SignerError>;
