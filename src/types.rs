//! Core types shared across the signing engine

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// HASH160 digest: RIPEMD160(SHA256(x))
pub type Hash160 = [u8; 20];

/// Signing progress of a single input
///
/// Unsigned → PartiallySigned → FullySigned, driven by `add_signature`.
/// `clear_signatures` returns to Unsigned from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningState {
    Unsigned,
    PartiallySigned,
    FullySigned,
}

impl SigningState {
    /// State for `present` signatures out of `required`
    pub fn from_counts(present: usize, required: usize) -> Self {
        if present == 0 {
            SigningState::Unsigned
        } else if present < required {
            SigningState::PartiallySigned
        } else {
            SigningState::FullySigned
        }
    }
}

/// Signature scheme for new input signatures
///
/// Schnorr is only valid on chains that adopted the Bitcoin Cash
/// 64-byte signature format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMethod {
    #[default]
    Ecdsa,
    Schnorr,
}
