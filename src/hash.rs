//! Hash primitives used by sighash, addresses and merkle proofs

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::*;

/// SHA256(x)
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// SHA256(SHA256(x))
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d_concat(&[data])
}

/// SHA256(SHA256(a || b || ...)) without building the concatenation
pub fn sha256d_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = sha256d::Hash::engine();
    for part in parts {
        hasher.input(part);
    }
    let result = sha256d::Hash::from_engine(hasher);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> Hash160 {
    let digest = Ripemd160::digest(Sha256::digest(data));
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&digest);
    hash
}
