//! Base58 and Base58Check string encoding (Bitcoin alphabet)

use crate::error::{Result, SignerError};
use crate::hash::sha256d;

/// Encode bytes; each leading zero byte becomes a leading '1'
pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string
pub fn decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, index } => {
            SignerError::InvalidCharacter { character, index }
        }
        bs58::decode::Error::NonAsciiCharacter { index } => SignerError::InvalidCharacter {
            character: s[index..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER),
            index,
        },
        other => SignerError::InvalidEncoding(other.to_string()),
    })
}

/// Base58 of `payload || sha256d(payload)[..4]`
pub fn encode_check(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..4]);
    encode(&data)
}

/// Decode and strip a 4-byte checksum
pub fn decode_check(s: &str) -> Result<Vec<u8>> {
    let mut data = decode(s)?;
    if data.len() < 4 {
        return Err(SignerError::InvalidChecksum);
    }
    let split = data.len() - 4;
    let checksum = sha256d(&data[..split]);
    if checksum[..4] != data[split..] {
        return Err(SignerError::InvalidChecksum);
    }
    data.truncate(split);
    Ok(data)
}
