//! secp256k1 key pairs with compression flag and WIF encoding

use std::cmp::Ordering;
use std::fmt;

use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::{AffinePoint, EncodedPoint};
use secp256k1::{Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::base58;
use crate::config::Chain;
use crate::error::{Result, SignerError};
use crate::hash::hash160;
use crate::types::*;

/// Private key; `compressed` selects the public key encoding it signs for
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: SecretKey,
    pub compressed: bool,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key().to_hex())
            .field("compressed", &self.compressed)
            .finish()
    }
}

impl PrivateKey {
    /// Compressed private key from 32 big-endian bytes in (0, n)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(PrivateKey {
            secret,
            compressed: true,
        })
    }

    pub fn uncompressed(mut self) -> Self {
        self.compressed = false;
        self
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::signing_only();
        PublicKey {
            inner: secp256k1::PublicKey::from_secret_key(&secp, &self.secret),
            compressed: self.compressed,
        }
    }

    /// Wallet Import Format: base58check(prefix || key [|| 0x01])
    pub fn to_wif(&self, chain: Chain) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(chain.wif_prefix());
        payload.extend_from_slice(&self.to_bytes());
        if self.compressed {
            payload.push(0x01);
        }
        base58::encode_check(&payload)
    }

    pub fn from_wif(wif: &str, chain: Chain) -> Result<Self> {
        let payload = base58::decode_check(wif)?;
        let compressed = match payload.len() {
            34 if payload[33] == 0x01 => true,
            33 => false,
            len => {
                return Err(SignerError::InvalidEncoding(format!(
                    "WIF payload of {} bytes",
                    len
                )))
            }
        };
        if payload[0] != chain.wif_prefix() {
            return Err(SignerError::InvalidEncoding(format!(
                "WIF prefix 0x{:02x} for chain {:?}",
                payload[0], chain
            )));
        }
        let mut key = Self::from_bytes(&payload[1..33])?;
        key.compressed = compressed;
        Ok(key)
    }
}

/// Public key; equality and ordering follow the serialized form
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    inner: secp256k1::PublicKey,
    pub compressed: bool,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl PublicKey {
    /// Parse a 33-byte compressed or 65-byte uncompressed SEC1 key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = secp256k1::PublicKey::from_slice(bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(PublicKey {
            inner,
            compressed: bytes.len() == 33,
        })
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> ByteString {
        if self.compressed {
            self.inner.serialize().to_vec()
        } else {
            self.inner.serialize_uncompressed().to_vec()
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn hash160(&self) -> Hash160 {
        hash160(&self.to_bytes())
    }

    /// Same curve point, regardless of encoding
    pub fn same_point(&self, other: &PublicKey) -> bool {
        self.inner == other.inner
    }

    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub(crate) fn to_affine(&self) -> Result<AffinePoint> {
        let encoded = EncodedPoint::from_bytes(self.inner.serialize())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| SignerError::InvalidKey("point not on curve".to_string()))
    }

    pub(crate) fn from_affine(point: &AffinePoint, compressed: bool) -> Result<Self> {
        let encoded = point.to_encoded_point(compressed);
        Self::from_bytes(encoded.as_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE_PUB: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn key_one() -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        PrivateKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_public_key_of_one_is_generator() {
        assert_eq!(key_one().public_key().to_hex(), KEY_ONE_PUB);
        let uncompressed = key_one().uncompressed().public_key();
        assert_eq!(uncompressed.to_bytes().len(), 65);
        assert!(uncompressed.same_point(&key_one().public_key()));
        assert_ne!(uncompressed, key_one().public_key());
    }

    #[test]
    fn test_invalid_private_keys() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_err());
        assert!(PrivateKey::from_bytes(&[0xffu8; 32]).is_err());
        assert!(PrivateKey::from_bytes(&[1u8; 31]).is_err());
    }

    #[test]
    fn test_wif_known_vector() {
        let wif = key_one().to_wif(Chain::Bitcoin);
        assert_eq!(wif, "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");
        let back = PrivateKey::from_wif(&wif, Chain::Bitcoin).unwrap();
        assert_eq!(back, key_one());

        let uncompressed = key_one().uncompressed().to_wif(Chain::Bitcoin);
        assert_eq!(uncompressed, "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf");
        assert!(!PrivateKey::from_wif(&uncompressed, Chain::Bitcoin).unwrap().compressed);
    }

    #[test]
    fn test_wif_wrong_chain() {
        let wif = key_one().to_wif(Chain::Litecoin);
        assert!(matches!(
            PrivateKey::from_wif(&wif, Chain::Bitcoin),
            Err(SignerError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_affine_round_trip() {
        let public = key_one().public_key();
        let point = public.to_affine().unwrap();
        assert_eq!(PublicKey::from_affine(&point, true).unwrap(), public);
    }

    #[test]
    fn test_ordering_by_serialized_form() {
        let a = PublicKey::from_hex(KEY_ONE_PUB).unwrap();
        let mut two = [0u8; 32];
        two[31] = 2;
        let b = PrivateKey::from_bytes(&two).unwrap().public_key();
        // 2G has an even y coordinate as well, compare on x
        assert_eq!(a.cmp(&b), a.to_bytes().cmp(&b.to_bytes()));
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), a);
    }
}
