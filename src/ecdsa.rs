//! Deterministic ECDSA over secp256k1
//!
//! Nonces follow RFC 6979 (HMAC-SHA256) and are byte-identical to
//! libsecp256k1's default nonce function. Every produced signature is
//! low-S normalized and carries the recovery id of its nonce point.
//!
//! Scalar and point arithmetic comes from `k256`; DER parsing and
//! serialization from `secp256k1`.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::bigint::{Encoding, Limb, U256};
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::{AffineCoordinates, DecompressPoint};
use k256::elliptic_curve::scalar::IsHigh;
use k256::elliptic_curve::subtle::Choice;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, FieldBytes, ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::constants::*;
use crate::error::{Result, SignerError};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::*;

type HmacSha256 = Hmac<Sha256>;

/// Signature (r, s) as 32-byte big-endian integers
///
/// ECDSA signatures travel as DER; Schnorr signatures as the raw 64 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// 0..=3, set by signing or recovery
    pub recovery_id: Option<u8>,
    /// Trailing byte of the transaction encoding
    pub sighash_type: Option<u8>,
    #[serde(default)]
    pub signing_method: SigningMethod,
}

impl Signature {
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Signature {
            r,
            s,
            recovery_id: None,
            sighash_type: None,
            signing_method: SigningMethod::Ecdsa,
        }
    }

    pub fn with_signing_method(mut self, signing_method: SigningMethod) -> Self {
        self.signing_method = signing_method;
        self
    }

    pub fn is_schnorr(&self) -> bool {
        self.signing_method == SigningMethod::Schnorr
    }

    pub fn with_sighash_type(mut self, sighash_type: u8) -> Self {
        self.sighash_type = Some(sighash_type);
        self
    }

    /// s ≤ n/2
    pub fn has_low_s(&self) -> bool {
        self.s <= CURVE_HALF_ORDER
    }

    /// r || s
    pub fn to_compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }

    pub fn from_compact(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            return Err(SignerError::InvalidEncoding(format!(
                "compact signature of {} bytes",
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature::new(r, s))
    }

    /// Strict DER encoding
    pub fn to_der(&self) -> Result<ByteString> {
        let sig = secp256k1::ecdsa::Signature::from_compact(&self.to_compact())
            .map_err(|e| SignerError::InvalidEncoding(e.to_string()))?;
        Ok(sig.serialize_der().to_vec())
    }

    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let sig = secp256k1::ecdsa::Signature::from_der(bytes)
            .map_err(|e| SignerError::InvalidEncoding(e.to_string()))?;
        Self::from_compact(&sig.serialize_compact())
    }

    /// DER (ECDSA) or r || s (Schnorr), followed by the sighash byte
    pub fn to_tx_format(&self) -> Result<ByteString> {
        let sighash_type = self.sighash_type.ok_or_else(|| {
            SignerError::InvalidEncoding("signature has no sighash type".to_string())
        })?;
        let mut out = match self.signing_method {
            SigningMethod::Ecdsa => self.to_der()?,
            SigningMethod::Schnorr => self.to_compact().to_vec(),
        };
        out.push(sighash_type);
        Ok(out)
    }

    /// A 64-byte body is always Schnorr; anything else must be DER
    pub fn from_tx_format(bytes: &[u8]) -> Result<Self> {
        let (sighash_type, body) = bytes
            .split_last()
            .ok_or_else(|| SignerError::InvalidEncoding("empty signature".to_string()))?;
        let signature = if body.len() == SCHNORR_SIGNATURE_SIZE {
            Self::from_compact(body)?.with_signing_method(SigningMethod::Schnorr)
        } else {
            Self::from_der(body)?
        };
        Ok(signature.with_sighash_type(*sighash_type))
    }

    /// 65-byte recoverable form: header (27 + id, +4 when compressed) || r || s
    pub fn to_compact_recoverable(&self, compressed: bool) -> Result<[u8; 65]> {
        let recovery_id = self.recovery_id.ok_or_else(|| {
            SignerError::InvalidEncoding("signature has no recovery id".to_string())
        })?;
        let mut out = [0u8; 65];
        out[0] = 27 + recovery_id + if compressed { 4 } else { 0 };
        out[1..].copy_from_slice(&self.to_compact());
        Ok(out)
    }

    /// Returns the signature and whether the signer's key was compressed
    pub fn from_compact_recoverable(bytes: &[u8]) -> Result<(Self, bool)> {
        if bytes.len() != 65 {
            return Err(SignerError::InvalidEncoding(format!(
                "recoverable signature of {} bytes",
                bytes.len()
            )));
        }
        let header = bytes[0];
        if !(27..=34).contains(&header) {
            return Err(SignerError::InvalidEncoding(format!(
                "recoverable signature header {}",
                header
            )));
        }
        let compressed = header >= 31;
        let recovery_id = (header - 27) & 3;
        let mut sig = Self::from_compact(&bytes[1..])?;
        sig.recovery_id = Some(recovery_id);
        Ok((sig, compressed))
    }
}

pub(crate) fn field_bytes(bytes: &[u8; 32]) -> FieldBytes {
    FieldBytes::from(*bytes)
}

pub(crate) fn to_array(bytes: &FieldBytes) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(bytes);
    out
}

/// Scalar in [1, n), None otherwise
pub(crate) fn nonzero_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    let scalar: Option<Scalar> = Scalar::from_repr(field_bytes(bytes)).into();
    scalar.filter(|s| !bool::from(s.is_zero()))
}

/// Message digest as an integer mod n
pub(crate) fn message_scalar(hash: &Hash) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&field_bytes(hash))
}

fn hmac_sha256(key: &[u8; 32], parts: &[&[u8]]) -> Result<[u8; 32]> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// RFC 6979 nonce, skipping `badrs` valid candidates
///
/// A non-zero `badrs` is only needed when a previous candidate produced
/// r = 0 or s = 0.
pub fn deterministic_k(hash: &Hash, private_key: &[u8; 32], badrs: u32) -> Result<Scalar> {
    rfc6979_nonce(hash, private_key, &[], badrs)
}

/// HMAC-DRBG seeded with key || digest || `extra`, as in RFC 6979 §3.2
pub(crate) fn rfc6979_nonce(
    hash: &Hash,
    private_key: &[u8; 32],
    extra: &[u8],
    badrs: u32,
) -> Result<Scalar> {
    let mut v = [0x01u8; 32];
    let mut k = [0x00u8; 32];
    k = hmac_sha256(&k, &[&v, &[0x00], private_key, hash, extra])?;
    v = hmac_sha256(&k, &[&v])?;
    k = hmac_sha256(&k, &[&v, &[0x01], private_key, hash, extra])?;
    v = hmac_sha256(&k, &[&v])?;

    let mut skip = badrs;
    loop {
        v = hmac_sha256(&k, &[&v])?;
        if let Some(candidate) = nonzero_scalar(&v) {
            if skip == 0 {
                return Ok(candidate);
            }
            skip -= 1;
        }
        k = hmac_sha256(&k, &[&v, &[0x00]])?;
        v = hmac_sha256(&k, &[&v])?;
    }
}

/// Sign a 32-byte digest
pub fn sign(hash: &Hash, key: &PrivateKey) -> Result<Signature> {
    let key_bytes = key.to_bytes();
    let d = nonzero_scalar(&key_bytes)
        .ok_or_else(|| SignerError::InvalidKey("private key out of range".to_string()))?;
    let e = message_scalar(hash);

    let mut badrs = 0u32;
    loop {
        let k = deterministic_k(hash, &key_bytes, badrs)?;
        let big_r = (ProjectivePoint::GENERATOR * k).to_affine();
        let x = big_r.x();
        let r = <Scalar as Reduce<U256>>::reduce_bytes(&x);

        let k_inv: Option<Scalar> = k.invert().into();
        let s = k_inv.map(|k_inv| k_inv * (e + r * d));
        let s = match s {
            Some(s) if !bool::from(r.is_zero()) && !bool::from(s.is_zero()) => s,
            _ => {
                log::debug!("degenerate signature candidate, retry {}", badrs + 1);
                badrs += 1;
                continue;
            }
        };

        let mut recovery_id = u8::from(bool::from(big_r.y_is_odd()));
        if Option::<Scalar>::from(Scalar::from_repr(x)).is_none() {
            recovery_id |= 2;
        }
        let s = if bool::from(s.is_high()) {
            recovery_id ^= 1;
            -s
        } else {
            s
        };

        return Ok(Signature {
            r: to_array(&r.to_bytes()),
            s: to_array(&s.to_bytes()),
            recovery_id: Some(recovery_id),
            sighash_type: None,
            signing_method: SigningMethod::Ecdsa,
        });
    }
}

/// Accepts any s in (0, n)
pub fn verify(hash: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
    let (r, s) = match (nonzero_scalar(&signature.r), nonzero_scalar(&signature.s)) {
        (Some(r), Some(s)) => (r, s),
        _ => return false,
    };
    let q = match public_key.to_affine() {
        Ok(q) => q,
        Err(_) => return false,
    };
    let s_inv: Option<Scalar> = s.invert().into();
    let s_inv = match s_inv {
        Some(s_inv) => s_inv,
        None => return false,
    };

    let u1 = message_scalar(hash) * s_inv;
    let u2 = r * s_inv;
    let point = ProjectivePoint::GENERATOR * u1 + ProjectivePoint::from(q) * u2;
    if point == ProjectivePoint::IDENTITY {
        return false;
    }
    let x = point.to_affine().x();
    <Scalar as Reduce<U256>>::reduce_bytes(&x) == r
}

/// Like [`verify`] but rejects high-S signatures
pub fn verify_low_s(hash: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
    signature.has_low_s() && verify(hash, signature, public_key)
}

/// Reconstruct the signing key from a signature and recovery id
///
/// Q = r⁻¹ (s·R − e·G), where R has x = r (+ n when id ≥ 2) and the y
/// parity given by the low bit of the id.
pub fn recover_public_key(
    hash: &Hash,
    signature: &Signature,
    recovery_id: u8,
    compressed: bool,
) -> Result<PublicKey> {
    if recovery_id > 3 {
        return Err(SignerError::InvalidRecoveryPoint(format!(
            "recovery id {} out of range",
            recovery_id
        )));
    }
    let r = nonzero_scalar(&signature.r)
        .ok_or_else(|| SignerError::InvalidSignature("r out of range".to_string()))?;
    let s = nonzero_scalar(&signature.s)
        .ok_or_else(|| SignerError::InvalidSignature("s out of range".to_string()))?;

    let x = if recovery_id & 2 != 0 {
        let (sum, carry) = U256::from_be_bytes(signature.r)
            .adc(&U256::from_be_bytes(CURVE_ORDER), Limb::ZERO);
        if carry.0 != 0 || sum >= U256::from_be_bytes(FIELD_PRIME) {
            return Err(SignerError::InvalidRecoveryPoint(
                "r + n is not a field element".to_string(),
            ));
        }
        sum.to_be_bytes()
    } else {
        signature.r
    };

    let big_r: Option<AffinePoint> =
        AffinePoint::decompress(&field_bytes(&x), Choice::from(recovery_id & 1)).into();
    let big_r = big_r.ok_or_else(|| {
        SignerError::InvalidRecoveryPoint("x is not on the curve".to_string())
    })?;

    let r_inv: Option<Scalar> = r.invert().into();
    let r_inv = r_inv.ok_or_else(|| SignerError::InvalidSignature("r not invertible".to_string()))?;
    let e = message_scalar(hash);
    let q = (ProjectivePoint::from(big_r) * s - ProjectivePoint::GENERATOR * e) * r_inv;
    if q == ProjectivePoint::IDENTITY {
        return Err(SignerError::InvalidRecoveryPoint(
            "recovered point at infinity".to_string(),
        ));
    }
    PublicKey::from_affine(&q.to_affine(), compressed)
}

/// Find the recovery id that yields `public_key`
pub fn calculate_recovery_id(
    hash: &Hash,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<u8> {
    for id in 0..4u8 {
        match recover_public_key(hash, signature, id, public_key.compressed) {
            Ok(candidate) if candidate.same_point(public_key) => return Ok(id),
            _ => continue,
        }
    }
    Err(SignerError::InvalidRecoveryPoint(
        "no recovery id matches the public key".to_string(),
    ))
}
