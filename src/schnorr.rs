//! Bitcoin Cash Schnorr signatures over secp256k1
//!
//! Signatures are (r, s) where r is the x coordinate of a nonce point with
//! a square y coordinate and s = k + e·d, e = sha256(r || P || m). The
//! nonce is the RFC 6979 DRBG with the algorithm tag appended to the key
//! and digest, matching libsecp256k1's Schnorr module.

use k256::elliptic_curve::bigint::{Encoding, U256};
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, FieldElement, ProjectivePoint, Scalar};

use crate::constants::*;
use crate::ecdsa::{field_bytes, message_scalar, nonzero_scalar, rfc6979_nonce, to_array, Signature};
use crate::error::{Result, SignerError};
use crate::hash::sha256;
use crate::keys::{PrivateKey, PublicKey};
use crate::types::*;

/// Additional data mixed into the nonce DRBG
pub const NONCE_TAG: &[u8; 16] = b"Schnorr+SHA256  ";

/// Deterministic nonce in [1, n)
pub fn nonce(hash: &Hash, private_key: &[u8; 32]) -> Result<Scalar> {
    rfc6979_nonce(hash, private_key, NONCE_TAG, 0)
}

/// Whether the point's y coordinate is a quadratic residue mod p
fn has_square_y(point: &AffinePoint) -> bool {
    let encoded = point.to_encoded_point(false);
    let y = match encoded.y() {
        Some(y) => y,
        None => return false,
    };
    let y: Option<FieldElement> = FieldElement::from_bytes(y).into();
    y.map_or(false, |y| bool::from(y.sqrt().is_some()))
}

/// e = sha256(r || compressed(P) || m) mod n
fn challenge(r: &[u8; 32], public_key: &PublicKey, hash: &Hash) -> Scalar {
    let mut preimage = Vec::with_capacity(97);
    preimage.extend_from_slice(r);
    preimage.extend_from_slice(&public_key.with_compression(true).to_bytes());
    preimage.extend_from_slice(hash);
    message_scalar(&sha256(&preimage))
}

/// Sign a 32-byte digest
pub fn sign(hash: &Hash, key: &PrivateKey) -> Result<Signature> {
    let key_bytes = key.to_bytes();
    let d = nonzero_scalar(&key_bytes)
        .ok_or_else(|| SignerError::InvalidKey("private key out of range".to_string()))?;

    let k = nonce(hash, &key_bytes)?;
    let big_r = (ProjectivePoint::GENERATOR * k).to_affine();
    let k = if has_square_y(&big_r) { k } else { -k };
    let r = to_array(&big_r.x());

    let e = challenge(&r, &key.public_key(), hash);
    let s = k + e * d;
    Ok(Signature::new(r, to_array(&s.to_bytes())).with_signing_method(SigningMethod::Schnorr))
}

/// R = s·G − e·P must be finite, have a square y and x = r
pub fn verify(hash: &Hash, signature: &Signature, public_key: &PublicKey) -> bool {
    if U256::from_be_bytes(signature.r) >= U256::from_be_bytes(FIELD_PRIME) {
        return false;
    }
    let s: Option<Scalar> = Scalar::from_repr(field_bytes(&signature.s)).into();
    let s = match s {
        Some(s) => s,
        None => return false,
    };
    let q = match public_key.to_affine() {
        Ok(q) => q,
        Err(_) => return false,
    };

    let e = challenge(&signature.r, public_key, hash);
    let big_r = ProjectivePoint::GENERATOR * s - ProjectivePoint::from(q) * e;
    if big_r == ProjectivePoint::IDENTITY {
        return false;
    }
    let big_r = big_r.to_affine();
    has_square_y(&big_r) && to_array(&big_r.x()) == signature.r
}
