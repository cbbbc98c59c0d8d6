//! Wire, script and curve constants

// ============================================================================
// SIGHASH FLAGS
// ============================================================================

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
/// Replay-protection bit used by Bitcoin Cash derived chains
pub const SIGHASH_FORKID: u8 = 0x40;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// Mask selecting the base sighash mode (ALL, NONE, SINGLE)
pub const SIGHASH_BASE_MASK: u8 = 0x1f;

// ============================================================================
// OPCODES
// ============================================================================

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

// ============================================================================
// TRANSACTION DEFAULTS
// ============================================================================

/// Default transaction version
pub const DEFAULT_VERSION: i32 = 2;

/// Final sequence number
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// Output index marking a coinbase input
pub const NULL_OUTPUT_INDEX: u32 = 0xffff_ffff;

/// Segwit serialization marker and flag, in place of the input count
pub const SEGWIT_MARKER: u8 = 0x00;
pub const SEGWIT_FLAG: u8 = 0x01;

/// Maximum number of keys in a standard multisig script
pub const MAX_MULTISIG_KEYS: usize = 16;

// ============================================================================
// SIZE ESTIMATION
// ============================================================================

/// prev tx id (32) + output index (4) + sequence (4)
pub const INPUT_BASE_SIZE: usize = 40;

/// Maximum size of a pushed transaction signature (push byte + DER + sighash)
pub const MAX_SIGNATURE_PUSH_SIZE: usize = 73;

/// Schnorr signature body (r || s)
pub const SCHNORR_SIGNATURE_SIZE: usize = 64;

/// Maximum size of a pushed compressed public key
pub const MAX_PUBKEY_PUSH_SIZE: usize = 34;

/// Leading OP_0 of a multisig scriptSig
pub const OPCODES_SIZE: usize = 1;

// ============================================================================
// NUMERIC LIMITS
// ============================================================================

/// Largest integer exactly representable as an IEEE-754 double
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// secp256k1 group order n
pub const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// n / 2, the largest low-S value
pub const CURVE_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// secp256k1 field prime p
pub const FIELD_PRIME: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe, 0xff, 0xff, 0xfc, 0x2f,
];
