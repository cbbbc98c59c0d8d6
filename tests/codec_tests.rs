//! Tests for the byte codec, varints and base58

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use utxo_signer::codec::encode_varint;
use utxo_signer::*;

// ============================================================================
// VARINT
// ============================================================================

#[test]
fn test_varint_round_trip() -> anyhow::Result<()> {
    let values = [
        0u64,
        1,
        252,
        253,
        254,
        0xffff,
        0x10000,
        0xffff_ffff,
        0x1_0000_0000,
        (1u64 << 53) - 1,
    ];
    for value in values {
        let mut writer = BufferWriter::new();
        writer.write_varint(value);
        let bytes = writer.into_bytes();
        assert_eq!(bytes, encode_varint(value));

        let mut reader = BufferReader::new(&bytes);
        assert_eq!(reader.read_varint_num()?, value);
        assert!(reader.finished());

        let mut raw = BufferReader::new(&bytes);
        assert_eq!(raw.read_varint_buf()?, &bytes[..]);
    }
    Ok(())
}

#[test]
fn test_varint_two_pow_53_loses_precision() {
    let mut bytes = vec![0xff];
    bytes.extend_from_slice(&(1u64 << 53).to_le_bytes());
    let mut reader = BufferReader::new(&bytes);
    assert_eq!(
        reader.read_varint_num(),
        Err(SignerError::PrecisionLoss(1u64 << 53))
    );
}

#[test]
fn test_varint_truncated() {
    let mut reader = BufferReader::new(&[0xfe, 0x01, 0x02]);
    assert!(matches!(
        reader.read_varint_u64(),
        Err(SignerError::OutOfBounds { requested: 4, remaining: 2 })
    ));
}

#[test]
fn test_var_length_buffer_round_trip() -> anyhow::Result<()> {
    let payload = vec![0x5a; 300];
    let mut writer = BufferWriter::new();
    writer.write_var_length_buffer(&payload).write_u8(0x01);
    let bytes = writer.into_bytes();
    assert_eq!(&bytes[..3], &[0xfd, 0x2c, 0x01]);

    let mut reader = BufferReader::new(&bytes);
    assert_eq!(reader.read_var_length_buffer()?, &payload[..]);
    assert_eq!(reader.read_u8()?, 0x01);
    assert!(reader.finished());
    Ok(())
}

#[test]
fn test_fixed_width_mirror() -> anyhow::Result<()> {
    let mut writer = BufferWriter::new();
    writer
        .write_u16_le(0xbeef)
        .write_u16_be(0xbeef)
        .write_u32_be(0xdead_beef)
        .write_i32_le(-2)
        .write_u64_be(0x0102_0304_0506_0708)
        .write_u64_le(u64::MAX);
    let bytes = writer.to_bytes();

    let mut reader = BufferReader::new(&bytes);
    assert_eq!(reader.read_u16_le()?, 0xbeef);
    assert_eq!(reader.read_u16_be()?, 0xbeef);
    assert_eq!(reader.read_u32_be()?, 0xdead_beef);
    assert_eq!(reader.read_i32_le()?, -2);
    assert_eq!(reader.read_u64_be()?, 0x0102_0304_0506_0708);
    assert_eq!(reader.read_u64_le()?, u64::MAX);
    assert!(reader.read_u8().is_err());
    Ok(())
}

// ============================================================================
// BASE58
// ============================================================================

#[test]
fn test_base58_round_trip_lengths() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(58);
    for len in 0..=64 {
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        // keep some leading zeros in play
        if len > 2 && len % 3 == 0 {
            bytes[0] = 0;
            bytes[1] = 0;
        }
        let encoded = base58::encode(&bytes);
        assert_eq!(base58::decode(&encoded)?, bytes);
        let zeros = bytes.iter().take_while(|b| **b == 0).count();
        assert!(encoded.starts_with(&"1".repeat(zeros)));
    }
    Ok(())
}

#[test]
fn test_base58_rejects_ambiguous_characters() {
    for bad in ['0', 'O', 'I', 'l'] {
        let input = format!("11{}2", bad);
        assert_eq!(
            base58::decode(&input),
            Err(SignerError::InvalidCharacter { character: bad, index: 2 })
        );
    }
}

#[test]
fn test_base58check_wif_prefix_survives() -> anyhow::Result<()> {
    let payload = [0x80u8, 0x01, 0x02];
    let encoded = base58::encode_check(&payload);
    assert_eq!(base58::decode_check(&encoded)?, payload.to_vec());
    Ok(())
}
