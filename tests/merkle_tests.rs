//! Partial merkle tree construction and verification

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use utxo_signer::merkle::compute_merkle_root;
use utxo_signer::*;

/// Mainnet merkleblock with two transactions, the second one matched
const MERKLE_BLOCK_HEX: &str = "01000000ba8b9cda965dd8e536670f9ddec10e53aab14b20bacad27b9137190000000000190760b278fe7b8565fda3b968b918d5fd997f993b23674c0af3b6fde300b38f33a5914ce6ed5b1b01e32f570200000002252bf9d75c4f481ebb6278d708257d1f12beb6dd30301d26c623f789b2ba6fc0e2d32adb5f8ca820731dff234a84e78ec30bce4ec69dbd562d0b2b8266bf4e5a0105";

fn mainnet_block() -> MerkleBlock {
    MerkleBlock::from_bytes(&hex::decode(MERKLE_BLOCK_HEX).unwrap()).unwrap()
}

fn display_id(s: &str) -> Hash {
    hex::decode(s).unwrap().try_into().unwrap()
}

fn tx_hash(i: usize) -> Hash {
    utxo_signer::hash::sha256d(&(i as u64).to_le_bytes())
}

fn header_for(hashes: &[Hash]) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: [0u8; 32],
        merkle_root: compute_merkle_root(hashes).unwrap(),
        time: 1_296_688_602,
        bits: 0x1d00ffff,
        nonce: 2,
    }
}

// ============================================================================
// MAINNET VECTOR
// ============================================================================

#[test]
fn test_mainnet_merkle_block_parses() {
    let block = mainnet_block();
    assert_eq!(block.header.version, 1);
    assert_eq!(block.num_transactions, 2);
    assert_eq!(block.hashes.len(), 2);
    assert_eq!(block.flags, vec![0x05]);
    assert_eq!(
        block.header.id(),
        "000000000043a8c0fd1d6f726790caa2a406010d19efd2780db27bdbbd93baf6"
    );
    assert_eq!(hex::encode(block.to_bytes()), MERKLE_BLOCK_HEX);
}

#[test]
fn test_mainnet_merkle_block_validates() -> anyhow::Result<()> {
    let block = mainnet_block();
    assert!(block.valid_merkle_tree());

    let matched = block.validate()?;
    assert_eq!(matched, vec![block.hashes[1]]);
    assert_eq!(block.filtered_tx_hashes()?, matched);

    let id = display_id("5a4ebf66822b0b2d56bd9dc64ece0bc38ee7844a23ff1d7320a88c5fdb2ad3e2");
    assert!(block.has_transaction(&id));
    // the unmatched sibling is present as a hash but not as a match
    let mut sibling = block.hashes[0];
    sibling.reverse();
    assert!(!block.has_transaction(&sibling));
    Ok(())
}

#[test]
fn test_mainnet_merkle_block_tampering() {
    let mut root = mainnet_block();
    root.header.merkle_root[0] ^= 1;
    assert!(!root.valid_merkle_tree());
    assert!(matches!(root.validate(), Err(SignerError::InvalidMerkleTree(_))));

    let mut hash = mainnet_block();
    hash.hashes[0][5] ^= 0x80;
    assert!(!hash.valid_merkle_tree());

    let mut flags = mainnet_block();
    flags.flags = vec![0x04];
    assert!(!flags.valid_merkle_tree());

    let mut extra = mainnet_block();
    extra.hashes.push([0u8; 32]);
    assert!(!extra.valid_merkle_tree());
    assert!(extra.filtered_tx_hashes().is_err());

    let mut no_flags = mainnet_block();
    no_flags.flags.clear();
    assert!(!no_flags.valid_merkle_tree());

    let mut truncated = hex::decode(MERKLE_BLOCK_HEX).unwrap();
    truncated.pop();
    assert!(MerkleBlock::from_bytes(&truncated).is_err());
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn test_seven_transactions_one_match() -> anyhow::Result<()> {
    let hashes: Vec<Hash> = (0..7).map(tx_hash).collect();
    let mut matches = vec![false; 7];
    matches[3] = true;

    let block = MerkleBlock::from_matches(header_for(&hashes), &hashes, &matches)?;
    assert_eq!(block.flags, vec![0x2b]);
    assert_eq!(block.hashes.len(), 4);
    assert_eq!(block.validate()?, vec![hashes[3]]);

    // a fifth hash is never consumed
    let mut padded = block.clone();
    padded.hashes.push(hashes[0]);
    assert!(!padded.valid_merkle_tree());
    assert!(matches!(
        padded.filtered_tx_hashes(),
        Err(SignerError::InvalidMerkleTree(_))
    ));
    Ok(())
}

#[test]
fn test_no_matches_yields_root_only() -> anyhow::Result<()> {
    let hashes: Vec<Hash> = (0..5).map(tx_hash).collect();
    let block = MerkleBlock::from_matches(header_for(&hashes), &hashes, &[false; 5])?;
    assert_eq!(block.hashes, vec![block.header.merkle_root]);
    assert!(block.valid_merkle_tree());
    assert!(block.validate()?.is_empty());
    Ok(())
}

#[test]
fn test_random_blocks_recover_matches() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(37);
    for n in 2..=64usize {
        let hashes: Vec<Hash> = (0..n).map(|i| tx_hash(i * 1000 + n)).collect();
        let matches: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.2)).collect();
        let expected: Vec<Hash> = hashes
            .iter()
            .zip(&matches)
            .filter(|(_, m)| **m)
            .map(|(h, _)| *h)
            .collect();

        let block = MerkleBlock::from_matches(header_for(&hashes), &hashes, &matches)?;
        assert!(block.hashes.len() <= n);
        let parsed = MerkleBlock::from_bytes(&block.to_bytes())?;
        assert_eq!(parsed, block);
        assert_eq!(parsed.validate()?, expected, "block of {} transactions", n);
    }
    Ok(())
}

#[test]
fn test_from_matches_rejects_mismatched_lengths() {
    let hashes: Vec<Hash> = (0..3).map(tx_hash).collect();
    assert!(matches!(
        MerkleBlock::from_matches(header_for(&hashes), &hashes, &[true]),
        Err(SignerError::InvalidParameters(_))
    ));
    assert!(MerkleBlock::from_matches(header_for(&hashes), &[], &[]).is_err());
}

#[test]
fn test_engine_merkle_facade() -> anyhow::Result<()> {
    let engine = SigningEngine::new();
    let block = mainnet_block();
    assert!(engine.validate_merkle_block(&block));
    assert_eq!(engine.filtered_transactions(&block)?, vec![block.hashes[1]]);
    Ok(())
}
