//! Merkle blocks: block headers with a partial merkle tree (BIP 37)
//!
//! The partial tree is a depth-first walk over the block's merkle tree. One
//! flag bit per visited node says whether the node is an ancestor of (or is)
//! a matched transaction; nodes that are leaves or non-ancestors carry their
//! hash, all others are recomputed from their children.

use serde::{Deserialize, Serialize};

use crate::codec::{BufferReader, BufferWriter, Serializable};
use crate::constants::*;
use crate::error::{Result, SignerError};
use crate::hash::{sha256d, sha256d_concat};
use crate::types::*;

/// 80-byte block header
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// sha256d of the header, wire order
    pub fn hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }

    /// Display-order hex id
    pub fn id(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        hex::encode(hash)
    }
}

impl Serializable for BlockHeader {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self> {
        Ok(BlockHeader {
            version: reader.read_i32_le()?,
            prev_hash: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            time: reader.read_u32_le()?,
            bits: reader.read_u32_le()?,
            nonce: reader.read_u32_le()?,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        writer
            .write_i32_le(self.version)
            .write(&self.prev_hash)
            .write(&self.merkle_root)
            .write_u32_le(self.time)
            .write_u32_le(self.bits)
            .write_u32_le(self.nonce);
    }
}

/// Width of the tree at `height` above the leaves: ⌈n / 2^height⌉
pub fn tree_width(num_transactions: u32, height: u32) -> u64 {
    let n = u64::from(num_transactions);
    (n + (1u64 << height) - 1) >> height
}

/// Smallest height whose width is at most one
pub fn tree_height(num_transactions: u32) -> u32 {
    let mut height = 0;
    while tree_width(num_transactions, height) > 1 {
        height += 1;
    }
    height
}

/// Merkle root of a full list of wire-order transaction hashes
///
/// An odd node at any level is paired with itself.
pub fn compute_merkle_root(hashes: &[Hash]) -> Result<Hash> {
    if hashes.is_empty() {
        return Err(SignerError::InvalidMerkleTree(
            "cannot compute merkle root of zero transactions".to_string(),
        ));
    }
    let mut level = hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                sha256d_concat(&[&pair[0], right])
            })
            .collect();
    }
    Ok(level[0])
}

/// Per-call traversal state
#[derive(Debug, Default)]
struct Traversal {
    hashes_used: usize,
    flag_bits_used: usize,
    matched: Vec<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub num_transactions: u32,
    /// Wire-order hashes in depth-first order
    pub hashes: Vec<Hash>,
    pub flags: Vec<u8>,
}

impl MerkleBlock {
    /// Build the partial tree proving `matches` within the block's transactions
    ///
    /// `tx_hashes` are the block's wire-order transaction hashes in block
    /// order; `matches[i]` marks transaction `i` for inclusion.
    pub fn from_matches(header: BlockHeader, tx_hashes: &[Hash], matches: &[bool]) -> Result<Self> {
        if tx_hashes.is_empty() || tx_hashes.len() != matches.len() {
            return Err(SignerError::InvalidParameters(format!(
                "{} transaction hashes with {} match flags",
                tx_hashes.len(),
                matches.len()
            )));
        }
        let num_transactions = u32::try_from(tx_hashes.len()).map_err(|_| {
            SignerError::InvalidParameters("too many transactions".to_string())
        })?;

        let mut bits = Vec::new();
        let mut hashes = Vec::new();
        build_partial(
            num_transactions,
            tree_height(num_transactions),
            0,
            tx_hashes,
            matches,
            &mut bits,
            &mut hashes,
        );

        let mut flags = vec![0u8; (bits.len() + 7) / 8];
        for (i, bit) in bits.iter().enumerate() {
            if *bit {
                flags[i / 8] |= 1 << (i % 8);
            }
        }

        Ok(MerkleBlock {
            header,
            num_transactions,
            hashes,
            flags,
        })
    }

    /// ValidMerkleTree: 𝓜 → {true, false}
    ///
    /// 1. |hashes| ≤ num_transactions
    /// 2. 8·|flags| ≥ |hashes|
    /// 3. Traverse from the root; every hash must be consumed
    /// 4. Recomputed root = header.merkle_root
    pub fn valid_merkle_tree(&self) -> bool {
        if !self.structurally_sound() {
            return false;
        }
        let mut state = Traversal::default();
        match self.traverse(tree_height(self.num_transactions), 0, &mut state) {
            Some(root) => state.hashes_used == self.hashes.len() && root == self.header.merkle_root,
            None => false,
        }
    }

    /// Wire-order hashes of the matched transactions
    ///
    /// A single hash means the filter matched nothing, so the result is
    /// empty.
    pub fn filtered_tx_hashes(&self) -> Result<Vec<Hash>> {
        if !self.structurally_sound() {
            return Err(SignerError::InvalidMerkleTree(format!(
                "{} hashes, {} flag bytes, {} transactions",
                self.hashes.len(),
                self.flags.len(),
                self.num_transactions
            )));
        }
        if self.hashes.len() == 1 {
            return Ok(Vec::new());
        }
        let mut state = Traversal::default();
        self.traverse(tree_height(self.num_transactions), 0, &mut state)
            .ok_or_else(|| SignerError::InvalidMerkleTree("traversal ran out of data".to_string()))?;
        if state.hashes_used != self.hashes.len() {
            return Err(SignerError::InvalidMerkleTree(format!(
                "{} of {} hashes used",
                state.hashes_used,
                self.hashes.len()
            )));
        }
        Ok(state.matched)
    }

    /// Check the proof against the header and return the matched hashes
    pub fn validate(&self) -> Result<Vec<Hash>> {
        if !self.valid_merkle_tree() {
            return Err(SignerError::InvalidMerkleTree(format!(
                "proof does not commit to merkle root of block {}",
                self.header.id()
            )));
        }
        self.filtered_tx_hashes()
    }

    /// Whether `tx_id` (display order) is among the matched transactions
    pub fn has_transaction(&self, tx_id: &Hash) -> bool {
        let mut wire = *tx_id;
        wire.reverse();
        match self.filtered_tx_hashes() {
            Ok(matched) => matched.contains(&wire),
            Err(_) => false,
        }
    }

    fn structurally_sound(&self) -> bool {
        self.hashes.len() as u64 <= u64::from(self.num_transactions)
            && self.flags.len() * 8 >= self.hashes.len()
    }

    fn flag_bit(&self, index: usize) -> Option<bool> {
        let byte = self.flags.get(index / 8)?;
        Some((byte >> (index % 8)) & 1 == 1)
    }

    /// Node hash at (depth, pos); None when flags or hashes run out
    fn traverse(&self, depth: u32, pos: u64, state: &mut Traversal) -> Option<Hash> {
        let parent_of_match = self.flag_bit(state.flag_bits_used)?;
        state.flag_bits_used += 1;

        if depth == 0 || !parent_of_match {
            let hash = *self.hashes.get(state.hashes_used)?;
            state.hashes_used += 1;
            if depth == 0 && parent_of_match {
                state.matched.push(hash);
            }
            log::trace!("merkle node depth={} pos={} from proof", depth, pos);
            return Some(hash);
        }

        let left = self.traverse(depth - 1, pos * 2, state)?;
        // odd node pairs with itself (CVE-2012-2459)
        let right = if pos * 2 + 1 < tree_width(self.num_transactions, depth - 1) {
            self.traverse(depth - 1, pos * 2 + 1, state)?
        } else {
            left
        };
        Some(sha256d_concat(&[&left, &right]))
    }
}

/// Full-tree node hash at (height, pos)
fn node_hash(num_transactions: u32, height: u32, pos: u64, tx_hashes: &[Hash]) -> Hash {
    if height == 0 {
        return tx_hashes[pos as usize];
    }
    let left = node_hash(num_transactions, height - 1, pos * 2, tx_hashes);
    let right = if pos * 2 + 1 < tree_width(num_transactions, height - 1) {
        node_hash(num_transactions, height - 1, pos * 2 + 1, tx_hashes)
    } else {
        left
    };
    sha256d_concat(&[&left, &right])
}

fn build_partial(
    num_transactions: u32,
    height: u32,
    pos: u64,
    tx_hashes: &[Hash],
    matches: &[bool],
    bits: &mut Vec<bool>,
    hashes: &mut Vec<Hash>,
) {
    let start = (pos << height) as usize;
    let end = (((pos + 1) << height) as usize).min(tx_hashes.len());
    let parent_of_match = matches[start..end].iter().any(|m| *m);
    bits.push(parent_of_match);

    if height == 0 || !parent_of_match {
        hashes.push(node_hash(num_transactions, height, pos, tx_hashes));
        return;
    }
    build_partial(num_transactions, height - 1, pos * 2, tx_hashes, matches, bits, hashes);
    if pos * 2 + 1 < tree_width(num_transactions, height - 1) {
        build_partial(num_transactions, height - 1, pos * 2 + 1, tx_hashes, matches, bits, hashes);
    }
}

impl Serializable for MerkleBlock {
    fn read(reader: &mut BufferReader<'_>) -> Result<Self> {
        let header = BlockHeader::read(reader)?;
        let num_transactions = reader.read_u32_le()?;
        let hash_count = reader.read_count(32)?;
        let mut hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            hashes.push(reader.read_hash()?);
        }
        let flags = reader.read_var_length_buffer()?.to_vec();
        Ok(MerkleBlock {
            header,
            num_transactions,
            hashes,
            flags,
        })
    }

    fn write(&self, writer: &mut BufferWriter) {
        self.header.write(writer);
        writer.write_u32_le(self.num_transactions);
        writer.write_varint(self.hashes.len() as u64);
        for hash in &self.hashes {
            writer.write(hash);
        }
        writer.write_var_length_buffer(&self.flags);
    }
}
