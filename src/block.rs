// src/block.rs - block header + embedded Merkle tree
use serde::{Deserialize, Serialize};

use crate::crypto::sha256_hex;
use crate::merkle::MerkleTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub merkle_tree: MerkleTree,
    pub merkle_root: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
    /// IP/identity of the node that mined this block. Used by peers
    /// to know who to ask for the full chain when they fall behind
    /// (§9 Open Question 4) and as the coinbase recipient lookup.
    pub miner_address: String,
}

impl Block {
    /// Construct a new block and compute its hash. `nonce` starts
    /// wherever the caller wants (mining re-calls this repeatedly, or
    /// mutates `nonce`/`hash` directly in the search loop — see
    /// `Block::with_nonce`).
    pub fn new(
        index: u64,
        merkle_tree: MerkleTree,
        previous_hash: String,
        nonce: u64,
        timestamp: f64,
        miner_address: String,
    ) -> Self {
        let merkle_root = merkle_tree.root_hash().to_string();
        let mut block = Block {
            index,
            timestamp,
            merkle_tree,
            merkle_root,
            previous_hash,
            nonce,
            hash: String::new(),
            miner_address,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// `SHA256(index || timestamp || merkle_root || previous_hash || nonce)`,
    /// each field converted to its display/string form before
    /// concatenation, matching the reference block hash exactly.
    pub fn calculate_hash(&self) -> String {
        let mut content = String::new();
        content.push_str(&self.index.to_string());
        content.push_str(&format_timestamp(self.timestamp));
        content.push_str(&self.merkle_root);
        content.push_str(&self.previous_hash);
        content.push_str(&self.nonce.to_string());
        sha256_hex(content.as_bytes())
    }

    /// Recompute and store `hash` after mutating `nonce` — the inner
    /// loop of the mining search.
    pub fn rehash(&mut self) {
        self.hash = self.calculate_hash();
    }

    /// True iff `hash` has at least `difficulty` leading hex-zero
    /// characters. A string predicate, not a bit-count — fixed
    /// difficulty only, no retargeting (see SPEC_FULL.md §9).
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.hash.starts_with(&"0".repeat(difficulty))
    }
}

/// Python's `str(float)` and Rust's default f64 Display diverge for
/// integral values (`0.0` vs `0`), which would break hash compatibility
/// with peers running the reference node. This reproduces Python's
/// `repr`/`str` formatting for the timestamps this node ever produces
/// (`time.time()`-style values and the genesis block's literal `0`).
fn format_timestamp(ts: f64) -> String {
    if ts == ts.trunc() && ts.is_finite() {
        format!("{:.1}", ts)
    } else {
        format!("{}", ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(nonce: u64) -> Block {
        let tree = crate::merkle::MerkleTree::new(vec!["leaf".into()]);
        Block::new(1, tree, "0".repeat(64), nonce, 1700000000.5, "127.0.0.1".into())
    }

    #[test]
    fn hash_changes_with_nonce() {
        let a = sample_block(0);
        let b = sample_block(1);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn hash_is_deterministic() {
        let a = sample_block(7);
        let b = sample_block(7);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn difficulty_predicate_checks_leading_hex_zeros() {
        let mut block = sample_block(0);
        block.hash = "000001234".to_string();
        assert!(block.meets_difficulty(5));
        assert!(!block.meets_difficulty(6));
    }

    #[test]
    fn json_round_trip_preserves_hash() {
        let block = sample_block(42);
        let json = serde_json::to_string(&block).unwrap();
        let decoded: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.hash, block.hash);
        assert_eq!(decoded.merkle_root, block.merkle_root);
        assert_eq!(decoded.calculate_hash(), block.hash);
    }

    #[test]
    fn genesis_timestamp_formats_like_reference() {
        let tree = crate::merkle::MerkleTree::new(vec!["Genesis Block".into()]);
        let genesis = Block::new(0, tree, "0".into(), 0, 0.0, String::new());
        assert_eq!(format_timestamp(genesis.timestamp), "0.0");
    }
}
