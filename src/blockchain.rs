// src/blockchain.rs - the ordered chain of blocks
//
// No persistence layer: a restarted node starts from a fresh genesis
// block and rediscovers the rest of the chain over the network (see
// SPEC_FULL.md §6). This intentionally drops the RocksDB column-family
// store the reference crate carried.
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::error::{PaliError, Result};
use crate::merkle::MerkleTree;

pub const GENESIS_LEAF: &str = "Genesis Block";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub difficulty: usize,
}

impl Blockchain {
    pub fn new(difficulty: usize) -> Self {
        Blockchain {
            chain: vec![Self::create_genesis_block()],
            difficulty,
        }
    }

    pub fn create_genesis_block() -> Block {
        let tree = MerkleTree::new(vec![GENESIS_LEAF.to_string()]);
        Block::new(0, tree, "0".to_string(), 0, 0.0, String::new())
    }

    pub fn height(&self) -> u64 {
        self.chain.len() as u64
    }

    pub fn latest_block(&self) -> &Block {
        self.chain.last().expect("chain always has a genesis block")
    }

    /// Append a block unconditionally. Callers must validate first
    /// with `is_block_valid` — this mirrors the reference
    /// `append_block`, which performs no checks of its own.
    pub fn append_block(&mut self, block: Block) {
        self.chain.push(block);
    }

    /// index == current height, PoW satisfied, links to the tip, and
    /// the stored hash matches a recomputation.
    pub fn is_block_valid(&self, block: &Block) -> bool {
        self.validate_block(block).is_ok()
    }

    /// As `is_block_valid`, but reports *why* a block was rejected via
    /// the §7 error taxonomy instead of collapsing everything to a
    /// bool — used by callers that want to log or surface the reason
    /// (the hot path in `Node`/`miner` still uses the cheaper bool
    /// form).
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        if block.index != self.height() {
            return Err(PaliError::bad_linkage(format!(
                "block index {} does not match expected height {}",
                block.index,
                self.height()
            )));
        }
        if block.previous_hash != self.latest_block().hash {
            return Err(PaliError::bad_linkage(format!(
                "block {} previous_hash does not match tip hash",
                block.index
            )));
        }
        if block.hash != block.calculate_hash() {
            return Err(PaliError::bad_linkage(format!(
                "block {} stored hash does not match its recomputed hash",
                block.index
            )));
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(PaliError::BadPoW);
        }
        Ok(())
    }

    /// Re-verify every non-genesis block's hash, linkage, and PoW.
    pub fn is_chain_valid(&self) -> std::result::Result<(), String> {
        for i in 1..self.chain.len() {
            let current = &self.chain[i];
            let previous = &self.chain[i - 1];
            if current.hash != current.calculate_hash() {
                return Err(format!(
                    "hash of block {} does not match its calculated hash",
                    current.index
                ));
            }
            if current.previous_hash != previous.hash {
                return Err(format!(
                    "previous_hash of block {} does not match the hash of block {}",
                    current.index, previous.index
                ));
            }
            if !current.meets_difficulty(self.difficulty) {
                return Err(format!(
                    "hash of block {} does not satisfy difficulty {}",
                    current.index, self.difficulty
                ));
            }
        }
        Ok(())
    }

    /// Serialize every block except genesis, matching the reference
    /// `to_json`/`from_json` pair: genesis is always recreated locally
    /// rather than carried over the wire.
    pub fn to_wire_json(&self) -> Result<String> {
        serde_json::to_string(&self.chain[1..]).map_err(PaliError::Json)
    }

    pub fn from_wire_json(json: &str, difficulty: usize) -> Result<Self> {
        let blocks: Vec<Block> = serde_json::from_str(json).map_err(PaliError::Json)?;
        let mut chain = Blockchain::new(difficulty);
        for block in blocks {
            chain.append_block(block);
        }
        Ok(chain)
    }
}
