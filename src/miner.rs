// src/miner.rs - candidate-block construction and the nonce search
//
// Grounded in §4.8's seven-step cycle: snapshot mempool, build a
// coinbase, assemble + reverify the candidate (dropping anything the
// UTXO index now rejects), then search nonces until the block meets
// difficulty or an external block interrupts the attempt. Kept as pure
// functions over `Blockchain`/`UtxoIndex` snapshots rather than a
// `Miner` struct holding locks directly, so the search loop can run
// without holding the chain lock (§5: "never held while doing network
// I/O" — the same principle applies to the CPU-bound nonce search).
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::block::Block;
use crate::blockchain::Blockchain;
use crate::merkle::MerkleTree;
use crate::transaction::{Transaction, COINBASE_AMOUNT};
use crate::utxo::{self, UtxoIndex};

/// The outcome of one successful mining cycle: the mined block, plus
/// the transactions it actually confirmed (coinbase included) so the
/// caller can purge them from the mempool, and the ones dropped along
/// the way as invalid so the caller can purge those too.
pub struct MiningAttempt {
    pub block: Block,
    pub confirmed: Vec<Transaction>,
    pub invalid: Vec<Transaction>,
}

/// Run one full mining cycle against a snapshot of chain state. Returns
/// `None` if `found_external` is set before a valid nonce is found —
/// the caller is expected to retry from a fresh snapshot once the
/// winning external block has been applied.
pub fn mine_candidate(
    chain: &Blockchain,
    utxo: &UtxoIndex,
    mempool_snapshot: Vec<Transaction>,
    data_snapshot: Vec<String>,
    miner_address: &str,
    found_external: &AtomicBool,
) -> Option<MiningAttempt> {
    let height = chain.height();
    let mut coinbase = Transaction::new_coinbase(miner_address.to_string(), height);
    coinbase.finalize_hash();
    // `new_coinbase` already backfills the output's own tx_hash against
    // its own computed hash; `finalize_hash` stores the same value on
    // the transaction itself so it serializes as a normal transaction.
    assert_eq!(coinbase.tx_hash.as_deref(), Some(coinbase.outputs[0].tx_hash.as_str()));

    let mut pending = mempool_snapshot;
    let mut invalid_total = Vec::new();

    let previous_hash = chain.latest_block().hash.clone();
    let timestamp = now_as_f64();

    loop {
        let mut leaves: Vec<String> = Vec::with_capacity(1 + pending.len() + data_snapshot.len());
        leaves.push(serde_json::to_string(&coinbase).expect("coinbase always serializes"));
        for tx in &pending {
            leaves.push(serde_json::to_string(tx).expect("mempool transaction always serializes"));
        }
        leaves.extend(data_snapshot.iter().cloned());

        let tree = MerkleTree::new(leaves);
        let candidate = Block::new(
            height,
            tree,
            previous_hash.clone(),
            0,
            timestamp,
            miner_address.to_string(),
        );

        let (all_valid, invalid) = utxo::verify_block_transactions(utxo, &candidate);
        if all_valid {
            let confirmed = {
                let mut v = Vec::with_capacity(1 + pending.len());
                v.push(coinbase.clone());
                v.extend(pending.clone());
                v
            };
            let block = search_nonce(candidate, chain.difficulty, found_external)?;
            return Some(MiningAttempt {
                block,
                confirmed,
                invalid: invalid_total,
            });
        }

        // Drop exactly the non-coinbase transactions the validator
        // rejected and rebuild; the coinbase itself is never in
        // `invalid` (the validator never signature-checks it).
        let invalid_hashes: Vec<Option<String>> =
            invalid.iter().map(|t| t.tx_hash.clone()).collect();
        pending.retain(|tx| !invalid_hashes.contains(&tx.tx_hash));
        invalid_total.extend(invalid);
        // A coinbase-only block always passes `verify_block_transactions`
        // (the coinbase is never signature-checked), so this loop always
        // terminates once every invalid mempool transaction is dropped.
    }
}

/// The inner nonce search: try nonces from zero, recomputing the hash
/// each time, until proof-of-work is satisfied (`is_block_valid`
/// doubles as the PoW predicate during mining — §9 Open Question 1) or
/// `found_external` is set by an accepted external block.
fn search_nonce(mut block: Block, difficulty: usize, found_external: &AtomicBool) -> Option<Block> {
    let mut nonce = 0u64;
    loop {
        if found_external.load(Ordering::SeqCst) {
            debug!("mining interrupted by external block at height {}", block.index);
            return None;
        }
        block.nonce = nonce;
        block.rehash();
        if block.meets_difficulty(difficulty) {
            return Some(block);
        }
        nonce = nonce.wrapping_add(1);
    }
}

fn now_as_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::Utxo;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn mines_coinbase_only_block_at_low_difficulty() {
        let chain = Blockchain::new(1);
        let utxo = UtxoIndex::new();
        let flag = AtomicBool::new(false);
        let attempt =
            mine_candidate(&chain, &utxo, Vec::new(), Vec::new(), "0xminer", &flag).unwrap();
        assert!(attempt.block.meets_difficulty(1));
        assert_eq!(attempt.confirmed.len(), 1);
        assert!(attempt.invalid.is_empty());
    }

    #[test]
    fn drops_invalid_mempool_transaction_and_still_mines() {
        let chain = Blockchain::new(1);
        let utxo = UtxoIndex::new();
        let sender = KeyPair::generate();

        // references a UTXO that doesn't exist in the index.
        let mut bad_tx = Transaction::new();
        bad_tx.add_input(Utxo {
            tx_hash: "nonexistent".into(),
            output_index: 0,
            amount: 10,
            recipient_address: sender.address.clone(),
        });
        bad_tx.add_output(10, "0xsomeone".into());
        bad_tx.finalize_hash();
        bad_tx.sign(&sender).unwrap();

        let flag = AtomicBool::new(false);
        let attempt =
            mine_candidate(&chain, &utxo, vec![bad_tx.clone()], Vec::new(), "0xminer", &flag)
                .unwrap();
        assert_eq!(attempt.confirmed.len(), 1, "only the coinbase should confirm");
        assert_eq!(attempt.invalid.len(), 1);
        assert_eq!(attempt.invalid[0].tx_hash, bad_tx.tx_hash);
    }

    #[test]
    fn interrupted_by_found_external_returns_none() {
        let chain = Blockchain::new(64); // unreachable difficulty within the test
        let utxo = UtxoIndex::new();
        let flag = AtomicBool::new(true);
        let attempt = mine_candidate(&chain, &utxo, Vec::new(), Vec::new(), "0xminer", &flag);
        assert!(attempt.is_none());
    }

    #[test]
    fn data_queue_entries_become_extra_merkle_leaves() {
        let chain = Blockchain::new(1);
        let utxo = UtxoIndex::new();
        let flag = AtomicBool::new(false);
        let attempt = mine_candidate(
            &chain,
            &utxo,
            Vec::new(),
            vec!["hello from a peer".to_string()],
            "0xminer",
            &flag,
        )
        .unwrap();
        assert_eq!(attempt.block.merkle_tree.leaf_count(), 2);
    }
}
