// src/mempool.rs - the unconfirmed-transaction pool (P)
//
// Order-preserving, deduplicated by `tx_hash`, per §3. Guarded by its
// own lock in `Node` (the "mempool lock" of §5) — this type itself is
// not thread-safe, it's the thing the lock protects.
use crate::transaction::Transaction;

#[derive(Debug, Default)]
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Insert `tx` if no transaction with the same `tx_hash` is already
    /// present. Returns `false` (and drops `tx`) on a duplicate.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        if tx.tx_hash.is_some()
            && self
                .transactions
                .iter()
                .any(|existing| existing.tx_hash == tx.tx_hash)
        {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// A copy of the current pool, in insertion order, for the miner
    /// to build a candidate block from.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    /// Drop every transaction whose `tx_hash` appears in `confirmed` —
    /// called once a block containing them has been accepted (§8
    /// invariant 9: mempool purge).
    pub fn remove_confirmed(&mut self, confirmed: &[Transaction]) {
        let hashes: Vec<&String> = confirmed.iter().filter_map(|t| t.tx_hash.as_ref()).collect();
        self.transactions
            .retain(|tx| !matches!(&tx.tx_hash, Some(h) if hashes.contains(&h)));
    }

    /// Drop transactions the miner found invalid against the current
    /// UTXO index (duplicate/missing inputs, bad signature, etc.) so
    /// they aren't retried forever.
    pub fn remove_invalid(&mut self, invalid: &[Transaction]) {
        self.remove_confirmed(invalid);
    }
}
