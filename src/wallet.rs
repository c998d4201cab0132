// src/wallet.rs - keypair + UTXO pool + transaction construction
//
// No on-disk wallet file, no BIP39/argon2/ChaCha20 encryption: the
// reference crate's wallet persistence layer doesn't apply here
// (SPEC_FULL.md Non-goals — no persistence across restarts). A wallet
// is just a keypair and the subset of the global UTXO index that pays
// its address, kept in sync by `Node`'s resync loop.
use log::info;

use crate::crypto::KeyPair;
use crate::error::{PaliError, Result};
use crate::transaction::{Transaction, Utxo};

pub struct Wallet {
    pub keypair: KeyPair,
    pub utxo_pool: Vec<Utxo>,
}

impl Wallet {
    pub fn new() -> Self {
        Wallet {
            keypair: KeyPair::generate(),
            utxo_pool: Vec::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.keypair.address
    }

    pub fn balance(&self) -> u64 {
        self.utxo_pool.iter().map(|u| u.amount).sum()
    }

    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxo_pool.push(utxo);
    }

    /// Replace the wallet's UTXO pool wholesale — called by the
    /// resync loop after the global index changes.
    pub fn resync(&mut self, owned: Vec<Utxo>) {
        self.utxo_pool = owned;
    }

    /// Greedily select UTXOs (in pool order) until their sum covers
    /// `amount`, build a transaction paying `recipient_address` with a
    /// change output back to this wallet if any is left over, hash it,
    /// and sign it. The wallet does not remove the spent UTXOs from
    /// its own pool here — that happens implicitly on the next resync
    /// once the transaction is confirmed, matching the reference
    /// wallet's `create_transaction`.
    pub fn create_transaction(&self, recipient_address: &str, amount: u64) -> Result<Transaction> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in &self.utxo_pool {
            selected.push(utxo.clone());
            total += utxo.amount;
            if total >= amount {
                break;
            }
        }

        if total < amount {
            return Err(PaliError::InsufficientFunds {
                needed: amount,
                available: total,
            });
        }

        let mut tx = Transaction::new();
        for utxo in selected {
            tx.add_input(utxo);
        }
        tx.add_output(amount, recipient_address.to_string());

        let change = total - amount;
        if change > 0 {
            tx.add_output(change, self.address().to_string());
        }

        tx.finalize_hash();
        tx.sign(&self.keypair)?;

        info!(
            "created transaction {} paying {} to {}",
            tx.tx_hash.clone().unwrap_or_default(),
            amount,
            recipient_address
        );
        Ok(tx)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
