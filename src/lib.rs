// src/lib.rs - pali-coin: a small peer-to-peer UTXO cryptocurrency node
//!
//! A replicated append-only ledger of UTXO transactions, secured by
//! proof-of-work and ECDSA, synchronized across a mesh of peers over a
//! plain TCP gossip protocol. See `SPEC_FULL.md` for the full design;
//! this crate is the CORE only — the interactive shell, GUI, and SVG
//! rendering this was built to back are external collaborators.
pub mod block;
pub mod blockchain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod merkle;
pub mod miner;
pub mod node;
pub mod p2p;
pub mod transaction;
pub mod utxo;
pub mod wallet;

pub use block::Block;
pub use blockchain::Blockchain;
pub use config::NodeConfig;
pub use crypto::KeyPair;
pub use error::{PaliError, Result};
pub use merkle::MerkleTree;
pub use node::{Node, NodeEvent};
pub use transaction::{Transaction, Utxo};
pub use utxo::UtxoIndex;
pub use wallet::Wallet;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging at the default (`info`) level, reading
/// `RUST_LOG` if set.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

/// Initialize logging at an explicit level.
pub fn init_logging_with_level(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
