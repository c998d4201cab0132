// src/transaction.rs - UTXO outputs and the UTXO-model Transaction
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, KeyPair};
use crate::error::{PaliError, Result};

pub const COINBASE_AMOUNT: u64 = 50;

/// A single unspent transaction output: who can spend it, how much,
/// and which transaction/output-index it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    pub amount: u64,
    pub recipient_address: String,
}

impl Utxo {
    pub fn key(&self) -> (String, u32) {
        (self.tx_hash.clone(), self.output_index)
    }
}

/// A UTXO-model transaction. A coinbase transaction has no inputs,
/// exactly one output of `COINBASE_AMOUNT`, and no signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<Utxo>,
    pub tx_hash: Option<String>,
    #[serde(with = "option_bytes_base64")]
    pub signature: Option<Vec<u8>>,
    #[serde(with = "option_bytes_base64")]
    pub sender_public_key: Option<Vec<u8>>,
    pub block_index: Option<u64>,
}

mod option_bytes_base64 {
    use super::BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&BASE64.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        match encoded {
            Some(s) => BASE64
                .decode(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            inputs: Vec::new(),
            outputs: Vec::new(),
            tx_hash: None,
            signature: None,
            sender_public_key: None,
            block_index: None,
        }
    }

    pub fn add_input(&mut self, utxo: Utxo) {
        self.inputs.push(utxo);
    }

    pub fn add_output(&mut self, amount: u64, recipient_address: String) {
        let output_index = self.outputs.len() as u32;
        self.outputs.push(Utxo {
            tx_hash: self.tx_hash.clone().unwrap_or_default(),
            output_index,
            amount,
            recipient_address,
        });
    }

    /// Build a coinbase transaction crediting `recipient_address` with
    /// `COINBASE_AMOUNT`, stamped with `block_index`. Output's
    /// `tx_hash` is backfilled once the transaction's own hash is
    /// known, matching the two-step construction in the reference
    /// miner (the output's `tx_hash` field can't be set until the
    /// transaction it belongs to has been hashed).
    pub fn new_coinbase(recipient_address: String, block_index: u64) -> Self {
        let mut tx = Transaction::new();
        tx.outputs.push(Utxo {
            tx_hash: String::new(),
            output_index: 0,
            amount: COINBASE_AMOUNT,
            recipient_address,
        });
        tx.block_index = Some(block_index);
        let hash = tx.calculate_hash();
        tx.tx_hash = Some(hash.clone());
        tx.outputs[0].tx_hash = hash;
        tx
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty() && self.signature.is_none()
    }

    /// The canonical string the transaction hash and signature are
    /// computed over: inputs as `tx_hash:output_index`, outputs as
    /// `amount:recipient_address`, followed by the block index.
    pub fn content_string(&self) -> String {
        let mut s = String::new();
        for utxo in &self.inputs {
            s.push_str(&format!("{}:{}", utxo.tx_hash, utxo.output_index));
        }
        for output in &self.outputs {
            s.push_str(&format!("{}:{}", output.amount, output.recipient_address));
        }
        s.push_str(&match self.block_index {
            Some(i) => i.to_string(),
            None => "None".to_string(),
        });
        s
    }

    pub fn calculate_hash(&self) -> String {
        crypto::sha256_hex(self.content_string().as_bytes())
    }

    /// Hash the transaction and store the result in `tx_hash`.
    pub fn finalize_hash(&mut self) -> String {
        let hash = self.calculate_hash();
        self.tx_hash = Some(hash.clone());
        hash
    }

    /// Sign the transaction with `keypair`. Requires `tx_hash` to
    /// already be set.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let tx_hash = self
            .tx_hash
            .clone()
            .ok_or_else(|| PaliError::decode("cannot sign a transaction without a tx_hash"))?;
        let signature = keypair.sign_tx_hash(&tx_hash);
        self.signature = Some(signature.serialize_compact().to_vec());
        self.sender_public_key = Some(keypair.public_key.clone());
        Ok(())
    }

    /// Verify the transaction's signature against its own
    /// `sender_public_key` and `tx_hash`. Coinbase transactions are
    /// never signed and always fail this check — callers must special
    /// case coinbase transactions themselves, matching the reference
    /// validator.
    pub fn verify_signature(&self) -> bool {
        let (Some(tx_hash), Some(sig_bytes), Some(pubkey)) =
            (&self.tx_hash, &self.signature, &self.sender_public_key)
        else {
            return false;
        };
        let Ok(signature) = crypto::signature_from_compact(sig_bytes) else {
            return false;
        };
        crypto::verify_signature(pubkey, tx_hash, &signature)
    }

    pub fn total_output_amount(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

pub type TxSignature = Signature;
