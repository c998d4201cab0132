// src/crypto.rs - keypairs, address derivation, ECDSA sign/verify
//
// Address derivation and the transaction-signing digest intentionally
// follow the reference implementation's exact (slightly unusual) steps
// rather than a more conventional scheme — see DESIGN.md Open Questions
// 2 and 3. Interop with the reference node depends on preserving both
// bit-for-bit.
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::error::{PaliError, Result};

/// A secp256k1 keypair plus the derived address, the node's identity
/// for signing and receiving coinbase rewards.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: SecretKey,
    pub public_key: Vec<u8>,
    pub address: String,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (sk, pk) = secp.generate_keypair(&mut OsRng);
        let public_key = uncompressed_public_key(&pk);
        let address = derive_address(&public_key);
        KeyPair {
            private_key: sk,
            public_key,
            address,
        }
    }

    pub fn from_private_key(private_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let pk = PublicKey::from_secret_key(&secp, &private_key);
        let public_key = uncompressed_public_key(&pk);
        let address = derive_address(&public_key);
        KeyPair {
            private_key,
            public_key,
            address,
        }
    }

    /// Sign the ASCII-hex string form of a transaction hash. The
    /// reference node hashes the *hex string representation* of the
    /// transaction hash, not its raw bytes, before running ECDSA — an
    /// easy detail to get wrong but required for interop.
    pub fn sign_tx_hash(&self, tx_hash_hex: &str) -> Signature {
        let digest = sha256_of_hex_string(tx_hash_hex);
        let secp = Secp256k1::new();
        let message = Message::from_digest(digest);
        secp.sign_ecdsa(&message, &self.private_key)
    }
}

/// Uncompressed secp256k1 public key with the `0x04` prefix byte, as
/// produced by `ecdsa.VerifyingKey` serialization in the reference
/// implementation.
fn uncompressed_public_key(pk: &PublicKey) -> Vec<u8> {
    pk.serialize_uncompressed().to_vec()
}

/// `SHA256(ASCII(hex(tx_hash)))` — the message digest ECDSA actually
/// signs/verifies over. See module docs.
pub fn sha256_of_hex_string(hex_str: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(hex_str.as_bytes());
    hasher.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Derive an address from an uncompressed public key:
///
///   1. SHA256(pubkey)
///   2. RIPEMD160(step 1)
///   3. prefix with the 0x00 network byte
///   4. checksum = first 4 bytes of SHA256(SHA256(step 3))
///   5. Base58-encode(step 3 || checksum)
///   6. "0x" + hex(step 5)      <-- the unusual part: the Base58 text
///      itself gets hex-encoded again rather than used directly.
///
/// This loses Base58's brevity, but the reference node's peers and
/// wallet files all expect addresses in this doubly-encoded form, so
/// it's preserved rather than "fixed". See DESIGN.md Open Question 3.
pub fn derive_address(public_key: &[u8]) -> String {
    let sha = Sha256::digest(public_key);
    let ripemd = Ripemd160::digest(sha);

    let mut payload = Vec::with_capacity(21);
    payload.push(0x00u8);
    payload.extend_from_slice(&ripemd);

    let checksum_full = Sha256::digest(Sha256::digest(&payload));
    let checksum = &checksum_full[..4];

    let mut binary_address = payload;
    binary_address.extend_from_slice(checksum);

    let base58 = bs58::encode(&binary_address).into_string();
    format!("0x{}", hex::encode(base58.as_bytes()))
}

/// Verify a transaction signature against the sender's public key and
/// the (hex-string) transaction hash. Strips the `0x04` prefix byte
/// before reconstructing the verifying key, matching the reference.
pub fn verify_signature(public_key: &[u8], tx_hash_hex: &str, signature: &Signature) -> bool {
    let stripped = if public_key.first() == Some(&0x04) {
        &public_key[1..]
    } else {
        public_key
    };
    let Ok(pk) = PublicKey::from_slice(&prefix_uncompressed(stripped)) else {
        return false;
    };
    let digest = sha256_of_hex_string(tx_hash_hex);
    let secp = Secp256k1::new();
    let message = Message::from_digest(digest);
    secp.verify_ecdsa(&message, signature, &pk).is_ok()
}

/// `secp256k1::PublicKey::from_slice` expects the leading 0x04 tag for
/// the uncompressed form; re-attach it after stripping above.
fn prefix_uncompressed(stripped: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(stripped.len() + 1);
    full.push(0x04);
    full.extend_from_slice(stripped);
    full
}

/// Parse a DER-less compact ECDSA signature back from its 64-byte
/// compact wire form, as carried in `Transaction::signature`.
pub fn signature_from_compact(bytes: &[u8]) -> Result<Signature> {
    Signature::from_compact(bytes).map_err(PaliError::Secp256k1)
}
