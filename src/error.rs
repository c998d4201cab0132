// src/error.rs - Error taxonomy for the pali-coin node
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PaliError>;

/// Error taxonomy for pali-coin. Each variant corresponds to one of the
/// failure classes a node can encounter: malformed wire data, invalid
/// transactions/blocks, wallet-level problems, and I/O.
#[derive(Error, Debug)]
pub enum PaliError {
    #[error("failed to decode: {0}")]
    Decode(String),

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("double spend of utxo {0}:{1}")]
    DoubleSpend(String, u32),

    #[error("utxo not found: {0}:{1}")]
    UtxoMissing(String, u32),

    #[error("input/output amount mismatch: inputs={inputs} outputs={outputs}")]
    AmountMismatch { inputs: u64, outputs: u64 },

    #[error("block does not satisfy proof of work")]
    BadPoW,

    #[error("block linkage invalid: {0}")]
    BadLinkage(String),

    #[error("invalid coinbase transaction: {0}")]
    BadCoinbase(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl PaliError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        PaliError::Decode(msg.into())
    }

    pub fn bad_linkage<S: Into<String>>(msg: S) -> Self {
        PaliError::BadLinkage(msg.into())
    }

    pub fn bad_coinbase<S: Into<String>>(msg: S) -> Self {
        PaliError::BadCoinbase(msg.into())
    }

    pub fn peer_unreachable<S: Into<String>>(msg: S) -> Self {
        PaliError::PeerUnreachable(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        PaliError::Config(msg.into())
    }

    /// True for errors that §7 policy says should be logged and
    /// swallowed rather than surfaced to a caller (malformed peer
    /// input, unreachable peers).
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            PaliError::PeerUnreachable(_) | PaliError::Decode(_) | PaliError::Io(_)
        )
    }

    /// True for errors that invalidate a transaction or block rather
    /// than indicating a local/programming problem.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            PaliError::SignatureInvalid
                | PaliError::DoubleSpend(_, _)
                | PaliError::UtxoMissing(_, _)
                | PaliError::AmountMismatch { .. }
                | PaliError::BadPoW
                | PaliError::BadLinkage(_)
                | PaliError::BadCoinbase(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            PaliError::Decode(_) => "decode",
            PaliError::SignatureInvalid => "validation",
            PaliError::InsufficientFunds { .. } => "wallet",
            PaliError::DoubleSpend(_, _) => "validation",
            PaliError::UtxoMissing(_, _) => "validation",
            PaliError::AmountMismatch { .. } => "validation",
            PaliError::BadPoW => "validation",
            PaliError::BadLinkage(_) => "validation",
            PaliError::BadCoinbase(_) => "validation",
            PaliError::PeerUnreachable(_) => "network",
            PaliError::Config(_) => "config",
            PaliError::Io(_) => "io",
            PaliError::Json(_) => "decode",
            PaliError::Secp256k1(_) => "crypto",
            PaliError::HexDecode(_) => "decode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(PaliError::BadPoW.category(), "validation");
        assert_eq!(PaliError::config("bad port").category(), "config");
    }

    #[test]
    fn peer_fault_classification() {
        assert!(PaliError::peer_unreachable("10.0.0.1").is_peer_fault());
        assert!(!PaliError::BadPoW.is_peer_fault());
    }

    #[test]
    fn validation_classification() {
        assert!(PaliError::SignatureInvalid.is_validation_error());
        assert!(PaliError::DoubleSpend("abc".into(), 0).is_validation_error());
        assert!(!PaliError::Config("x".into()).is_validation_error());
    }
}
