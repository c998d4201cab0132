// src/config.rs - node configuration
//
// Trimmed down from the reference crate's `PaliConfig` (which also
// carried database/security/mining-pool/reward-halving sections that
// don't apply here — see DESIGN.md). What's left is exactly what the
// distilled spec treats as implicit constants or stdin input: the
// node's own identity, the fixed port, the peer seed list, and the
// fixed proof-of-work difficulty.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PaliError, Result};

/// Default peer-gossip port (§6). Fixed, not user-facing in the
/// distilled spec, but exposed here so tests can bind an ephemeral
/// port without colliding with a real node.
pub const DEFAULT_PORT: u16 = 5000;

/// Reference proof-of-work difficulty (§4.5): five leading hex-zero
/// characters. Kept as a config knob so tests can mine against a
/// lower difficulty quickly; production deployments should leave this
/// at 5.
pub const DEFAULT_DIFFICULTY: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's identity and bind address. The distilled spec reads
    /// this from a single stdin line at startup; the config layer
    /// exists so it can also be supplied non-interactively.
    pub listen_ip: String,
    pub port: u16,
    /// Seed peer table, seeded with `127.0.0.1` by default (§9 Open
    /// Question 5 — multi-host deployments must override this).
    pub seed_peers: Vec<String>,
    pub difficulty: usize,
    pub hello_interval_secs: u64,
    pub peer_timeout_secs: u64,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_ip: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            seed_peers: vec!["127.0.0.1".to_string()],
            difficulty: DEFAULT_DIFFICULTY,
            hello_interval_secs: 5,
            peer_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(PaliError::Io)?;
        let config: NodeConfig =
            toml::from_str(&text).map_err(|e| PaliError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| PaliError::config(e.to_string()))?;
        fs::write(path, text).map_err(PaliError::Io)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_ip.trim().is_empty() {
            return Err(PaliError::config("listen_ip must not be empty"));
        }
        if self.port == 0 {
            return Err(PaliError::config("port must be nonzero"));
        }
        if self.difficulty == 0 {
            return Err(PaliError::config(
                "difficulty must be at least 1 (0 accepts any hash)",
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.port)
    }
}
