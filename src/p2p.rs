// src/p2p.rs - wire protocol and peer table
//
// The reference protocol is deliberately primitive: every message is
// one fresh TCP connection, a tag prefix, a UTF-8 payload, and then
// the sender closes — there is no length prefix, EOF is the frame
// delimiter (§4.9, §6). That's a blocking, one-shot-per-message model,
// not the persistent async connections the enterprise-grade reference
// crate's `p2p`/`network` modules were built around (service flags,
// ban scores, stratum mining pools — none of it named by this spec).
// This module reproduces the protocol as described: `std::net` plus
// `std::thread`, matching the reference crate's own use of
// `std::thread::JoinHandle` for its background loops.
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::block::Block;
use crate::error::{PaliError, Result};
use crate::transaction::Transaction;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// One peer-gossip wire message, tagged per §4.9's table. `encode`/
/// `decode` are the inverse of each other for every variant.
#[derive(Debug, Clone)]
pub enum Message {
    Data(String),
    Hello(String),
    Join(String),
    Intro(String),
    OneBlock(Block),
    BlockchainRequest(String),
    BlockchainResponse(String),
    Transaction(Transaction),
}

impl Message {
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Message::Data(payload) => format!("@DATA{payload}"),
            Message::Hello(addr) => format!("@HELLO{addr}"),
            Message::Join(addr) => format!("@JOIN{addr}"),
            Message::Intro(addr) => format!("#INTRO{addr}"),
            Message::OneBlock(block) => {
                format!("@ONEBLOCK{}", serde_json::to_string(block).map_err(PaliError::Json)?)
            }
            Message::BlockchainRequest(addr) => format!("@BLOCKCHAIN{addr}"),
            Message::BlockchainResponse(chain_json) => format!("#BLOCKCHAIN{chain_json}"),
            Message::Transaction(tx) => {
                format!("@TRANSACTION{}", serde_json::to_string(tx).map_err(PaliError::Json)?)
            }
        })
    }

    /// Dispatch on prefix, longest/most-specific tags first so that
    /// e.g. `@BLOCKCHAIN` isn't mistaken for a shorter tag.
    pub fn decode(raw: &str) -> Result<Message> {
        let tagged = |tag: &str| raw.strip_prefix(tag).map(|rest| rest.to_string());

        if let Some(payload) = tagged("@ONEBLOCK") {
            let block: Block = serde_json::from_str(&payload).map_err(PaliError::Json)?;
            return Ok(Message::OneBlock(block));
        }
        if let Some(payload) = tagged("@BLOCKCHAIN") {
            return Ok(Message::BlockchainRequest(payload));
        }
        if let Some(payload) = tagged("#BLOCKCHAIN") {
            return Ok(Message::BlockchainResponse(payload));
        }
        if let Some(payload) = tagged("@TRANSACTION") {
            let tx: Transaction = serde_json::from_str(&payload).map_err(PaliError::Json)?;
            return Ok(Message::Transaction(tx));
        }
        if let Some(payload) = tagged("@HELLO") {
            return Ok(Message::Hello(payload));
        }
        if let Some(payload) = tagged("@JOIN") {
            return Ok(Message::Join(payload));
        }
        if let Some(payload) = tagged("#INTRO") {
            return Ok(Message::Intro(payload));
        }
        if let Some(payload) = tagged("@DATA") {
            return Ok(Message::Data(payload));
        }
        Err(PaliError::decode(format!("unrecognized message tag in {raw:?}")))
    }
}

/// Open a fresh connection to `addr:port`, write the encoded message,
/// and close. Best-effort: an unreachable peer is reported as
/// `PeerUnreachable`, which callers log and swallow (§7) rather than
/// letting one dead peer block the gossip loop.
pub fn send_message(addr: &str, port: u16, message: &Message) -> Result<()> {
    let target = (addr, port)
        .to_socket_addrs()
        .map_err(|e| PaliError::peer_unreachable(format!("{addr}:{port}: {e}")))?
        .next()
        .ok_or_else(|| PaliError::peer_unreachable(format!("{addr}:{port}: no resolvable address")))?;

    let mut stream = TcpStream::connect_timeout(&target, CONNECT_TIMEOUT)
        .map_err(|e| PaliError::peer_unreachable(format!("{addr}:{port}: {e}")))?;
    let body = message.encode()?;
    stream
        .write_all(body.as_bytes())
        .map_err(|e| PaliError::peer_unreachable(format!("{addr}:{port}: {e}")))?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .map_err(|e| PaliError::peer_unreachable(format!("{addr}:{port}: {e}")))?;
    debug!("sent {} bytes to {}:{}", body.len(), addr, port);
    Ok(())
}

/// Read one message off an already-accepted connection: read until
/// EOF, then decode by prefix.
pub fn read_message(mut stream: TcpStream) -> Result<Message> {
    let mut buf = String::new();
    stream.read_to_string(&mut buf).map_err(PaliError::Io)?;
    Message::decode(&buf)
}

/// `peers: set<Addr>` plus `hello_dict: map<Addr, last_seen_ts>` (§4.9).
/// Seeded with `127.0.0.1` unless the node's config overrides it.
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: HashMap<String, Instant>,
}

impl PeerTable {
    pub fn new(seed_peers: &[String]) -> Self {
        let now = Instant::now();
        let peers = seed_peers.iter().cloned().map(|p| (p, now)).collect();
        PeerTable { peers }
    }

    pub fn addrs(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Record that `addr` is alive right now, adding it if unseen.
    pub fn mark_seen(&mut self, addr: &str) {
        self.peers.insert(addr.to_string(), Instant::now());
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.peers.contains_key(addr)
    }

    /// Drop every peer whose last `mark_seen` is older than `timeout`,
    /// returning the evicted addresses (for logging).
    pub fn evict_stale(&mut self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, last_seen)| now.duration_since(**last_seen) > timeout)
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in &stale {
            self.peers.remove(addr);
            warn!("evicting unresponsive peer {addr}");
        }
        stale
    }
}
