// src/node.rs - the node: owns every piece of state, runs every thread
//
// `Node` is the one owned value §9's design notes call for: no hidden
// singletons, each substructure (chain+UTXO, mempool, data queue,
// peers) behind its own `Mutex`, matching the reference crate's
// `Arc<Mutex<...>>` style (see `main.rs`'s `Node` there) generalized
// to the three named locks of §5. Threads are started in `start()` and
// joined with a bounded timeout in `stop()`.
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::blockchain::Blockchain;
use crate::config::NodeConfig;
use crate::error::{PaliError, Result};
use crate::mempool::Mempool;
use crate::miner;
use crate::p2p::{self, Message, PeerTable};
use crate::transaction::Transaction;
use crate::utxo::{self, UtxoIndex};
use crate::wallet::Wallet;

/// Notifications an external shell/UI can subscribe to without polling
/// (§6: "notifications of new accepted blocks" is part of the core's
/// external interface; the shell itself is out of scope).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    BlockAccepted { height: u64, hash: String },
    BlockRejected { reason: String },
    ChainReplaced { height: u64 },
    MempoolChanged { len: usize },
}

/// The chain lock's payload: the chain and its derived UTXO index are
/// always mutated together (§5: "never held while doing network I/O").
struct ChainState {
    chain: Blockchain,
    utxo: UtxoIndex,
}

pub struct Node {
    config: NodeConfig,
    wallet: Mutex<Wallet>,
    chain_state: Mutex<ChainState>,
    mempool: Mutex<Mempool>,
    data_queue: Mutex<Vec<String>>,
    peers: Mutex<PeerTable>,
    /// `foundExternal` (§5/§9 Open Question 1): set when an external
    /// block is accepted mid-mining-attempt, reset once that attempt
    /// returns.
    found_external: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    events_tx: Sender<NodeEvent>,
    events_rx: Receiver<NodeEvent>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Arc<Node>> {
        config.validate()?;
        let (events_tx, events_rx) = crossbeam::channel::unbounded();
        let chain = Blockchain::new(config.difficulty);
        let utxo = UtxoIndex::rebuild(&chain);
        let peers = PeerTable::new(&config.seed_peers);

        // §3 "Additions recovered from the Python reference": the data
        // queue is seeded with a bootstrap leaf identifying the node,
        // matching the reference `Node.py`'s initial
        // `["Created by {ip}"]` queue.
        let data_queue = vec![format!("Created by {}", config.listen_ip)];

        Ok(Arc::new(Node {
            wallet: Mutex::new(Wallet::new()),
            chain_state: Mutex::new(ChainState { chain, utxo }),
            mempool: Mutex::new(Mempool::new()),
            data_queue: Mutex::new(data_queue),
            peers: Mutex::new(peers),
            found_external: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx,
            threads: Mutex::new(Vec::new()),
            config,
        }))
    }

    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        self.events_rx.clone()
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events_tx.send(event);
    }

    // ---- shell-facing API (§6) ----

    pub fn read_wallet_address(&self) -> String {
        self.wallet.lock().unwrap().address().to_string()
    }

    pub fn read_balance(&self) -> u64 {
        self.wallet.lock().unwrap().balance()
    }

    /// Current chain height, exposed for external monitoring/tests —
    /// not part of the four core shell calls but a harmless read.
    pub fn chain_height(&self) -> u64 {
        self.chain_state.lock().unwrap().chain.height()
    }

    pub fn latest_block_hash(&self) -> String {
        self.chain_state.lock().unwrap().chain.latest_block().hash.clone()
    }

    /// Build, sign, pool, and broadcast a transaction paying `amount`
    /// to `recipient_address`. `InsufficientFunds` propagates straight
    /// to the caller, per §7.
    pub fn submit_transfer(&self, recipient_address: &str, amount: u64) -> Result<String> {
        let tx = {
            let wallet = self.wallet.lock().unwrap();
            wallet.create_transaction(recipient_address, amount)?
        };
        let tx_hash = tx.tx_hash.clone().unwrap_or_default();
        self.add_to_mempool(tx.clone());
        self.broadcast(&Message::Transaction(tx));
        Ok(tx_hash)
    }

    fn add_to_mempool(&self, tx: Transaction) {
        let len = {
            let mut mempool = self.mempool.lock().unwrap();
            mempool.insert(tx);
            mempool.len()
        };
        self.emit(NodeEvent::MempoolChanged { len });
    }

    // ---- lifecycle ----

    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let listener = TcpListener::bind(self.config.socket_addr()).map_err(PaliError::Io)?;
        listener
            .set_nonblocking(true)
            .map_err(PaliError::Io)?;

        let mut threads = self.threads.lock().unwrap();
        threads.push(self.spawn_listener_loop(listener));
        threads.push(self.spawn_hello_loop());
        threads.push(self.spawn_miner_loop());
        threads.push(self.spawn_resync_loop());
        info!("node started on {}", self.config.socket_addr());
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Trip the same cancellation flag the nonce search already
        // polls (§5 "suspension points": cooperative yield between
        // nonce trials) so a mining attempt in progress unwinds
        // promptly instead of making `join` below block indefinitely.
        self.found_external.store(true, Ordering::SeqCst);
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        info!("node stopped");
    }

    fn spawn_listener_loop(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        let node = Arc::clone(self);
        thread::spawn(move || {
            while node.running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        let node = Arc::clone(&node);
                        thread::spawn(move || match p2p::read_message(stream) {
                            Ok(message) => node.handle_message(message, Some(&addr.ip().to_string())),
                            Err(e) => warn!("malformed message from {addr}: {e}"),
                        });
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        thread::sleep(Duration::from_millis(50));
                    }
                }
            }
        })
    }

    fn spawn_hello_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        thread::spawn(move || {
            while node.running.load(Ordering::SeqCst) {
                let addrs = {
                    let peers = node.peers.lock().unwrap();
                    peers.addrs()
                };
                for addr in &addrs {
                    if let Err(e) = p2p::send_message(
                        addr,
                        node.config.port,
                        &Message::Hello(node.config.listen_ip.clone()),
                    ) {
                        debug!("hello to {addr} failed: {e}");
                    }
                }
                let evicted = {
                    let mut peers = node.peers.lock().unwrap();
                    peers.evict_stale(Duration::from_secs(node.config.peer_timeout_secs))
                };
                for addr in evicted {
                    debug!("peer {addr} evicted after timeout");
                }
                sleep_while_running(&node.running, Duration::from_secs(node.config.hello_interval_secs));
            }
        })
    }

    fn spawn_miner_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        thread::spawn(move || {
            while node.running.load(Ordering::SeqCst) {
                node.found_external.store(false, Ordering::SeqCst);

                let (chain_snapshot, utxo_snapshot) = {
                    let state = node.chain_state.lock().unwrap();
                    (state.chain.clone(), state.utxo.clone())
                };
                let mempool_snapshot = node.mempool.lock().unwrap().snapshot();
                let data_snapshot = node.data_queue.lock().unwrap().clone();
                let miner_address = node.wallet.lock().unwrap().address().to_string();

                let Some(attempt) = miner::mine_candidate(
                    &chain_snapshot,
                    &utxo_snapshot,
                    mempool_snapshot,
                    data_snapshot,
                    &miner_address,
                    &node.found_external,
                ) else {
                    // interrupted by an external block; loop and retry
                    // against the now-updated chain.
                    continue;
                };

                if !attempt.invalid.is_empty() {
                    node.mempool.lock().unwrap().remove_invalid(&attempt.invalid);
                }

                node.accept_mined_block(attempt.block, attempt.confirmed);
                // The data snapshot folded above has now been mined into
                // an accepted block; reset the queue to just the
                // bootstrap leaf so future blocks don't re-embed it
                // (§3: "folded into the *next* mined block" is one-time,
                // matching the reference's `self.data_queue =
                // [f"Created by {ip}"]` reset in `Node.py::mine`).
                *node.data_queue.lock().unwrap() = vec![format!("Created by {}", node.config.listen_ip)];
            }
        })
    }

    fn spawn_resync_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        thread::spawn(move || {
            while node.running.load(Ordering::SeqCst) {
                node.resync_wallet();
                sleep_while_running(&node.running, Duration::from_millis(500));
            }
        })
    }

    fn resync_wallet(&self) {
        let address = self.wallet.lock().unwrap().address().to_string();
        let owned = {
            let state = self.chain_state.lock().unwrap();
            state
                .utxo
                .entries
                .values()
                .filter(|u| u.recipient_address == address)
                .cloned()
                .collect()
        };
        self.wallet.lock().unwrap().resync(owned);
    }

    fn broadcast(&self, message: &Message) {
        let addrs = self.peers.lock().unwrap().addrs();
        for addr in addrs {
            if let Err(e) = p2p::send_message(&addr, self.config.port, message) {
                debug!("broadcast to {addr} failed: {e}");
            }
        }
    }

    /// Apply a block this node itself mined: append under the chain
    /// lock, process its transactions into the UTXO index, purge the
    /// mempool, resync the wallet, and tell peers.
    fn accept_mined_block(&self, block: crate::block::Block, confirmed: Vec<Transaction>) {
        let (index, hash) = {
            let mut state = self.chain_state.lock().unwrap();
            state.chain.append_block(block.clone());
            utxo::process_block_transactions(&mut state.utxo, &block);
            (state.chain.height(), state.chain.latest_block().hash.clone())
        };
        self.mempool.lock().unwrap().remove_confirmed(&confirmed);
        self.resync_wallet();
        self.broadcast(&Message::OneBlock(block));
        info!("mined and accepted block {index} ({hash})");
        self.emit(NodeEvent::BlockAccepted { height: index, hash });
    }

    /// Dispatch one received wire message per §4.9's table.
    fn handle_message(self: &Arc<Self>, message: Message, from_addr: Option<&str>) {
        debug!("received {message:?} from {from_addr:?}");
        match message {
            Message::Data(payload) => {
                self.data_queue.lock().unwrap().push(payload);
            }
            Message::Hello(addr) => {
                self.peers.lock().unwrap().mark_seen(&addr);
            }
            Message::Join(addr) => {
                self.peers.lock().unwrap().mark_seen(&addr);
                if let Err(e) =
                    p2p::send_message(&addr, self.config.port, &Message::Intro(self.config.listen_ip.clone()))
                {
                    debug!("intro reply to {addr} failed: {e}");
                }
            }
            Message::Intro(addr) => {
                self.peers.lock().unwrap().mark_seen(&addr);
            }
            Message::OneBlock(block) => self.handle_one_block(block),
            Message::BlockchainRequest(requester) => self.handle_chain_request(&requester),
            Message::BlockchainResponse(chain_json) => self.handle_chain_response(&chain_json),
            Message::Transaction(tx) => self.add_to_mempool(tx),
        }
    }

    /// §4.9 "On `@ONEBLOCK`": if the candidate is more than one block
    /// ahead, we're behind — request the sender's full chain instead
    /// of trying (and failing) to validate it directly. Otherwise
    /// validate and, on success, append and set `found_external` to
    /// interrupt any in-flight mining attempt (§9 Open Question 1).
    fn handle_one_block(self: &Arc<Self>, block: crate::block::Block) {
        let height = self.chain_state.lock().unwrap().chain.height();
        if block.index > height + 1 {
            let from = block.miner_address.clone();
            if !from.is_empty() {
                if let Err(e) =
                    p2p::send_message(&from, self.config.port, &Message::BlockchainRequest(self.config.listen_ip.clone()))
                {
                    debug!("chain request to {from} failed: {e}");
                }
            }
            return;
        }

        let accepted = {
            let mut state = self.chain_state.lock().unwrap();
            if !state.chain.is_block_valid(&block) {
                false
            } else {
                let (valid, _) = utxo::verify_block_transactions(&state.utxo, &block);
                if valid {
                    state.chain.append_block(block.clone());
                    utxo::process_block_transactions(&mut state.utxo, &block);
                    true
                } else {
                    false
                }
            }
        };

        if accepted {
            let confirmed = utxo::parse_block_transactions(&block);
            self.mempool.lock().unwrap().remove_confirmed(&confirmed);
            self.resync_wallet();
            self.found_external.store(true, Ordering::SeqCst);
            let height = self.chain_state.lock().unwrap().chain.height();
            info!("accepted external block {height} ({})", block.hash);
            self.emit(NodeEvent::BlockAccepted { height, hash: block.hash });
        } else {
            warn!("rejected invalid external block at index {}", block.index);
            self.emit(NodeEvent::BlockRejected {
                reason: format!("block {} failed validation", block.index),
            });
        }
    }

    fn handle_chain_request(&self, requester: &str) {
        let json = {
            let state = self.chain_state.lock().unwrap();
            match state.chain.to_wire_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("failed to serialize local chain: {e}");
                    return;
                }
            }
        };
        if let Err(e) =
            p2p::send_message(requester, self.config.port, &Message::BlockchainResponse(json))
        {
            debug!("chain response to {requester} failed: {e}");
        }
    }

    /// §4.9 "On `#BLOCKCHAIN`": accept iff longer than local, valid,
    /// and every transaction replays cleanly — then atomically replace
    /// the chain and rebuild the UTXO index from scratch. No
    /// tie-breaking on equal length: strict `>` only (§9 Open
    /// Question 6).
    fn handle_chain_response(&self, chain_json: &str) {
        let candidate = match Blockchain::from_wire_json(chain_json, self.config.difficulty) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("received unparseable chain: {e}");
                return;
            }
        };

        let local_height = self.chain_state.lock().unwrap().chain.height();
        if candidate.height() <= local_height {
            debug!(
                "ignoring peer chain of height {} (local is {local_height})",
                candidate.height()
            );
            return;
        }
        if let Err(reason) = candidate.is_chain_valid() {
            warn!("rejecting peer chain: {reason}");
            self.emit(NodeEvent::BlockRejected { reason });
            return;
        }
        let Some(new_utxo) = utxo::verify_blockchain_transactions(&candidate) else {
            warn!("rejecting peer chain: transaction replay failed");
            self.emit(NodeEvent::BlockRejected {
                reason: "transaction replay failed".to_string(),
            });
            return;
        };

        let confirmed: Vec<Transaction> = candidate
            .chain
            .iter()
            .flat_map(utxo::parse_block_transactions)
            .collect();

        let height = {
            let mut state = self.chain_state.lock().unwrap();
            state.chain = candidate;
            state.utxo = new_utxo;
            state.chain.height()
        };
        self.mempool.lock().unwrap().remove_confirmed(&confirmed);
        self.resync_wallet();
        info!("replaced local chain with peer chain at height {height}");
        self.emit(NodeEvent::ChainReplaced { height });
    }
}

/// Sleep for up to `total`, but in short slices so a `running` flip to
/// `false` is noticed almost immediately instead of after the full
/// interval — keeps `Node::stop`'s `join` bounded regardless of how
/// long `hello_interval_secs` is configured.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let step = remaining.min(SLICE);
        thread::sleep(step);
        remaining -= step;
    }
}
