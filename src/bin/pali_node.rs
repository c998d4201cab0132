// src/bin/pali_node.rs - minimal process entry point
//
// This binary is a thin demonstration of the core's external
// interface; the interactive shell/GUI this crate was built to back
// are out of scope (§1) and not implemented here. It reads the node's
// own IP from stdin (§6), starts a node against the default
// configuration, logs accepted blocks as they arrive, and mines
// solo unless peers are reachable.
use std::io::{self, BufRead};

use pali_coin::config::NodeConfig;
use pali_coin::node::Node;
use pali_coin::{init_logging, NodeEvent};

fn main() -> pali_coin::Result<()> {
    init_logging();

    println!("enter this node's IP address:");
    let mut listen_ip = String::new();
    io::stdin().lock().read_line(&mut listen_ip)?;
    let listen_ip = listen_ip.trim().to_string();
    let listen_ip = if listen_ip.is_empty() {
        "127.0.0.1".to_string()
    } else {
        listen_ip
    };

    let config = NodeConfig {
        listen_ip,
        ..NodeConfig::default()
    };

    let node = Node::new(config)?;
    let events = node.subscribe();
    node.start()?;

    println!("node address: {}", node.read_wallet_address());
    println!("listening, Ctrl+C to stop");

    for event in events.iter() {
        match event {
            NodeEvent::BlockAccepted { height, hash } => {
                println!("accepted block {height} ({hash}) — balance now {}", node.read_balance());
            }
            NodeEvent::BlockRejected { reason } => {
                println!("rejected a peer block: {reason}");
            }
            NodeEvent::ChainReplaced { height } => {
                println!("replaced local chain at height {height}");
            }
            NodeEvent::MempoolChanged { len } => {
                println!("mempool now holds {len} pending transaction(s)");
            }
        }
    }

    Ok(())
}
