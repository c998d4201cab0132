// src/merkle.rs - arena-based Merkle tree
//
// Nodes live in a flat Vec indexed by position rather than behind
// Box/Rc pointers, since a recursive left/right-pointer tree needs
// either unsafe code or reference counting to build bottom-up in Rust.
// Hashing matches the reference implementation exactly: a leaf hashes
// its UTF-8 data with a single SHA256, and a parent hashes the ASCII
// bytes of its two children's *hex digest strings* concatenated —
// not a double-SHA256 over raw bytes as Bitcoin-style Merkle trees do.
//
// The arena is an internal representation only. The wire form (§4.2,
// §6) is the reference's recursive `{left, right, data, hash}` record,
// nested under a `root` key and carried as a JSON *string* (not a
// nested object) wherever a `MerkleTree` is embedded — see the manual
// `Serialize`/`Deserialize` impls below.
use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub data: Option<String>,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// Arena of all nodes, leaves first (in leaf order) followed by
    /// internal nodes in the order they were built.
    nodes: Vec<MerkleNode>,
    /// Indices into `nodes` of the leaves, in original data order.
    leaves: Vec<usize>,
    root: usize,
}

impl MerkleTree {
    /// Build a tree over the given leaf data. `data` must be
    /// non-empty.
    pub fn new(data: Vec<String>) -> Self {
        assert!(!data.is_empty(), "merkle tree requires at least one leaf");

        let mut nodes = Vec::with_capacity(data.len() * 2);
        let mut level: Vec<usize> = Vec::with_capacity(data.len());
        for d in &data {
            let hash = sha256_hex(d.as_bytes());
            nodes.push(MerkleNode {
                left: None,
                right: None,
                data: Some(d.clone()),
                hash,
            });
            level.push(nodes.len() - 1);
        }
        let leaves = level.clone();

        while level.len() > 1 {
            let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = *pair.get(1).unwrap_or(&pair[0]);
                let hash = parent_hash(&nodes[left].hash, &nodes[right].hash);
                nodes.push(MerkleNode {
                    left: Some(left),
                    right: Some(right),
                    data: None,
                    hash,
                });
                next_level.push(nodes.len() - 1);
            }
            level = next_level;
        }

        let root = level[0];
        MerkleTree { nodes, leaves, root }
    }

    pub fn root_hash(&self) -> &str {
        &self.nodes[self.root].hash
    }

    /// Leaf data in original order, the per-block list of serialized
    /// transactions (and any free-form data strings).
    pub fn leaf_data(&self) -> Vec<&str> {
        self.leaves
            .iter()
            .map(|&i| self.nodes[i].data.as_deref().unwrap_or_default())
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn to_wire_node(&self, index: usize) -> WireNode {
        let node = &self.nodes[index];
        WireNode {
            left: node.left.map(|i| Box::new(self.to_wire_node(i))),
            right: node.right.map(|i| Box::new(self.to_wire_node(i))),
            data: node.data.clone(),
            hash: node.hash.clone(),
        }
    }

    /// Rebuild the arena from a recursive wire node, preserving every
    /// stored hash exactly rather than recomputing it from `data`
    /// (§4.2: "Reconstruction preserves the stored hashes and does not
    /// recompute them"). Returns the arena index of the node just
    /// inserted.
    fn from_wire_node(wire: &WireNode, nodes: &mut Vec<MerkleNode>, leaves: &mut Vec<usize>) -> usize {
        let left = wire
            .left
            .as_ref()
            .map(|child| Self::from_wire_node(child, nodes, leaves));
        let right = wire
            .right
            .as_ref()
            .map(|child| Self::from_wire_node(child, nodes, leaves));
        let is_leaf = left.is_none() && right.is_none();
        nodes.push(MerkleNode {
            left,
            right,
            data: wire.data.clone(),
            hash: wire.hash.clone(),
        });
        let index = nodes.len() - 1;
        if is_leaf {
            leaves.push(index);
        }
        index
    }
}

/// Recursive wire form of a single node, matching the reference's
/// `{left, right, data, hash}` record (§4.2) exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireNode {
    left: Option<Box<WireNode>>,
    right: Option<Box<WireNode>>,
    data: Option<String>,
    hash: String,
}

/// The reference marshals a tree as `{root: {left, right, data, hash}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRoot {
    root: WireNode,
}

impl Serialize for MerkleTree {
    /// Wherever a `MerkleTree` is embedded (e.g. `Block::merkle_tree`),
    /// it is carried as a JSON *string* holding the nested `{root: ...}`
    /// record, not as a nested object (§6: `merkle_tree` is itself a
    /// JSON string).
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = WireRoot {
            root: self.to_wire_node(self.root),
        };
        let json = serde_json::to_string(&wire).map_err(S::Error::custom)?;
        serializer.serialize_str(&json)
    }
}

impl<'de> Deserialize<'de> for MerkleTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let wire: WireRoot = serde_json::from_str(&raw).map_err(D::Error::custom)?;
        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        let root = MerkleTree::from_wire_node(&wire.root, &mut nodes, &mut leaves);
        Ok(MerkleTree { nodes, leaves, root })
    }
}

fn parent_hash(left_hash: &str, right_hash: &str) -> String {
    let mut concatenated = String::with_capacity(left_hash.len() + right_hash.len());
    concatenated.push_str(left_hash);
    concatenated.push_str(right_hash);
    sha256_hex(concatenated.as_bytes())
}
