//! Merkle builder: a binary hash tree over a payload's chunks.
//!
//! Leaves are paired left to right, layer by layer, until one node is left;
//! its id is the data root. An odd node at the end of a layer is carried up
//! unchanged. Every id commits to byte offsets as well as content, so the
//! same chunk at a different position yields a different tree.

use crate::chunk::Chunk;
use crate::crypto::{hash_all, note, HASH_SIZE};

/// Root of a payload with no chunks.
pub const EMPTY_ROOT: [u8; HASH_SIZE] = [0u8; HASH_SIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf {
        id: [u8; HASH_SIZE],
        data_hash: [u8; HASH_SIZE],
        min_byte_range: usize,
        max_byte_range: usize,
    },
    Branch {
        id: [u8; HASH_SIZE],
        left: Box<Node>,
        right: Box<Node>,
        /// First byte owned by the right subtree (the left subtree's max).
        byte_range_boundary: usize,
        max_byte_range: usize,
    },
}

impl Node {
    pub fn id(&self) -> [u8; HASH_SIZE] {
        match self {
            Node::Leaf { id, .. } | Node::Branch { id, .. } => *id,
        }
    }

    pub fn max_byte_range(&self) -> usize {
        match self {
            Node::Leaf { max_byte_range, .. } | Node::Branch { max_byte_range, .. } => {
                *max_byte_range
            }
        }
    }

    pub fn leaf(chunk: &Chunk) -> Self {
        Node::Leaf {
            id: hash_all(&[&chunk.data_hash, &note(chunk.max_byte_range)]),
            data_hash: chunk.data_hash,
            min_byte_range: chunk.min_byte_range,
            max_byte_range: chunk.max_byte_range,
        }
    }

    pub fn branch(left: Node, right: Node) -> Self {
        let boundary = left.max_byte_range();
        let id = hash_all(&[&left.id(), &right.id(), &note(boundary)]);
        Node::Branch {
            id,
            max_byte_range: right.max_byte_range(),
            byte_range_boundary: boundary,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Pair one layer of nodes into the next layer up.
fn build_layer(nodes: Vec<Node>) -> Vec<Node> {
    let mut layer = Vec::with_capacity(nodes.len().div_ceil(2));
    let mut iter = nodes.into_iter();
    while let Some(left) = iter.next() {
        match iter.next() {
            Some(right) => layer.push(Node::branch(left, right)),
            None => layer.push(left),
        }
    }
    layer
}

/// Build the tree over `chunks`. Returns `None` for an empty chunk list.
pub fn build_tree(chunks: &[Chunk]) -> Option<Node> {
    let mut nodes: Vec<Node> = chunks.iter().map(Node::leaf).collect();
    while nodes.len() > 1 {
        nodes = build_layer(nodes);
    }
    nodes.pop()
}

/// Data root of `chunks`, or [`EMPTY_ROOT`] when there are none.
pub fn data_root(chunks: &[Chunk]) -> [u8; HASH_SIZE] {
    build_tree(chunks).map(|n| n.id()).unwrap_or(EMPTY_ROOT)
}
