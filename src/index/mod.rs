//! B+ tree index over the buffer pool.
//!
//! Nodes are ordinary pages whose bytes are reinterpreted as a header plus
//! parallel key/value arrays. Splits, merges, and root replacement are
//! sequences of page pins, mutations, and unpins.

mod btree;
mod error;
mod node;

pub use btree::{BPlusTree, TreeIter};
pub use error::{IndexError, IndexResult};
pub use node::{InternalNode, LeafNode, NodeType, MAX_FANOUT};
