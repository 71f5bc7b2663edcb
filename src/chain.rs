/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable access to the local chain and its trie storage.
//!
//! Fast sync does not know how trie nodes are encoded or persisted. Everything it needs from the
//! node's storage goes through the [`Chain`] trait, which the user implements on top of their
//! key-value store and trie implementation.
//!
//! Implementations are cloned into each background thread, so cloning must be cheap and every clone
//! must observe the same underlying storage.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::types::{
    block::Block,
    data_types::CryptoHash,
    trie::{TrieDatabase, TrieNodeKey, TrieNodeValue},
};

pub trait Chain: Clone + Send + Sync + 'static {
    /// Get the value of the node identified by `key` in the `db_type` partition, if it is stored
    /// locally.
    fn trie_node(&self, key: &TrieNodeKey, db_type: TrieDatabase) -> Option<TrieNodeValue>;

    /// Expand `value` into the nodes it references, breadth first, returning at most `limit` of
    /// them. Referenced nodes that are not stored locally are left out.
    fn referenced_trie_nodes(
        &self,
        value: &TrieNodeValue,
        limit: u32,
        db_type: TrieDatabase,
    ) -> BTreeMap<TrieNodeKey, TrieNodeValue>;

    /// Keys that the node encoded in `value` references directly, whether stored locally or not.
    fn referenced_trie_keys(&self, value: &TrieNodeValue, db_type: TrieDatabase) -> Vec<TrieNodeKey>;

    /// Walk the trie rooted at `root` and return every key that is referenced by a stored node (or
    /// is the root itself) but is not stored locally.
    fn traverse_trie_from_node(&self, root: &TrieNodeKey, db_type: TrieDatabase) -> HashSet<TrieNodeKey>;

    /// Roots of the sub-tries in `db_type` (contract storage or contract details) that accounts in
    /// the world state rooted at `state_root` point to. Only accounts that are stored locally can be
    /// inspected, so this is meaningful once the world state is complete.
    fn sub_trie_roots(&self, state_root: &TrieNodeKey, db_type: TrieDatabase) -> Vec<TrieNodeKey>;

    /// Persist a trie node received from a peer.
    fn import_trie_node(
        &mut self,
        key: &TrieNodeKey,
        value: &TrieNodeValue,
        db_type: TrieDatabase,
    ) -> Result<ImportResult, ChainError>;

    /// Get a stored block by its hash.
    fn block(&self, hash: &CryptoHash) -> Option<Block>;

    /// Whether the transaction receipts of the block identified by `hash` are stored.
    fn has_receipts(&self, hash: &CryptoHash) -> bool;
}

/// Successful outcomes of [`Chain::import_trie_node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportResult {
    Imported,
    AlreadyStored,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("value of node {key:?} in {db_type} does not hash to its key")]
    InconsistentNode { key: TrieNodeKey, db_type: TrieDatabase },
    #[error("node {key:?} in {db_type} conflicts with the stored value")]
    ConflictingNode { key: TrieNodeKey, db_type: TrieDatabase },
    #[error("storage failure: {0}")]
    Storage(String),
}
