/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types describing trie nodes exchanged during fast sync.
//!
//! A trie node is a content-addressed key/value pair. Every node lives in exactly one
//! [`TrieDatabase`] partition, and nodes from different partitions are never mixed up even if
//! their keys collide.

use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
};

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::{CryptoHash, PeerId};

/// Logical partition of the node's trie storage.
///
/// Serialized on the wire as a single byte (the variant index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub enum TrieDatabase {
    /// The world state trie (accounts).
    State,
    /// Contract storage tries.
    Storage,
    /// Contract details tries.
    Details,
}

impl TrieDatabase {
    pub const ALL: [TrieDatabase; 3] = [TrieDatabase::State, TrieDatabase::Storage, TrieDatabase::Details];
}

impl Display for TrieDatabase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TrieDatabase::State => write!(f, "State"),
            TrieDatabase::Storage => write!(f, "Storage"),
            TrieDatabase::Details => write!(f, "Details"),
        }
    }
}

/// Content hash identifying a trie node. Serialized as length-prefixed bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct TrieNodeKey(Vec<u8>);

impl TrieNodeKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<CryptoHash> for TrieNodeKey {
    fn from(hash: CryptoHash) -> Self {
        Self(hash.bytes().to_vec())
    }
}

impl From<&[u8]> for TrieNodeKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Debug for TrieNodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Opaque encoded trie node. Its encoding, and therefore which keys it references, is only
/// understood by the [`Chain`](crate::chain::Chain).
#[derive(Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct TrieNodeValue(Vec<u8>);

impl TrieNodeValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for TrieNodeValue {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Debug for TrieNodeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TrieNodeValue({} bytes)", self.0.len())
    }
}

/// A batch of trie nodes delivered by a peer, waiting in the received queue to be imported.
#[derive(Clone, Debug)]
pub struct TrieNodeBatch {
    pub origin: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub node_value: TrieNodeValue,
    pub referenced_nodes: BTreeMap<TrieNodeKey, TrieNodeValue>,
}

impl TrieNodeBatch {
    /// Iterate through all nodes in the batch, the requested node first.
    pub fn nodes(&self) -> impl Iterator<Item = (&TrieNodeKey, &TrieNodeValue)> {
        std::iter::once((&self.node_key, &self.node_value)).chain(self.referenced_nodes.iter())
    }

    /// Number of key/value pairs in the batch, including the requested node.
    pub fn len(&self) -> usize {
        1 + self.referenced_nodes.len()
    }

    pub fn contains_key(&self, key: &TrieNodeKey) -> bool {
        self.node_key == *key || self.referenced_nodes.contains_key(key)
    }
}
