//! A simple, volatile, in-memory implementation of [`Chain`].
//!
//! Trie node values are the borsh encoding of `(children, payload)`, where `children` are the keys of
//! the nodes the node references. Keys are arbitrary and are not checked against values, except that
//! keys marked with [`MemChain::reject`] fail to import as inconsistent.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use borsh::{BorshDeserialize, BorshSerialize};
use fast_sync_rs::{
    chain::{Chain, ChainError, ImportResult},
    types::{
        block::Block,
        data_types::CryptoHash,
        trie::{TrieDatabase, TrieNodeKey, TrieNodeValue},
    },
};

/// Encode a trie node that references `children`.
pub(crate) fn trie_node(children: &[&[u8]], payload: &[u8]) -> TrieNodeValue {
    let children: Vec<Vec<u8>> = children.iter().map(|child| child.to_vec()).collect();
    TrieNodeValue::new((children, payload.to_vec()).try_to_vec().unwrap())
}

fn children(value: &TrieNodeValue) -> Vec<TrieNodeKey> {
    match <(Vec<Vec<u8>>, Vec<u8>)>::try_from_slice(value.bytes()) {
        Ok((children, _)) => children.into_iter().map(TrieNodeKey::new).collect(),
        Err(_) => Vec::new(),
    }
}

#[derive(Default)]
struct MemChainInner {
    tries: HashMap<TrieDatabase, HashMap<TrieNodeKey, TrieNodeValue>>,
    sub_trie_roots: HashMap<TrieDatabase, Vec<TrieNodeKey>>,
    blocks: HashMap<CryptoHash, Block>,
    receipts: HashSet<CryptoHash>,
    rejected: HashSet<TrieNodeKey>,
}

impl MemChainInner {
    fn get(&self, key: &TrieNodeKey, db_type: TrieDatabase) -> Option<&TrieNodeValue> {
        self.tries.get(&db_type).and_then(|nodes| nodes.get(key))
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemChain(Arc<Mutex<MemChainInner>>);

impl MemChain {
    /// Create a new, empty `MemChain`.
    pub(crate) fn new() -> MemChain {
        MemChain::default()
    }

    fn inner(&self) -> MutexGuard<MemChainInner> {
        self.0.lock().unwrap()
    }

    pub(crate) fn insert_node(&self, db_type: TrieDatabase, key: &[u8], value: TrieNodeValue) {
        self.inner()
            .tries
            .entry(db_type)
            .or_default()
            .insert(TrieNodeKey::from(key), value);
    }

    pub(crate) fn has_node(&self, db_type: TrieDatabase, key: &[u8]) -> bool {
        self.inner().get(&TrieNodeKey::from(key), db_type).is_some()
    }

    pub(crate) fn node_count(&self, db_type: TrieDatabase) -> usize {
        self.inner().tries.get(&db_type).map_or(0, |nodes| nodes.len())
    }

    /// Declare the roots of the storage or details tries that the world state points to.
    pub(crate) fn set_sub_trie_roots(&self, db_type: TrieDatabase, roots: &[&[u8]]) {
        self.inner()
            .sub_trie_roots
            .insert(db_type, roots.iter().map(|root| TrieNodeKey::from(*root)).collect());
    }

    /// Make imports of `key` fail as inconsistent.
    pub(crate) fn reject(&self, key: &[u8]) {
        self.inner().rejected.insert(TrieNodeKey::from(key));
    }

    pub(crate) fn insert_block(&self, block: Block, with_receipts: bool) {
        let mut inner = self.inner();
        if with_receipts {
            inner.receipts.insert(block.hash);
        }
        inner.blocks.insert(block.hash, block);
    }

    pub(crate) fn insert_receipts(&self, hash: CryptoHash) {
        self.inner().receipts.insert(hash);
    }
}

impl Chain for MemChain {
    fn trie_node(&self, key: &TrieNodeKey, db_type: TrieDatabase) -> Option<TrieNodeValue> {
        self.inner().get(key, db_type).cloned()
    }

    fn referenced_trie_nodes(
        &self,
        value: &TrieNodeValue,
        limit: u32,
        db_type: TrieDatabase,
    ) -> BTreeMap<TrieNodeKey, TrieNodeValue> {
        let inner = self.inner();
        let mut nodes = BTreeMap::new();
        let mut queue: VecDeque<TrieNodeKey> = children(value).into();
        while let Some(key) = queue.pop_front() {
            if nodes.len() >= limit as usize {
                break;
            }
            if nodes.contains_key(&key) {
                continue;
            }
            if let Some(value) = inner.get(&key, db_type) {
                queue.extend(children(value));
                nodes.insert(key, value.clone());
            }
        }
        nodes
    }

    fn referenced_trie_keys(&self, value: &TrieNodeValue, _: TrieDatabase) -> Vec<TrieNodeKey> {
        children(value)
    }

    fn traverse_trie_from_node(&self, root: &TrieNodeKey, db_type: TrieDatabase) -> HashSet<TrieNodeKey> {
        let inner = self.inner();
        let mut missing = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root.clone()];
        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            match inner.get(&key, db_type) {
                Some(value) => stack.extend(children(value)),
                None => {
                    missing.insert(key);
                }
            }
        }
        missing
    }

    fn sub_trie_roots(&self, _: &TrieNodeKey, db_type: TrieDatabase) -> Vec<TrieNodeKey> {
        self.inner().sub_trie_roots.get(&db_type).cloned().unwrap_or_default()
    }

    fn import_trie_node(
        &mut self,
        key: &TrieNodeKey,
        value: &TrieNodeValue,
        db_type: TrieDatabase,
    ) -> Result<ImportResult, ChainError> {
        let mut inner = self.inner();
        if inner.rejected.contains(key) {
            return Err(ChainError::InconsistentNode { key: key.clone(), db_type });
        }
        let same_value = inner.get(key, db_type).map(|stored| stored == value);
        match same_value {
            Some(true) => Ok(ImportResult::AlreadyStored),
            Some(false) => Err(ChainError::ConflictingNode { key: key.clone(), db_type }),
            None => {
                inner.tries.entry(db_type).or_default().insert(key.clone(), value.clone());
                Ok(ImportResult::Imported)
            }
        }
    }

    fn block(&self, hash: &CryptoHash) -> Option<Block> {
        self.inner().blocks.get(hash).cloned()
    }

    fn has_receipts(&self, hash: &CryptoHash) -> bool {
        self.inner().receipts.contains(hash)
    }
}
