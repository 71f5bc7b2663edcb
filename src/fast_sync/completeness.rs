/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Checks deciding whether the data fast sync needs for a pivot is stored locally.
//!
//! The trie checks walk a trie from its root through the [`Chain`] and push every referenced but
//! missing node onto the required queue, so that each check doubles as discovery of what to request
//! next. The required queue is a demand signal: a key stays missing, and is pushed again, on every
//! check until it is imported.
//!
//! The block data and receipt checks walk parent links from the pivot down to the sync floor. They
//! remember the lowest block verified so far, so repeated checks only cover the remaining range.

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::{
    chain::Chain,
    types::{
        block::Block,
        data_types::BlockHeight,
        trie::{TrieDatabase, TrieNodeKey},
    },
};

pub struct CompletenessTracker<C: Chain> {
    chain: C,
    sync_floor: BlockHeight,
    block_cursor: Mutex<Option<Block>>,
    receipt_cursor: Mutex<Option<Block>>,
}

impl<C: Chain> CompletenessTracker<C> {
    pub fn new(chain: C, sync_floor: BlockHeight) -> Self {
        Self {
            chain,
            sync_floor,
            block_cursor: Mutex::new(None),
            receipt_cursor: Mutex::new(None),
        }
    }

    /// Whether the world state trie of `pivot` is complete. Missing nodes are pushed onto `required`.
    pub fn is_world_state_complete(
        &self,
        pivot: Option<&Block>,
        required: &Sender<(TrieDatabase, TrieNodeKey)>,
    ) -> bool {
        match pivot {
            Some(pivot) => self.is_trie_complete(&pivot.state_root_key(), TrieDatabase::State, required),
            None => false,
        }
    }

    /// Whether every contract storage trie referenced from the world state of `pivot` is complete.
    pub fn is_storage_complete(
        &self,
        pivot: Option<&Block>,
        required: &Sender<(TrieDatabase, TrieNodeKey)>,
    ) -> bool {
        self.are_sub_tries_complete(pivot, TrieDatabase::Storage, required)
    }

    /// Whether every contract details trie referenced from the world state of `pivot` is complete.
    pub fn is_contract_details_complete(
        &self,
        pivot: Option<&Block>,
        required: &Sender<(TrieDatabase, TrieNodeKey)>,
    ) -> bool {
        self.are_sub_tries_complete(pivot, TrieDatabase::Details, required)
    }

    /// Whether every block from `pivot` down to the sync floor is stored.
    pub fn is_block_data_complete(&self, pivot: Option<&Block>) -> bool {
        let Some(pivot) = pivot else {
            return false;
        };

        let mut cursor = self.block_cursor.lock();
        let mut current = cursor.take().unwrap_or_else(|| pivot.clone());
        while current.height > self.sync_floor {
            match self.chain.block(&current.parent_hash) {
                Some(parent) => current = parent,
                None => {
                    log::debug!("Block data incomplete below height {}", current.height);
                    *cursor = Some(current);
                    return false;
                }
            }
        }
        *cursor = Some(current);
        true
    }

    /// Whether the receipts of every block from `pivot` down to (excluding) the sync floor are stored.
    /// Blocks that are themselves missing count as missing receipts.
    pub fn is_receipt_data_complete(&self, pivot: Option<&Block>) -> bool {
        let Some(pivot) = pivot else {
            return false;
        };

        let mut cursor = self.receipt_cursor.lock();
        let mut current = cursor.take().unwrap_or_else(|| pivot.clone());
        while current.height > self.sync_floor {
            if !self.chain.has_receipts(&current.hash) {
                log::debug!("Receipts missing for block at height {}", current.height);
                *cursor = Some(current);
                return false;
            }
            match self.chain.block(&current.parent_hash) {
                Some(parent) => current = parent,
                None => {
                    *cursor = Some(current);
                    return false;
                }
            }
        }
        *cursor = Some(current);
        true
    }

    fn are_sub_tries_complete(
        &self,
        pivot: Option<&Block>,
        db_type: TrieDatabase,
        required: &Sender<(TrieDatabase, TrieNodeKey)>,
    ) -> bool {
        let Some(pivot) = pivot else {
            return false;
        };

        // Every sub-trie is traversed even after the first incomplete one, so that all of their
        // missing nodes are requested at once.
        self.chain
            .sub_trie_roots(&pivot.state_root_key(), db_type)
            .iter()
            .fold(true, |complete, root| self.is_trie_complete(root, db_type, required) && complete)
    }

    fn is_trie_complete(
        &self,
        root: &TrieNodeKey,
        db_type: TrieDatabase,
        required: &Sender<(TrieDatabase, TrieNodeKey)>,
    ) -> bool {
        let missing = self.chain.traverse_trie_from_node(root, db_type);
        if missing.is_empty() {
            return true;
        }

        log::debug!("{} nodes missing from the {} trie rooted at {:?}", missing.len(), db_type, root);
        for key in missing {
            // The receiving end lives as long as the orchestrator that owns this tracker.
            let _ = required.send((db_type, key));
        }
        false
    }
}
