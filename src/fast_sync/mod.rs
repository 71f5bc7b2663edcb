/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fast sync orchestrator: pivot selection, bookkeeping of imported, required and received trie
//! nodes, and the decision of when the downloaded snapshot is complete.
//!
//! ## Two implementations
//!
//! A node either fast syncs or it does not, and that is decided once when it starts. The orchestrator
//! is therefore used through the [`FastSync`] trait, which has two implementations:
//! 1. [`ActiveFastSync`], which does the work described in this module.
//! 2. [`DisabledFastSync`], used when the node starts in full sync mode. Every operation on it is a
//!    no-op, and [`is_complete`](FastSync::is_complete) is always `true`.
//!
//! ## Queues
//!
//! - The **required queue** holds `(partition, key)` pairs of nodes known to be missing. Completeness
//!   checks and imported nodes feed it; the [request dispatcher](crate::trie_sync::client) drains it.
//!   It is a multiset: the same key may be in it several times.
//! - The **received queue** holds batches decoded from responses, in arrival order. The poller feeds
//!   it; the [importer](crate::trie_sync::importer) drains it.
//!
//! Both are unbounded; pushing never blocks, popping blocks up to a timeout.

pub mod completeness;

pub mod implementation;

pub mod pivot;

use std::{
    sync::{
        mpsc::{Receiver, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

pub use implementation::{ActiveFastSync, FastSyncConfiguration};

use crate::types::{
    block::Block,
    data_types::{BlockHeight, PeerId},
    trie::{TrieDatabase, TrieNodeBatch, TrieNodeKey, TrieNodeValue},
};

pub trait FastSync: Send + Sync {
    /// Record that `key` with `value` is durably stored in the `db_type` partition.
    fn import_node(&self, db_type: TrieDatabase, key: TrieNodeKey, value: TrieNodeValue);

    /// Whether `key` was imported into `db_type` with exactly `value`.
    fn contains_exact(&self, db_type: TrieDatabase, key: &TrieNodeKey, value: &TrieNodeValue) -> bool;

    /// Whether `key` was imported into `db_type`, whatever its value.
    fn is_imported(&self, db_type: TrieDatabase, key: &TrieNodeKey) -> bool;

    /// Count a peer-reported block as a vote for the pivot. No-op once the pivot is resolved.
    fn add_pivot_candidate(&self, block: Block);

    /// The height pivot candidates are requested at, once chosen.
    fn pivot_height(&self) -> Option<BlockHeight>;

    /// The resolved pivot.
    fn pivot(&self) -> Option<Block>;

    /// Run the completeness checks and mark fast sync complete if they all pass.
    ///
    /// This is expensive: it is meant to be called periodically, never on a hot path.
    fn evaluate_completeness(&self);

    /// Whether fast sync is complete. Once `true`, stays `true`.
    fn is_complete(&self) -> bool;

    /// Report that a node delivered by `origin` turned out to be inconsistent.
    fn handle_failed_import(&self, db_type: TrieDatabase, key: &TrieNodeKey, value: &TrieNodeValue, origin: PeerId);

    /// Push the keys referenced by the freshly imported node `top_key` that are not imported yet onto
    /// the required queue.
    fn update_requests(&self, db_type: TrieDatabase, top_key: &TrieNodeKey, referenced_keys: Vec<TrieNodeKey>);

    /// Push `key` onto the required queue.
    fn require(&self, db_type: TrieDatabase, key: TrieNodeKey);

    /// Pop the next required node, waiting up to `timeout` for one to become available.
    fn next_required(&self, timeout: Duration) -> Option<(TrieDatabase, TrieNodeKey)>;

    /// Push a batch decoded from a response onto the received queue.
    fn receive(&self, batch: TrieNodeBatch);

    /// Pop the oldest received batch, waiting up to `timeout` for one to become available.
    fn next_received(&self, timeout: Duration) -> Option<TrieNodeBatch>;
}

/// A [`FastSync`] for nodes that do not fast sync.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledFastSync;

impl FastSync for DisabledFastSync {
    fn import_node(&self, _: TrieDatabase, _: TrieNodeKey, _: TrieNodeValue) {}

    fn contains_exact(&self, _: TrieDatabase, _: &TrieNodeKey, _: &TrieNodeValue) -> bool {
        false
    }

    fn is_imported(&self, _: TrieDatabase, _: &TrieNodeKey) -> bool {
        false
    }

    fn add_pivot_candidate(&self, _: Block) {}

    fn pivot_height(&self) -> Option<BlockHeight> {
        None
    }

    fn pivot(&self) -> Option<Block> {
        None
    }

    fn evaluate_completeness(&self) {}

    fn is_complete(&self) -> bool {
        true
    }

    fn handle_failed_import(&self, _: TrieDatabase, _: &TrieNodeKey, _: &TrieNodeValue, _: PeerId) {}

    fn update_requests(&self, _: TrieDatabase, _: &TrieNodeKey, _: Vec<TrieNodeKey>) {}

    fn require(&self, _: TrieDatabase, _: TrieNodeKey) {}

    fn next_required(&self, _: Duration) -> Option<(TrieDatabase, TrieNodeKey)> {
        None
    }

    fn receive(&self, _: TrieNodeBatch) {}

    fn next_received(&self, _: Duration) -> Option<TrieNodeBatch> {
        None
    }
}

/// Spawn the thread that calls [`evaluate_completeness`](FastSync::evaluate_completeness) on
/// `fast_sync` once every `interval`.
pub(crate) fn start_completeness_evaluator(
    fast_sync: Arc<dyn FastSync>,
    interval: Duration,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.recv_timeout(interval) {
            Ok(()) => return,
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                panic!("Completeness evaluator thread disconnected from main thread")
            }
        }

        if !fast_sync.is_complete() {
            fast_sync.evaluate_completeness();
        }
    })
}
