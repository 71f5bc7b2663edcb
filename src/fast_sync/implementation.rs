/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! [`ActiveFastSync`], the [`FastSync`] implementation used by nodes that fast sync.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
    time::{Duration, SystemTime},
};

use crossbeam::channel::{self, Receiver};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{
    chain::Chain,
    events::{CompleteFastSyncEvent, Event},
    logging::first_seven_base64_chars,
    networking::network::Network,
    types::{
        block::Block,
        data_types::{BlockHeight, PeerId},
        trie::{TrieDatabase, TrieNodeBatch, TrieNodeKey, TrieNodeValue},
    },
};

use super::{
    completeness::CompletenessTracker,
    pivot::{PivotConfiguration, PivotSelector},
    FastSync,
};

/// Immutable parameters that define the behaviour of [ActiveFastSync].
#[derive(Clone, Debug)]
pub struct FastSyncConfiguration {
    pub min_active_peers: usize,
    pub pivot_distance_to_head: u64,
    pub pivot_vote_threshold: u32,
    pub sync_floor: BlockHeight,
}

pub struct ActiveFastSync<C: Chain, N: Network> {
    imported: DashMap<TrieDatabase, DashMap<TrieNodeKey, TrieNodeValue>>,
    required: (channel::Sender<(TrieDatabase, TrieNodeKey)>, Receiver<(TrieDatabase, TrieNodeKey)>),
    received: (channel::Sender<TrieNodeBatch>, Receiver<TrieNodeBatch>),
    complete: AtomicBool,
    evaluating: Mutex<()>,
    pivot_selector: PivotSelector<N>,
    completeness_tracker: CompletenessTracker<C>,
    event_publisher: Option<Sender<Event>>,
}

impl<C: Chain, N: Network> ActiveFastSync<C, N> {
    pub fn new(
        config: FastSyncConfiguration,
        chain: C,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let imported = DashMap::new();
        for db_type in TrieDatabase::ALL {
            imported.insert(db_type, DashMap::new());
        }

        let pivot_config = PivotConfiguration {
            min_active_peers: config.min_active_peers,
            distance_to_head: config.pivot_distance_to_head,
            vote_threshold: config.pivot_vote_threshold,
        };

        Self {
            imported,
            required: channel::unbounded(),
            received: channel::unbounded(),
            complete: AtomicBool::new(false),
            evaluating: Mutex::new(()),
            pivot_selector: PivotSelector::new(pivot_config, network, event_publisher.clone()),
            completeness_tracker: CompletenessTracker::new(chain, config.sync_floor),
            event_publisher,
        }
    }

    /// Number of nodes imported into `db_type`.
    pub fn imported_count(&self, db_type: TrieDatabase) -> usize {
        self.imported.get(&db_type).map_or(0, |nodes| nodes.len())
    }

    /// Number of entries currently waiting in the required queue.
    pub fn required_count(&self) -> usize {
        self.required.1.len()
    }

    /// Run the sub-checks in order, stopping at the first incomplete one.
    fn all_checks_pass(&self, pivot: Option<&Block>) -> bool {
        let tracker = &self.completeness_tracker;
        let required = &self.required.0;

        tracker.is_world_state_complete(pivot, required)
            && tracker.is_storage_complete(pivot, required)
            && tracker.is_contract_details_complete(pivot, required)
            && tracker.is_block_data_complete(pivot)
            && tracker.is_receipt_data_complete(pivot)
    }
}

impl<C: Chain, N: Network> FastSync for ActiveFastSync<C, N> {
    fn import_node(&self, db_type: TrieDatabase, key: TrieNodeKey, value: TrieNodeValue) {
        if let Some(nodes) = self.imported.get(&db_type) {
            nodes.insert(key, value);
        }
    }

    fn contains_exact(&self, db_type: TrieDatabase, key: &TrieNodeKey, value: &TrieNodeValue) -> bool {
        self.imported
            .get(&db_type)
            .and_then(|nodes| nodes.get(key).map(|stored| *stored == *value))
            .unwrap_or(false)
    }

    fn is_imported(&self, db_type: TrieDatabase, key: &TrieNodeKey) -> bool {
        self.imported
            .get(&db_type)
            .map_or(false, |nodes| nodes.contains_key(key))
    }

    fn add_pivot_candidate(&self, block: Block) {
        if !self.pivot_selector.is_resolved() {
            self.pivot_selector.report_candidate(block);
        }
    }

    fn pivot_height(&self) -> Option<BlockHeight> {
        self.pivot_selector.target_height()
    }

    fn pivot(&self) -> Option<Block> {
        self.pivot_selector.pivot().cloned()
    }

    fn evaluate_completeness(&self) {
        if self.is_complete() {
            return;
        }

        // Concurrent evaluations would only push the same missing keys twice.
        let Some(_evaluating) = self.evaluating.try_lock() else {
            return;
        };

        let pivot = self.pivot_selector.pivot();
        if !self.all_checks_pass(pivot) {
            return;
        }

        if let Some(pivot) = pivot {
            if self
                .complete
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                Event::CompleteFastSync(CompleteFastSyncEvent {
                    timestamp: SystemTime::now(),
                    pivot: pivot.clone(),
                })
                .publish(&self.event_publisher);
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    fn handle_failed_import(&self, db_type: TrieDatabase, key: &TrieNodeKey, value: &TrieNodeValue, origin: PeerId) {
        // TODO: move the pivot back and re-derive the required nodes once a policy for how far back
        // to move it, and for peers deliberately sending bad nodes, is decided.
        log::warn!(
            "Inconsistent trie node {:?} ({} bytes) in {} from peer {} under pivot {:?}",
            key,
            value.len(),
            db_type,
            first_seven_base64_chars(origin.as_bytes()),
            self.pivot_selector.pivot().map(|pivot| pivot.hash),
        );
    }

    fn update_requests(&self, db_type: TrieDatabase, top_key: &TrieNodeKey, referenced_keys: Vec<TrieNodeKey>) {
        let mut missing = 0;
        for key in referenced_keys {
            if !self.is_imported(db_type, &key) {
                self.require(db_type, key);
                missing += 1;
            }
        }
        if missing > 0 {
            log::trace!("{} nodes referenced by {:?} in {} still required", missing, top_key, db_type);
        }
    }

    fn require(&self, db_type: TrieDatabase, key: TrieNodeKey) {
        let _ = self.required.0.send((db_type, key));
    }

    fn next_required(&self, timeout: Duration) -> Option<(TrieDatabase, TrieNodeKey)> {
        self.required.1.recv_timeout(timeout).ok()
    }

    fn receive(&self, batch: TrieNodeBatch) {
        let _ = self.received.0.send(batch);
    }

    fn next_received(&self, timeout: Duration) -> Option<TrieNodeBatch> {
        self.received.1.recv_timeout(timeout).ok()
    }
}
