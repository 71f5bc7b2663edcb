/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The single path through which received trie nodes are written to the [`Chain`].
//!
//! Batches are taken from the received queue in arrival order. For every node of a batch, requested
//! node first:
//! 1. If the node was already imported with the same value, it is skipped.
//! 2. Otherwise it is imported into the chain and recorded as imported, and the keys it references that
//!    are not imported yet become required.
//! 3. If the chain rejects the node, the failure is reported to the orchestrator and the rest of the
//!    batch is discarded, since the peer that sent it cannot be trusted for it.
//!
//! Only one importer runs per node, so every key is written at most once.

use std::{
    sync::{
        mpsc::{Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{
    chain::Chain,
    events::{Event, ImportTrieNodeEvent, RejectTrieNodeEvent},
    fast_sync::FastSync,
    types::trie::TrieNodeBatch,
};

const RECEIVED_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct TrieNodeImporter<C: Chain> {
    chain: C,
    fast_sync: Arc<dyn FastSync>,
    event_publisher: Option<Sender<Event>>,
}

impl<C: Chain> TrieNodeImporter<C> {
    pub fn new(chain: C, fast_sync: Arc<dyn FastSync>, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            chain,
            fast_sync,
            event_publisher,
        }
    }

    /// Import every node of `batch`. Returns the number of nodes newly imported.
    pub fn import_batch(&mut self, batch: TrieNodeBatch) -> usize {
        let db_type = batch.db_type;
        let mut imported = 0;

        for (key, value) in batch.nodes() {
            if self.fast_sync.contains_exact(db_type, key, value) {
                continue;
            }

            if let Err(err) = self.chain.import_trie_node(key, value, db_type) {
                log::warn!("Discarding {} nodes received with {:?}: {}", batch.len(), key, err);
                self.fast_sync.handle_failed_import(db_type, key, value, batch.origin);
                Event::RejectTrieNode(RejectTrieNodeEvent {
                    timestamp: SystemTime::now(),
                    origin: batch.origin,
                    db_type,
                    node_key: key.clone(),
                })
                .publish(&self.event_publisher);
                return imported;
            }

            self.fast_sync.import_node(db_type, key.clone(), value.clone());
            imported += 1;
            Event::ImportTrieNode(ImportTrieNodeEvent {
                timestamp: SystemTime::now(),
                db_type,
                node_key: key.clone(),
            })
            .publish(&self.event_publisher);

            let referenced_keys = self
                .chain
                .referenced_trie_keys(value, db_type)
                .into_iter()
                .filter(|referenced| !batch.contains_key(referenced))
                .collect();
            self.fast_sync.update_requests(db_type, key, referenced_keys);
        }

        imported
    }

    pub(crate) fn start(mut self, shutdown_signal: Receiver<()>) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Importer thread disconnected from main thread")
                }
            }

            if let Some(batch) = self.fast_sync.next_received(RECEIVED_POLL_INTERVAL) {
                self.import_batch(batch);
            }
        })
    }
}
