/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The requesting side of the trie state protocol.
//!
//! The [`TrieStateClient`] drains the required queue of a [`FastSync`] and turns every required node
//! into a [`TrieStateRequest`] sent to one of the active peers, picked round-robin. Nodes that were
//! imported while waiting in the queue are skipped. If no peer is connected the node is pushed back
//! and the client waits before trying again.
//!
//! Responses are not matched against requests: [`receive_response`] decodes whatever arrives and
//! pushes it onto the received queue, and the [importer](super::importer) decides what to keep.
//! Unanswered requests are not retried here; a node that is still missing is pushed onto the required
//! queue again by the next completeness check.

use std::{
    sync::{
        mpsc::{Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{
    events::{Event, ReceiveTrieStateResponseEvent, SendTrieStateRequestEvent},
    fast_sync::FastSync,
    logging::first_seven_base64_chars,
    networking::{network::Network, sending::SenderHandle},
    types::{
        data_types::PeerId,
        trie::{TrieDatabase, TrieNodeBatch, TrieNodeKey},
    },
};

use super::messages::{TrieStateRequest, TrieStateResponse};

const REQUIRED_POLL_INTERVAL: Duration = Duration::from_millis(50);

const NO_PEERS_BACKOFF: Duration = Duration::from_millis(200);

pub(crate) struct TrieStateClient<N: Network> {
    config: TrieStateClientConfiguration,
    fast_sync: Arc<dyn FastSync>,
    network: N,
    sender: SenderHandle<N>,
    next_peer: usize,
    shutdown_signal: Receiver<()>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> TrieStateClient<N> {
    pub(crate) fn new(
        config: TrieStateClientConfiguration,
        fast_sync: Arc<dyn FastSync>,
        network: N,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            config,
            fast_sync,
            sender: SenderHandle::new(network.clone()),
            network,
            next_peer: 0,
            shutdown_signal,
            event_publisher,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Trie state client thread disconnected from main thread")
                }
            }

            if let Some((db_type, node_key)) = self.fast_sync.next_required(REQUIRED_POLL_INTERVAL) {
                if !self.request(db_type, node_key) {
                    thread::sleep(NO_PEERS_BACKOFF);
                }
            }
        })
    }

    /// Request `node_key` from the next peer. Returns `false` if there was no peer to ask, in which case
    /// the node is pushed back onto the required queue.
    fn request(&mut self, db_type: TrieDatabase, node_key: TrieNodeKey) -> bool {
        if self.fast_sync.is_imported(db_type, &node_key) {
            return true;
        }

        let peers = self.network.active_peers();
        if peers.is_empty() {
            self.fast_sync.require(db_type, node_key);
            return false;
        }
        let peer = peers[self.next_peer % peers.len()];
        self.next_peer = self.next_peer.wrapping_add(1);

        let limit = self.config.request_limit;
        let event = SendTrieStateRequestEvent {
            timestamp: SystemTime::now(),
            peer,
            db_type,
            node_key: node_key.clone(),
            limit,
        };
        self.sender.send(peer, TrieStateRequest::new(db_type, node_key, limit));
        Event::SendTrieStateRequest(event).publish(&self.event_publisher);
        true
    }
}

/// Immutable parameters that define the behaviour of the [TrieStateClient].
pub(crate) struct TrieStateClientConfiguration {
    pub(crate) request_limit: u32,
}

/// Decode the encoded `response` received from `origin` and push it onto the received queue of
/// `fast_sync`. Malformed responses are logged and dropped whole.
pub fn receive_response(
    origin: PeerId,
    response: &[u8],
    fast_sync: &dyn FastSync,
    event_publisher: &Option<Sender<Event>>,
) {
    let TrieStateResponse {
        node_key,
        node_value,
        db_type,
        referenced_nodes,
    } = match TrieStateResponse::decode(response) {
        Ok(response) => response,
        Err(err) => {
            log::error!(
                "Failed to decode trie state response of {} bytes from peer {}: {}",
                response.len(),
                first_seven_base64_chars(origin.as_bytes()),
                err
            );
            return;
        }
    };

    Event::ReceiveTrieStateResponse(ReceiveTrieStateResponseEvent {
        timestamp: SystemTime::now(),
        origin,
        db_type,
        node_key: node_key.clone(),
        referenced_nodes: referenced_nodes.len(),
    })
    .publish(event_publisher);

    fast_sync.receive(TrieNodeBatch {
        origin,
        db_type,
        node_key,
        node_value,
        referenced_nodes,
    });
}
