/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Implements the serving side of the trie state protocol, which lets peers that are fast syncing
//! download trie nodes from this node.
//!
//! ## Answering a request
//!
//! A [`TrieStateRequest`] names a partition, a node key, and a limit. The server looks the node up in
//! its [`Chain`]:
//! - If the node is not stored, the request is dropped. There is no negative answer; the requester
//!   relies on its own timeout.
//! - If the limit is 1, the response carries the node alone.
//! - Otherwise the node is expanded into the nodes it references, and the response carries the node
//!   plus up to `limit - 1` of them (or the maximum batch size if the limit is 0), never more than the
//!   maximum batch size.
//!
//! Empty and malformed requests are logged and dropped. Responses are sent fire-and-forget.

use std::{
    cmp::min,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crate::{
    chain::Chain,
    events::{Event, ReceiveTrieStateRequestEvent, SendTrieStateResponseEvent},
    logging::first_seven_base64_chars,
    networking::{network::Network, sending::SenderHandle},
    types::data_types::PeerId,
};

use super::messages::{TrieStateRequest, TrieStateResponse, MAXIMUM_BATCH_SIZE};

const REQUEST_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Number of referenced nodes to put in a response to a request with `limit`, given the server's
/// `max_batch_size`.
///
/// A limit of 0 means "the server's default", which is the maximum batch size. Otherwise the requested
/// node counts towards the limit, and the rest is capped at the maximum batch size.
pub fn effective_limit(limit: u32, max_batch_size: u32) -> u32 {
    match limit {
        0 => max_batch_size,
        limit => min(limit - 1, max_batch_size),
    }
}

/// Answers individual trie state requests.
pub struct TrieStateHandler<C: Chain, N: Network> {
    chain: C,
    sender: SenderHandle<N>,
    max_batch_size: u32,
    event_publisher: Option<Sender<Event>>,
}

impl<C: Chain, N: Network> TrieStateHandler<C, N> {
    /// Create a handler. `max_batch_size` is capped at [`MAXIMUM_BATCH_SIZE`].
    pub fn new(chain: C, network: N, max_batch_size: u32, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            chain,
            sender: SenderHandle::new(network),
            max_batch_size: min(max_batch_size, MAXIMUM_BATCH_SIZE),
            event_publisher,
        }
    }

    /// Answer the encoded `request` received from `origin`.
    pub fn on_request(&mut self, origin: PeerId, request: &[u8]) {
        if request.is_empty() {
            log::debug!(
                "Empty trie state request from peer {}",
                first_seven_base64_chars(origin.as_bytes())
            );
            return;
        }

        let TrieStateRequest {
            db_type,
            node_key,
            limit,
        } = match TrieStateRequest::decode(request) {
            Ok(request) => request,
            Err(err) => {
                log::error!(
                    "Failed to decode trie state request of {} bytes from peer {}: {}",
                    request.len(),
                    first_seven_base64_chars(origin.as_bytes()),
                    err
                );
                return;
            }
        };

        Event::ReceiveTrieStateRequest(ReceiveTrieStateRequestEvent {
            timestamp: SystemTime::now(),
            origin,
            db_type,
            node_key: node_key.clone(),
            limit,
        })
        .publish(&self.event_publisher);

        let Some(node_value) = self.chain.trie_node(&node_key, db_type) else {
            log::debug!("Requested trie node {:?} not found in {}", node_key, db_type);
            return;
        };

        let response = if limit == 1 {
            TrieStateResponse::single(node_key, node_value, db_type)
        } else {
            let limit = effective_limit(limit, self.max_batch_size);
            let referenced_nodes = self
                .chain
                .referenced_trie_nodes(&node_value, limit, db_type)
                .into_iter()
                .take(limit as usize)
                .collect();
            TrieStateResponse::with_referenced_nodes(node_key, node_value, referenced_nodes, db_type)
        };

        let event = SendTrieStateResponseEvent {
            timestamp: SystemTime::now(),
            peer: origin,
            db_type,
            node_key: response.node_key.clone(),
            referenced_nodes: response.referenced_nodes.len(),
        };
        self.sender.send(origin, response);
        Event::SendTrieStateResponse(event).publish(&self.event_publisher);
    }
}

/// Runs a [`TrieStateHandler`] on its own thread, answering the requests routed to it by the poller.
pub(crate) struct TrieStateServer<C: Chain, N: Network> {
    handler: TrieStateHandler<C, N>,
    requests: Receiver<(PeerId, Vec<u8>)>,
    shutdown_signal: Receiver<()>,
}

impl<C: Chain, N: Network> TrieStateServer<C, N> {
    pub(crate) fn new(
        config: TrieStateServerConfiguration,
        chain: C,
        network: N,
        requests: Receiver<(PeerId, Vec<u8>)>,
        shutdown_signal: Receiver<()>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        Self {
            handler: TrieStateHandler::new(chain, network, config.max_batch_size, event_publisher),
            requests,
            shutdown_signal,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => {
                    panic!("Trie state server thread disconnected from main thread")
                }
            }

            match self.requests.recv_timeout(REQUEST_POLL_INTERVAL) {
                Ok((origin, request)) => self.handler.on_request(origin, &request),
                Err(RecvTimeoutError::Timeout) => (),
                Err(RecvTimeoutError::Disconnected) => {
                    panic!("Trie state server thread disconnected from the poller")
                }
            }
        })
    }
}

/// Immutable parameters that define the behaviour of the [TrieStateServer].
pub(crate) struct TrieStateServerConfiguration {
    pub(crate) max_batch_size: u32,
}
