/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Subprotocol through which a fast syncing node downloads trie nodes from its peers.
//!
//! A node asks a peer for one trie node with a [`TrieStateRequest`](messages::TrieStateRequest),
//! optionally allowing the peer to add nodes the requested one references. The peer answers with a
//! [`TrieStateResponse`](messages::TrieStateResponse).
//!
//! - [`server`]: answers requests from peers. Runs whether or not the node itself fast syncs.
//! - [`client`]: sends requests for required nodes and receives responses.
//! - [`importer`]: writes received nodes to the chain.

pub mod messages;

pub mod client;

pub mod importer;

pub mod server;
