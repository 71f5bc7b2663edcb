/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Fast sync for blockchain nodes: instead of replaying every block since genesis, a new node picks a
//! recent "pivot" block agreed on by its peers, downloads the state tries committed in that block node
//! by node, and declares itself synced once the tries, blocks, and receipts it needs are all stored.
//!
//! ## Components
//!
//! - [`fast_sync`]: the orchestrator. Selects the pivot, tracks which trie nodes are imported,
//!   required, and received, and evaluates completeness.
//! - [`trie_sync`]: the request/response protocol through which trie nodes are downloaded from, and
//!   served to, peers.
//! - [`service`]: builds the above from a [`Chain`](chain::Chain), a [`Network`](networking::network::Network),
//!   and a [`Configuration`](service::Configuration), and runs them on background threads.
//!
//! The node provides access to its storage and to its peers by implementing the [`chain::Chain`] and
//! [`networking::network::Network`] traits.

pub mod chain;

pub(crate) mod event_bus;

pub mod events;

pub mod fast_sync;

pub(crate) mod logging;

pub mod networking;

pub mod service;

pub mod trie_sync;

pub mod types;
