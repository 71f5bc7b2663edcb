/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between peers as part of the trie state
//! protocol, and their binary codec.
//!
//! Both messages are borsh-encoded, which gives the following wire layout:
//!
//! ```text
//! TrieStateRequest:  db_type (u8) | node_key (u32 LE length + bytes) | limit (u32 LE)
//! TrieStateResponse: node_key (u32 LE length + bytes) | node_value (u32 LE length + bytes)
//!                    | db_type (u8) | referenced_nodes (u32 LE count + count * (key, value))
//! ```
//!
//! `referenced_nodes` has a count of zero when the request asked for the single node only.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    networking::messages::DecodeError,
    types::trie::{TrieDatabase, TrieNodeKey, TrieNodeValue},
};

/// Upper bound on the number of referenced nodes in one [`TrieStateResponse`], whatever the request's
/// limit says.
pub const MAXIMUM_BATCH_SIZE: u32 = 100;

/// Ask a peer for a trie node.
///
/// `limit` is interpreted by the serving peer:
/// - `0`: the server's default batch size.
/// - `1`: exactly the requested node, without any referenced nodes.
/// - `n`: the requested node plus at most `n - 1` referenced nodes, capped at the server's maximum
///   batch size.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TrieStateRequest {
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub limit: u32,
}

impl TrieStateRequest {
    pub fn new(db_type: TrieDatabase, node_key: TrieNodeKey, limit: u32) -> Self {
        Self { db_type, node_key, limit }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Serializing into a Vec<u8> does not fail.
        let _ = self.serialize(&mut bytes);
        bytes
    }

    /// Decode a request. Trailing bytes make the payload malformed.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::try_from_slice(bytes)?)
    }
}

/// Answer to a [`TrieStateRequest`]: the requested node and, optionally, nodes it references.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TrieStateResponse {
    pub node_key: TrieNodeKey,
    pub node_value: TrieNodeValue,
    pub db_type: TrieDatabase,
    pub referenced_nodes: BTreeMap<TrieNodeKey, TrieNodeValue>,
}

impl TrieStateResponse {
    /// A response carrying only the requested node.
    pub fn single(node_key: TrieNodeKey, node_value: TrieNodeValue, db_type: TrieDatabase) -> Self {
        Self {
            node_key,
            node_value,
            db_type,
            referenced_nodes: BTreeMap::new(),
        }
    }

    /// A response carrying the requested node and the nodes it references.
    pub fn with_referenced_nodes(
        node_key: TrieNodeKey,
        node_value: TrieNodeValue,
        referenced_nodes: BTreeMap<TrieNodeKey, TrieNodeValue>,
        db_type: TrieDatabase,
    ) -> Self {
        Self {
            node_key,
            node_value,
            db_type,
            referenced_nodes,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        // Serializing into a Vec<u8> does not fail.
        let _ = self.serialize(&mut bytes);
        bytes
    }

    /// Decode a response. Responses carrying more than [`MAXIMUM_BATCH_SIZE`] referenced nodes are
    /// rejected as a whole.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let response = Self::try_from_slice(bytes)?;
        if response.referenced_nodes.len() > MAXIMUM_BATCH_SIZE as usize {
            return Err(DecodeError::BatchTooLarge {
                count: response.referenced_nodes.len(),
                max: MAXIMUM_BATCH_SIZE,
            });
        }
        Ok(response)
    }
}
