/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of fast sync events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.
//!
//! Events are published by the component that performed the action onto a channel drained by the
//! [event bus](crate::event_bus), which passes them to the registered handlers (including the
//! default [loggers](crate::logging) if enabled).

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::{
    block::Block,
    data_types::{BlockHeight, PeerId, VoteCount},
    trie::{TrieDatabase, TrieNodeKey},
};

pub enum Event {
    // Pivot selection events.
    SelectPivotHeight(SelectPivotHeightEvent),
    AbandonPivotHeight(AbandonPivotHeightEvent),
    ResolvePivot(ResolvePivotEvent),
    // Trie state protocol events.
    ReceiveTrieStateRequest(ReceiveTrieStateRequestEvent),
    SendTrieStateResponse(SendTrieStateResponseEvent),
    SendTrieStateRequest(SendTrieStateRequestEvent),
    ReceiveTrieStateResponse(ReceiveTrieStateResponseEvent),
    // Import events.
    ImportTrieNode(ImportTrieNodeEvent),
    RejectTrieNode(RejectTrieNodeEvent),
    CompleteFastSync(CompleteFastSyncEvent),
}

impl Event {
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus going away only means nobody listens anymore.
            let _ = event_publisher.send(self);
        }
    }
}

/// A pivot height was chosen and every active peer was asked for the block at that height.
pub struct SelectPivotHeightEvent {
    pub timestamp: SystemTime,
    pub height: BlockHeight,
    pub network_best_height: BlockHeight,
}

/// The network's best height was too low to choose a pivot height.
pub struct AbandonPivotHeightEvent {
    pub timestamp: SystemTime,
    pub network_best_height: BlockHeight,
}

pub struct ResolvePivotEvent {
    pub timestamp: SystemTime,
    pub pivot: Block,
    pub votes: VoteCount,
}

pub struct ReceiveTrieStateRequestEvent {
    pub timestamp: SystemTime,
    pub origin: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub limit: u32,
}

pub struct SendTrieStateResponseEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub referenced_nodes: usize,
}

pub struct SendTrieStateRequestEvent {
    pub timestamp: SystemTime,
    pub peer: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub limit: u32,
}

pub struct ReceiveTrieStateResponseEvent {
    pub timestamp: SystemTime,
    pub origin: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
    pub referenced_nodes: usize,
}

pub struct ImportTrieNodeEvent {
    pub timestamp: SystemTime,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
}

/// A node delivered by `origin` could not be imported. The rest of its batch was discarded.
pub struct RejectTrieNodeEvent {
    pub timestamp: SystemTime,
    pub origin: PeerId,
    pub db_type: TrieDatabase,
    pub node_key: TrieNodeKey,
}

pub struct CompleteFastSyncEvent {
    pub timestamp: SystemTime,
    pub pivot: Block,
}
