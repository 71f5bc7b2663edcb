/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the service's
//! [configuration](crate::service::Configuration).
//!
//! fast_sync_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveTrieStateRequest](crate::events::ReceiveTrieStateRequestEvent) is printed:
//!
//! ```text
//! ReceiveTrieStateRequest, 1701329264, Id5u7f6, State, q80BAgM, 0
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the public key of the
//!   requesting peer.
//! - The fourth value is the partition the node is requested from.
//! - The fifth value is the first seven characters of the Base64 encoding of the requested key.
//! - The sixth value is the limit of the request.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const SELECT_PIVOT_HEIGHT: &str = "SelectPivotHeight";
pub const ABANDON_PIVOT_HEIGHT: &str = "AbandonPivotHeight";
pub const RESOLVE_PIVOT: &str = "ResolvePivot";

pub const RECEIVE_TRIE_STATE_REQUEST: &str = "ReceiveTrieStateRequest";
pub const SEND_TRIE_STATE_RESPONSE: &str = "SendTrieStateResponse";
pub const SEND_TRIE_STATE_REQUEST: &str = "SendTrieStateRequest";
pub const RECEIVE_TRIE_STATE_RESPONSE: &str = "ReceiveTrieStateResponse";

pub const IMPORT_TRIE_NODE: &str = "ImportTrieNode";
pub const REJECT_TRIE_NODE: &str = "RejectTrieNode";
pub const COMPLETE_FAST_SYNC: &str = "CompleteFastSync";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for SelectPivotHeightEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |select_pivot_height_event: &SelectPivotHeightEvent| {
            log::info!(
                "{}, {}, {}, {}",
                SELECT_PIVOT_HEIGHT,
                secs_since_unix_epoch(select_pivot_height_event.timestamp),
                select_pivot_height_event.height,
                select_pivot_height_event.network_best_height
            )
        };
        Box::new(logger)
    }
}

impl Logger for AbandonPivotHeightEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |abandon_pivot_height_event: &AbandonPivotHeightEvent| {
            log::info!(
                "{}, {}, {}",
                ABANDON_PIVOT_HEIGHT,
                secs_since_unix_epoch(abandon_pivot_height_event.timestamp),
                abandon_pivot_height_event.network_best_height
            )
        };
        Box::new(logger)
    }
}

impl Logger for ResolvePivotEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |resolve_pivot_event: &ResolvePivotEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RESOLVE_PIVOT,
                secs_since_unix_epoch(resolve_pivot_event.timestamp),
                first_seven_base64_chars(&resolve_pivot_event.pivot.hash.bytes()),
                resolve_pivot_event.pivot.height,
                resolve_pivot_event.votes
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveTrieStateRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_request_event: &ReceiveTrieStateRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_TRIE_STATE_REQUEST,
                secs_since_unix_epoch(receive_request_event.timestamp),
                first_seven_base64_chars(receive_request_event.origin.as_bytes()),
                receive_request_event.db_type,
                first_seven_base64_chars(receive_request_event.node_key.bytes()),
                receive_request_event.limit
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendTrieStateResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_response_event: &SendTrieStateResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_TRIE_STATE_RESPONSE,
                secs_since_unix_epoch(send_response_event.timestamp),
                first_seven_base64_chars(send_response_event.peer.as_bytes()),
                send_response_event.db_type,
                first_seven_base64_chars(send_response_event.node_key.bytes()),
                send_response_event.referenced_nodes
            )
        };
        Box::new(logger)
    }
}

impl Logger for SendTrieStateRequestEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |send_request_event: &SendTrieStateRequestEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                SEND_TRIE_STATE_REQUEST,
                secs_since_unix_epoch(send_request_event.timestamp),
                first_seven_base64_chars(send_request_event.peer.as_bytes()),
                send_request_event.db_type,
                first_seven_base64_chars(send_request_event.node_key.bytes()),
                send_request_event.limit
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveTrieStateResponseEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_response_event: &ReceiveTrieStateResponseEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                RECEIVE_TRIE_STATE_RESPONSE,
                secs_since_unix_epoch(receive_response_event.timestamp),
                first_seven_base64_chars(receive_response_event.origin.as_bytes()),
                receive_response_event.db_type,
                first_seven_base64_chars(receive_response_event.node_key.bytes()),
                receive_response_event.referenced_nodes
            )
        };
        Box::new(logger)
    }
}

impl Logger for ImportTrieNodeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |import_trie_node_event: &ImportTrieNodeEvent| {
            log::debug!(
                "{}, {}, {}, {}",
                IMPORT_TRIE_NODE,
                secs_since_unix_epoch(import_trie_node_event.timestamp),
                import_trie_node_event.db_type,
                first_seven_base64_chars(import_trie_node_event.node_key.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for RejectTrieNodeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |reject_trie_node_event: &RejectTrieNodeEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                REJECT_TRIE_NODE,
                secs_since_unix_epoch(reject_trie_node_event.timestamp),
                first_seven_base64_chars(reject_trie_node_event.origin.as_bytes()),
                reject_trie_node_event.db_type,
                first_seven_base64_chars(reject_trie_node_event.node_key.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CompleteFastSyncEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |complete_fast_sync_event: &CompleteFastSyncEvent| {
            log::info!(
                "{}, {}, {}, {}",
                COMPLETE_FAST_SYNC,
                secs_since_unix_epoch(complete_fast_sync_event.timestamp),
                first_seven_base64_chars(&complete_fast_sync_event.pivot.hash.bytes()),
                complete_fast_sync_event.pivot.height
            )
        };
        Box::new(logger)
    }
}

/// Get a more readable representation of a byte sequence by base64-encoding it and taking the first 7
/// characters.
pub(crate) fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
