/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which passes every published [`Event`] to the handlers registered for it.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
pub(crate) struct EventHandlers {
    pub(crate) select_pivot_height_handlers: Vec<HandlerPtr<SelectPivotHeightEvent>>,
    pub(crate) abandon_pivot_height_handlers: Vec<HandlerPtr<AbandonPivotHeightEvent>>,
    pub(crate) resolve_pivot_handlers: Vec<HandlerPtr<ResolvePivotEvent>>,
    pub(crate) receive_trie_state_request_handlers: Vec<HandlerPtr<ReceiveTrieStateRequestEvent>>,
    pub(crate) send_trie_state_response_handlers: Vec<HandlerPtr<SendTrieStateResponseEvent>>,
    pub(crate) send_trie_state_request_handlers: Vec<HandlerPtr<SendTrieStateRequestEvent>>,
    pub(crate) receive_trie_state_response_handlers: Vec<HandlerPtr<ReceiveTrieStateResponseEvent>>,
    pub(crate) import_trie_node_handlers: Vec<HandlerPtr<ImportTrieNodeEvent>>,
    pub(crate) reject_trie_node_handlers: Vec<HandlerPtr<RejectTrieNodeEvent>>,
    pub(crate) complete_fast_sync_handlers: Vec<HandlerPtr<CompleteFastSyncEvent>>,
}

/// User-defined handlers, one optional handler per event type.
#[derive(Default)]
pub(crate) struct UserHandlers {
    pub(crate) on_select_pivot_height: Option<HandlerPtr<SelectPivotHeightEvent>>,
    pub(crate) on_abandon_pivot_height: Option<HandlerPtr<AbandonPivotHeightEvent>>,
    pub(crate) on_resolve_pivot: Option<HandlerPtr<ResolvePivotEvent>>,
    pub(crate) on_receive_trie_state_request: Option<HandlerPtr<ReceiveTrieStateRequestEvent>>,
    pub(crate) on_send_trie_state_response: Option<HandlerPtr<SendTrieStateResponseEvent>>,
    pub(crate) on_send_trie_state_request: Option<HandlerPtr<SendTrieStateRequestEvent>>,
    pub(crate) on_receive_trie_state_response: Option<HandlerPtr<ReceiveTrieStateResponseEvent>>,
    pub(crate) on_import_trie_node: Option<HandlerPtr<ImportTrieNodeEvent>>,
    pub(crate) on_reject_trie_node: Option<HandlerPtr<RejectTrieNodeEvent>>,
    pub(crate) on_complete_fast_sync: Option<HandlerPtr<CompleteFastSyncEvent>>,
}

impl EventHandlers {
    /// Collect the user's handlers, plus the default logger of every event type if `log_events` is
    /// set.
    pub(crate) fn new(log_events: bool, user_handlers: UserHandlers) -> EventHandlers {
        fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
            let mut handlers = Vec::new();
            if log_events {
                handlers.push(T::get_logger());
            }
            handlers.extend(user_handler);
            handlers
        }

        EventHandlers {
            select_pivot_height_handlers: handlers(log_events, user_handlers.on_select_pivot_height),
            abandon_pivot_height_handlers: handlers(log_events, user_handlers.on_abandon_pivot_height),
            resolve_pivot_handlers: handlers(log_events, user_handlers.on_resolve_pivot),
            receive_trie_state_request_handlers: handlers(log_events, user_handlers.on_receive_trie_state_request),
            send_trie_state_response_handlers: handlers(log_events, user_handlers.on_send_trie_state_response),
            send_trie_state_request_handlers: handlers(log_events, user_handlers.on_send_trie_state_request),
            receive_trie_state_response_handlers: handlers(log_events, user_handlers.on_receive_trie_state_response),
            import_trie_node_handlers: handlers(log_events, user_handlers.on_import_trie_node),
            reject_trie_node_handlers: handlers(log_events, user_handlers.on_reject_trie_node),
            complete_fast_sync_handlers: handlers(log_events, user_handlers.on_complete_fast_sync),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.select_pivot_height_handlers.is_empty()
            && self.abandon_pivot_height_handlers.is_empty()
            && self.resolve_pivot_handlers.is_empty()
            && self.receive_trie_state_request_handlers.is_empty()
            && self.send_trie_state_response_handlers.is_empty()
            && self.send_trie_state_request_handlers.is_empty()
            && self.receive_trie_state_response_handlers.is_empty()
            && self.import_trie_node_handlers.is_empty()
            && self.reject_trie_node_handlers.is_empty()
            && self.complete_fast_sync_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::SelectPivotHeight(select_pivot_height_event) =>
                self.select_pivot_height_handlers.iter().for_each(|handler| handler(&select_pivot_height_event)),

            Event::AbandonPivotHeight(abandon_pivot_height_event) =>
                self.abandon_pivot_height_handlers.iter().for_each(|handler| handler(&abandon_pivot_height_event)),

            Event::ResolvePivot(resolve_pivot_event) =>
                self.resolve_pivot_handlers.iter().for_each(|handler| handler(&resolve_pivot_event)),

            Event::ReceiveTrieStateRequest(receive_request_event) =>
                self.receive_trie_state_request_handlers.iter().for_each(|handler| handler(&receive_request_event)),

            Event::SendTrieStateResponse(send_response_event) =>
                self.send_trie_state_response_handlers.iter().for_each(|handler| handler(&send_response_event)),

            Event::SendTrieStateRequest(send_request_event) =>
                self.send_trie_state_request_handlers.iter().for_each(|handler| handler(&send_request_event)),

            Event::ReceiveTrieStateResponse(receive_response_event) =>
                self.receive_trie_state_response_handlers.iter().for_each(|handler| handler(&receive_response_event)),

            Event::ImportTrieNode(import_trie_node_event) =>
                self.import_trie_node_handlers.iter().for_each(|handler| handler(&import_trie_node_event)),

            Event::RejectTrieNode(reject_trie_node_event) =>
                self.reject_trie_node_handlers.iter().for_each(|handler| handler(&reject_trie_node_event)),

            Event::CompleteFastSync(complete_fast_sync_event) =>
                self.complete_fast_sync_handlers.iter().for_each(|handler| handler(&complete_fast_sync_event)),
        }
    }
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("event_bus thread disconnected from main thread")
            }
        }

        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            // Every publisher is gone; wait for the shutdown signal.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(EVENT_POLL_INTERVAL),
        }
    })
}
