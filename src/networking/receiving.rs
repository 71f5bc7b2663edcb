/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for receiving messages from the P2P network.

use std::{
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::{
    events::Event,
    fast_sync::FastSync,
    logging::first_seven_base64_chars,
    trie_sync::client::receive_response,
    types::data_types::PeerId,
};

use super::{
    messages::{split_frame, MessageCode},
    network::Network,
};

/// Spawn the poller thread, which polls the [`Network`] for frames and routes them by their
/// [`MessageCode`]:
/// 1. Trie state requests are handed, still encoded, to the
///    [`TrieStateServer`](crate::trie_sync::server::TrieStateServer) through the returned receiver.
/// 2. Trie state responses are decoded and pushed onto the received queue of `fast_sync`.
///
/// Frames that are empty or carry an unknown code are logged and dropped.
pub(crate) fn start_polling<N: Network>(
    mut network: N,
    fast_sync: Arc<dyn FastSync>,
    event_publisher: Option<Sender<Event>>,
    shutdown_signal: Receiver<()>,
) -> (JoinHandle<()>, Receiver<(PeerId, Vec<u8>)>) {
    let (to_request_receiver, request_receiver) = mpsc::channel();

    let poller_thread = thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                panic!("Poller thread disconnected from main thread")
            }
        }

        if let Some((origin, frame)) = network.recv() {
            match split_frame(&frame) {
                Ok((MessageCode::RequestTrieState, payload)) => {
                    let _ = to_request_receiver.send((origin, payload.to_vec()));
                }
                Ok((MessageCode::ResponseTrieState, payload)) => {
                    receive_response(origin, payload, fast_sync.as_ref(), &event_publisher);
                }
                Err(err) => log::debug!(
                    "Dropping frame of {} bytes from peer {}: {}",
                    frame.len(),
                    first_seven_base64_chars(origin.as_bytes()),
                    err
                ),
            }
        } else {
            thread::yield_now()
        }
    });

    (poller_thread, request_receiver)
}
