/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and shut down the fast sync service of a node.
//!
//! Nodes should use these methods to start fast syncing, or just to serve trie nodes to peers that
//! are fast syncing.
//!
//! ## Starting the service
//!
//! The service is started by building a [FastSyncSpec] and calling [start](FastSyncSpec::start) on
//! it. This spawns the following threads:
//! 1. The poller, which receives frames from the [Network] and routes them.
//! 2. The trie state server, which answers trie state requests from peers.
//! 3. If fast sync is enabled, the trie state client which requests required nodes, the importer which
//!    writes received nodes to the [Chain], and the completeness evaluator.
//! 4. If any event handler is registered (including the default loggers), the event bus.
//!
//! ```ignore
//! let configuration = Configuration::builder()
//!     .fast_sync_enabled(true)
//!     .min_active_peers(8)
//!     .pivot_distance_to_head(1024)
//!     .completeness_check_interval(Duration::from_secs(10))
//!     .log_events(true)
//!     .build();
//!
//! let service = FastSyncSpec::builder()
//!     .chain(chain)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_complete_fast_sync(|event| println!("fast sync complete at {}", event.pivot.height))
//!     .build()
//!     .start();
//! ```
//!
//! The node reports pivot candidates through [`FastSyncService::fast_sync`] and checks
//! [`is_complete`](crate::fast_sync::FastSync::is_complete) to decide when to switch to block-by-block
//! validation.
//!
//! ## Shutting down
//!
//! Dropping the [FastSyncService] signals every thread to stop and joins them.

use std::sync::{
    mpsc::{self, Sender},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::chain::Chain;
use crate::event_bus::*;
use crate::events::*;
use crate::fast_sync::{
    start_completeness_evaluator, ActiveFastSync, DisabledFastSync, FastSync, FastSyncConfiguration,
};
use crate::networking::{network::Network, receiving::start_polling};
use crate::trie_sync::{
    client::{TrieStateClient, TrieStateClientConfiguration},
    importer::TrieNodeImporter,
    messages::MAXIMUM_BATCH_SIZE,
    server::{TrieStateServer, TrieStateServerConfiguration},
};
use crate::types::data_types::BlockHeight;

/// Stores the user-defined parameters of the fast sync service, that is:
/// 1. Whether this node fast syncs at all. If not, it only serves trie nodes to its peers.
/// 2. The minimum number of active peers required before a pivot height is chosen.
/// 3. The distance to head, i.e., how far below the network's best height the pivot is chosen.
/// 4. The pivot vote threshold, i.e., how many votes at the pivot height must be collected before the
///    most voted block becomes the pivot.
/// 5. The limit put in outgoing trie state requests.
/// 6. The maximum number of referenced nodes put in a response to a peer.
/// 7. The interval between two completeness evaluations.
/// 8. The sync floor, the lowest height whose blocks and receipts must be stored for fast sync to be
///    complete.
/// 9. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Distance to head
///
/// A pivot is only chosen if `best height - distance to head > distance to head`. On shorter chains
/// the node should not fast sync.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.fast_sync_enabled(...)`
    - `.min_active_peers(...)`
    - `.pivot_distance_to_head(...)`
    - `.completeness_check_interval(...)`
    - `.log_events(...)`

    Optional:
    - `.pivot_vote_threshold(...)`
    - `.trie_request_limit(...)`
    - `.max_batch_size(...)`
    - `.sync_floor(...)`
"
))]
pub struct Configuration {
    #[builder(setter(doc = "Set whether this node fast syncs. Required."))]
    pub fast_sync_enabled: bool,
    #[builder(setter(doc = "Set the minimum number of active peers needed to choose a pivot height. Required."))]
    pub min_active_peers: usize,
    #[builder(setter(doc = "Set the number of blocks between the network's best height and the pivot height. Required."))]
    pub pivot_distance_to_head: u64,
    #[builder(default = 1, setter(doc = "Set the number of votes needed to resolve the pivot. Defaults to 1."))]
    pub pivot_vote_threshold: u32,
    #[builder(default = 0, setter(doc = "Set the limit of outgoing trie state requests. Defaults to 0 (the serving peer's default)."))]
    pub trie_request_limit: u32,
    #[builder(default = MAXIMUM_BATCH_SIZE, setter(doc = "Set the maximum number of referenced nodes in a response. Capped at, and defaults to, 100."))]
    pub max_batch_size: u32,
    #[builder(setter(doc = "Set the interval between two completeness evaluations. Required."))]
    pub completeness_check_interval: Duration,
    #[builder(default = BlockHeight::new(0), setter(doc = "Set the lowest height down to which blocks and receipts must be stored. Defaults to genesis."))]
    pub sync_floor: BlockHeight,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<&Configuration> for FastSyncConfiguration {
    fn from(config: &Configuration) -> Self {
        FastSyncConfiguration {
            min_active_peers: config.min_active_peers,
            pivot_distance_to_head: config.pivot_distance_to_head,
            pivot_vote_threshold: config.pivot_vote_threshold,
            sync_floor: config.sync_floor,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [FastSyncService].
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [FastSyncSpec]. On the builder call the following methods to construct a valid [FastSyncSpec].

    Required:
    - `.chain(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.on_select_pivot_height(...)`
    - `.on_abandon_pivot_height(...)`
    - `.on_resolve_pivot(...)`
    - `.on_receive_trie_state_request(...)`
    - `.on_send_trie_state_response(...)`
    - `.on_send_trie_state_request(...)`
    - `.on_receive_trie_state_response(...)`
    - `.on_import_trie_node(...)`
    - `.on_reject_trie_node(...)`
    - `.on_complete_fast_sync(...)`
"
))]
pub struct FastSyncSpec<C: Chain, N: Network> {
    // Required parameters
    #[builder(setter(doc = "Set the access to the local chain. The argument must implement the [Chain](crate::chain::Chain) trait. Required."))]
    chain: C,
    #[builder(setter(doc = "Set the peer manager. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [configuration](Configuration). Required."))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&SelectPivotHeightEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SelectPivotHeightEvent>),
    doc = "Register a handler closure to be invoked after a pivot height is chosen. Optional."))]
    on_select_pivot_height: Option<HandlerPtr<SelectPivotHeightEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AbandonPivotHeightEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AbandonPivotHeightEvent>),
    doc = "Register a handler closure to be invoked after the chain was found too short to choose a pivot height. Optional."))]
    on_abandon_pivot_height: Option<HandlerPtr<AbandonPivotHeightEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ResolvePivotEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ResolvePivotEvent>),
    doc = "Register a handler closure to be invoked after the pivot block is resolved. Optional."))]
    on_resolve_pivot: Option<HandlerPtr<ResolvePivotEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveTrieStateRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveTrieStateRequestEvent>),
    doc = "Register a handler closure to be invoked after a trie state request is received from a peer. Optional."))]
    on_receive_trie_state_request: Option<HandlerPtr<ReceiveTrieStateRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendTrieStateResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendTrieStateResponseEvent>),
    doc = "Register a handler closure to be invoked after a trie state response is sent to a peer. Optional."))]
    on_send_trie_state_response: Option<HandlerPtr<SendTrieStateResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendTrieStateRequestEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendTrieStateRequestEvent>),
    doc = "Register a handler closure to be invoked after a trie state request is sent to a peer. Optional."))]
    on_send_trie_state_request: Option<HandlerPtr<SendTrieStateRequestEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveTrieStateResponseEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveTrieStateResponseEvent>),
    doc = "Register a handler closure to be invoked after a trie state response is received and decoded. Optional."))]
    on_receive_trie_state_response: Option<HandlerPtr<ReceiveTrieStateResponseEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ImportTrieNodeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ImportTrieNodeEvent>),
    doc = "Register a handler closure to be invoked after a received trie node is imported. Optional."))]
    on_import_trie_node: Option<HandlerPtr<ImportTrieNodeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RejectTrieNodeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RejectTrieNodeEvent>),
    doc = "Register a handler closure to be invoked after a received trie node is rejected by the chain. Optional."))]
    on_reject_trie_node: Option<HandlerPtr<RejectTrieNodeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CompleteFastSyncEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CompleteFastSyncEvent>),
    doc = "Register a handler closure to be invoked once fast sync is complete. Optional."))]
    on_complete_fast_sync: Option<HandlerPtr<CompleteFastSyncEvent>>,
}

impl<C: Chain, N: Network> FastSyncSpec<C, N> {
    /// Starts all threads and channels associated with the fast sync service, and returns the handles
    /// to them in a [FastSyncService] struct.
    pub fn start(self) -> FastSyncService {
        let configuration = self.configuration;

        let event_handlers = EventHandlers::new(
            configuration.log_events,
            UserHandlers {
                on_select_pivot_height: self.on_select_pivot_height,
                on_abandon_pivot_height: self.on_abandon_pivot_height,
                on_resolve_pivot: self.on_resolve_pivot,
                on_receive_trie_state_request: self.on_receive_trie_state_request,
                on_send_trie_state_response: self.on_send_trie_state_response,
                on_send_trie_state_request: self.on_send_trie_state_request,
                on_receive_trie_state_response: self.on_receive_trie_state_response,
                on_import_trie_node: self.on_import_trie_node,
                on_reject_trie_node: self.on_reject_trie_node,
                on_complete_fast_sync: self.on_complete_fast_sync,
            },
        );

        let (event_publisher, event_bus) = if event_handlers.is_empty() {
            (None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus = start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_publisher), Some(BackgroundThread::new(event_bus, event_bus_shutdown)))
        };

        let fast_sync: Arc<dyn FastSync> = if configuration.fast_sync_enabled {
            Arc::new(ActiveFastSync::new(
                FastSyncConfiguration::from(&configuration),
                self.chain.clone(),
                self.network.clone(),
                event_publisher.clone(),
            ))
        } else {
            Arc::new(DisabledFastSync)
        };

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, trie_state_requests) = start_polling(
            self.network.clone(),
            fast_sync.clone(),
            event_publisher.clone(),
            poller_shutdown_receiver,
        );

        let (trie_state_server_shutdown, trie_state_server_shutdown_receiver) = mpsc::channel();
        let trie_state_server = TrieStateServer::new(
            TrieStateServerConfiguration {
                max_batch_size: configuration.max_batch_size,
            },
            self.chain.clone(),
            self.network.clone(),
            trie_state_requests,
            trie_state_server_shutdown_receiver,
            event_publisher.clone(),
        )
        .start();

        let mut fast_sync_threads = Vec::new();
        if configuration.fast_sync_enabled {
            let (client_shutdown, client_shutdown_receiver) = mpsc::channel();
            let client = TrieStateClient::new(
                TrieStateClientConfiguration {
                    request_limit: configuration.trie_request_limit,
                },
                fast_sync.clone(),
                self.network.clone(),
                client_shutdown_receiver,
                event_publisher.clone(),
            )
            .start();
            fast_sync_threads.push(BackgroundThread::new(client, client_shutdown));

            let (importer_shutdown, importer_shutdown_receiver) = mpsc::channel();
            let importer = TrieNodeImporter::new(self.chain, fast_sync.clone(), event_publisher)
                .start(importer_shutdown_receiver);
            fast_sync_threads.push(BackgroundThread::new(importer, importer_shutdown));

            let (evaluator_shutdown, evaluator_shutdown_receiver) = mpsc::channel();
            let evaluator = start_completeness_evaluator(
                fast_sync.clone(),
                configuration.completeness_check_interval,
                evaluator_shutdown_receiver,
            );
            fast_sync_threads.push(BackgroundThread::new(evaluator, evaluator_shutdown));
        }

        FastSyncService {
            fast_sync,
            event_bus,
            fast_sync_threads,
            trie_state_server: Some(BackgroundThread::new(trie_state_server, trie_state_server_shutdown)),
            poller: Some(BackgroundThread::new(poller, poller_shutdown)),
        }
    }
}

/// A handle to the background threads of the fast sync service. When this value is dropped, all
/// background threads are gracefully shut down.
pub struct FastSyncService {
    fast_sync: Arc<dyn FastSync>,
    event_bus: Option<BackgroundThread>,
    fast_sync_threads: Vec<BackgroundThread>,
    trie_state_server: Option<BackgroundThread>,
    poller: Option<BackgroundThread>,
}

impl FastSyncService {
    /// The orchestrator, through which the node reports pivot candidates and checks for completion.
    pub fn fast_sync(&self) -> &Arc<dyn FastSync> {
        &self.fast_sync
    }

    pub fn is_complete(&self) -> bool {
        self.fast_sync.is_complete()
    }
}

impl Drop for FastSyncService {
    fn drop(&mut self) {
        // The order of thread shutdown in this function is important: the trie state server receives
        // requests from the poller, and assumes that the poller will live longer than it.
        self.event_bus.take().into_iter().for_each(BackgroundThread::shutdown);
        self.fast_sync_threads.drain(..).for_each(BackgroundThread::shutdown);
        self.trie_state_server.take().into_iter().for_each(BackgroundThread::shutdown);
        self.poller.take().into_iter().for_each(BackgroundThread::shutdown);
    }
}

/// A spawned thread together with the channel that tells it to stop.
struct BackgroundThread {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
}

impl BackgroundThread {
    fn new(handle: JoinHandle<()>, shutdown: Sender<()>) -> Self {
        Self { handle, shutdown }
    }

    fn shutdown(self) {
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            log::error!("A fast sync thread panicked before shutting down");
        }
    }
}
