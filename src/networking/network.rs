/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Network`] trait, implemented by the node's peer manager.

use crate::types::data_types::{BlockHeight, PeerId};

pub trait Network: Clone + Send + 'static {
    /// Peers with an open connection right now.
    fn active_peers(&self) -> Vec<PeerId>;

    /// Number of peers with an open connection right now.
    fn active_peer_count(&self) -> usize {
        self.active_peers().len()
    }

    /// Highest block height reported by any peer, or `None` if no peer has reported its status yet.
    fn network_best_height(&self) -> Option<BlockHeight>;

    /// Instruct the connection to `peer` to request the block at `height` from it. Blocks received
    /// this way are expected to be reported back through
    /// [`FastSync::add_pivot_candidate`](crate::fast_sync::FastSync::add_pivot_candidate).
    fn set_pivot_request_base(&mut self, peer: PeerId, height: BlockHeight);

    /// Send an encoded message to the specified peer without blocking.
    fn send(&mut self, peer: PeerId, message: Vec<u8>);

    /// Receive an encoded message from any peer. Returns immediately with a None if no message is
    /// available now.
    fn recv(&mut self) -> Option<(PeerId, Vec<u8>)>;
}
