/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Selection of the pivot block, the recent block whose world state fast sync downloads.
//!
//! ## Protocol
//!
//! The selector goes through three phases, each transition guarded by a compare-and-swap on its
//! state so that concurrent reporters never both choose a height or both resolve a pivot:
//!
//! ```text
//!   Unset ──(enough peers, known best height)──► Targeted(height) ──(votes ≥ threshold)──► Resolved(block)
//!     ▲
//!     └──(best height − distance ≤ distance: abandoned)
//! ```
//!
//! 1. **Choosing a height.** Once at least `min_active_peers` peers are connected and the network's
//!    best height `H` is known, the target height is `H − distance_to_head`. The lag keeps the pivot
//!    out of reach of reorganizations near the tip. If the target is not above `distance_to_head`,
//!    the chain is too short to fast sync safely: the attempt is abandoned and the selector goes back
//!    to unset. Otherwise every active peer is asked for its block at the target height.
//! 2. **Voting.** Each reported block at the target height is a vote for that exact block. Blocks at
//!    any other height are ignored, they can only come from stale requests.
//! 3. **Resolution.** Once the votes at the target height reach `vote_threshold`, the block with the
//!    most votes becomes the pivot. Ties go to the block with the smallest hash. The pivot never
//!    changes afterwards and the tally is discarded.
//!
//! ## Weakness
//!
//! Peers are not authenticated, so a party controlling enough connections can bias the vote.

use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    mpsc::Sender,
    OnceLock,
};
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{
    events::{AbandonPivotHeightEvent, Event, ResolvePivotEvent, SelectPivotHeightEvent},
    networking::network::Network,
    types::{
        block::Block,
        data_types::{BlockHeight, VoteCount},
    },
};

const UNSET: u8 = 0;
const TARGETING: u8 = 1;
const TARGETED: u8 = 2;
const RESOLVING: u8 = 3;
const RESOLVED: u8 = 4;

/// Immutable parameters that define the behaviour of the [PivotSelector].
#[derive(Clone, Debug)]
pub struct PivotConfiguration {
    pub min_active_peers: usize,
    pub distance_to_head: u64,
    pub vote_threshold: u32,
}

pub struct PivotSelector<N: Network> {
    config: PivotConfiguration,
    network: Mutex<N>,
    state: AtomicU8,
    target: AtomicU64,
    candidates: DashMap<Block, VoteCount>,
    pivot: OnceLock<Block>,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network> PivotSelector<N> {
    pub fn new(config: PivotConfiguration, network: N, event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            config,
            network: Mutex::new(network),
            state: AtomicU8::new(UNSET),
            target: AtomicU64::new(0),
            candidates: DashMap::new(),
            pivot: OnceLock::new(),
            event_publisher,
        }
    }

    /// Record `block` as a vote, choosing a target height first if none is chosen yet, then try to
    /// resolve the pivot.
    ///
    /// Blocks whose hash does not match their contents are dropped without being counted.
    pub fn report_candidate(&self, block: Block) {
        if !block.is_correct() {
            log::debug!(
                "Dropping pivot candidate {:?} at height {}: hash does not match contents",
                block.hash,
                block.height
            );
            return;
        }

        if self.state.load(Ordering::Acquire) == UNSET {
            self.try_target();
        }

        if self.state.load(Ordering::Acquire) != TARGETED {
            return;
        }

        if block.height.int() == self.target.load(Ordering::Acquire) {
            self.candidates.entry(block.clone()).or_default().increment();

            // A resolution that ran between the state check and the insert has already discarded
            // the tally; the vote must not outlive it.
            if self.state.load(Ordering::Acquire) != TARGETED {
                self.candidates.remove(&block);
                return;
            }
        }

        self.try_resolve();
    }

    /// The chosen pivot height, if one is chosen.
    pub fn target_height(&self) -> Option<BlockHeight> {
        match self.state.load(Ordering::Acquire) {
            TARGETED | RESOLVING | RESOLVED => Some(BlockHeight::new(self.target.load(Ordering::Acquire))),
            _ => None,
        }
    }

    /// The resolved pivot, if resolved.
    pub fn pivot(&self) -> Option<&Block> {
        self.pivot.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.pivot.get().is_some()
    }

    /// Votes currently counted for `block`.
    pub fn votes(&self, block: &Block) -> VoteCount {
        self.candidates.get(block).map_or(VoteCount::default(), |votes| *votes)
    }

    fn try_target(&self) {
        if self
            .state
            .compare_exchange(UNSET, TARGETING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut network = self.network.lock();

        if network.active_peer_count() < self.config.min_active_peers {
            self.state.store(UNSET, Ordering::Release);
            return;
        }

        let network_best_height = match network.network_best_height() {
            Some(height) if height.int() > 0 => height,
            _ => {
                self.state.store(UNSET, Ordering::Release);
                return;
            }
        };

        let distance = self.config.distance_to_head;
        let target = network_best_height.int().saturating_sub(distance);
        if target <= distance {
            self.candidates.clear();
            Event::AbandonPivotHeight(AbandonPivotHeightEvent {
                timestamp: SystemTime::now(),
                network_best_height,
            })
            .publish(&self.event_publisher);
            self.state.store(UNSET, Ordering::Release);
            return;
        }

        self.target.store(target, Ordering::Release);
        let height = BlockHeight::new(target);
        for peer in network.active_peers() {
            network.set_pivot_request_base(peer, height);
        }

        Event::SelectPivotHeight(SelectPivotHeightEvent {
            timestamp: SystemTime::now(),
            height,
            network_best_height,
        })
        .publish(&self.event_publisher);

        self.state.store(TARGETED, Ordering::Release);
    }

    fn try_resolve(&self) {
        let target = self.target.load(Ordering::Acquire);
        let total_votes: u64 = self
            .candidates
            .iter()
            .filter(|candidate| candidate.key().height.int() == target)
            .map(|candidate| candidate.value().int() as u64)
            .sum();
        if total_votes == 0 || total_votes < self.config.vote_threshold as u64 {
            return;
        }

        if self
            .state
            .compare_exchange(TARGETED, RESOLVING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        match tally(&self.candidates, target) {
            Some((pivot, votes)) => {
                self.candidates.clear();
                if self.pivot.set(pivot.clone()).is_ok() {
                    Event::ResolvePivot(ResolvePivotEvent {
                        timestamp: SystemTime::now(),
                        pivot,
                        votes,
                    })
                    .publish(&self.event_publisher);
                }
                self.state.store(RESOLVED, Ordering::Release);
            }
            None => self.state.store(TARGETED, Ordering::Release),
        }
    }
}

/// Pick the block at `target` height with the most votes. Among equally voted blocks the one with the
/// smallest hash wins.
fn tally(candidates: &DashMap<Block, VoteCount>, target: u64) -> Option<(Block, VoteCount)> {
    candidates
        .iter()
        .filter(|candidate| candidate.key().height.int() == target)
        .map(|candidate| (candidate.key().clone(), *candidate.value()))
        .max_by(|(block_a, votes_a), (block_b, votes_b)| {
            votes_a.cmp(votes_b).then_with(|| block_b.hash.cmp(&block_a.hash))
        })
}
