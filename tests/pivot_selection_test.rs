use std::{
    sync::{
        mpsc::{self, Receiver},
        Barrier,
    },
    thread,
};

use fast_sync_rs::{
    events::Event,
    fast_sync::pivot::{PivotConfiguration, PivotSelector},
    types::{
        block::Block,
        data_types::{BlockHeight, CryptoHash, VoteCount},
    },
};

mod common;

use common::network::{mock_network, peer, NetworkStub};

/// Creates a network of `peers` + 1 stubs, and returns the stub of the syncing node.
fn network_with_peers(peers: u8) -> NetworkStub {
    mock_network((0..=peers).map(peer)).remove(0)
}

fn block_at(height: u64, tag: u8) -> Block {
    Block::new(
        BlockHeight::new(height),
        CryptoHash::new([tag; 32]),
        CryptoHash::new([tag.wrapping_add(1); 32]),
        vec![tag],
    )
}

fn selector(
    network: NetworkStub,
    min_active_peers: usize,
    vote_threshold: u32,
) -> (PivotSelector<NetworkStub>, Receiver<Event>) {
    let (event_publisher, event_subscriber) = mpsc::channel();
    let config = PivotConfiguration {
        min_active_peers,
        distance_to_head: 100,
        vote_threshold,
    };
    (PivotSelector::new(config, network, Some(event_publisher)), event_subscriber)
}

/// Tests that the block with the most votes at the pivot height becomes the pivot once enough votes
/// are in.
#[test]
fn pivot_selected_by_majority_test() {
    // 1. Start with 8 active peers and a best height of 1000.
    let network = network_with_peers(8);
    network.set_best_height(Some(BlockHeight::new(1000)));
    let (pivot_selector, events) = selector(network.clone(), 8, 9);

    // 2. Report 3 votes for b1, 5 votes for b2, and 1 vote for b3, interleaved.
    let b1 = block_at(900, 1);
    let b2 = block_at(900, 2);
    let b3 = block_at(900, 3);
    let reports = [&b1, &b2, &b2, &b1, &b3, &b2, &b1, &b2];
    for block in reports {
        pivot_selector.report_candidate(block.clone());
    }

    // 3. The height is chosen, and every active peer was asked for its block at that height.
    assert_eq!(pivot_selector.target_height(), Some(BlockHeight::new(900)));
    let pivot_requests = network.pivot_requests();
    assert_eq!(pivot_requests.len(), 8);
    assert!(pivot_requests.iter().all(|(_, height)| *height == BlockHeight::new(900)));

    // 4. 8 votes are not enough.
    assert!(!pivot_selector.is_resolved());
    assert_eq!(pivot_selector.votes(&b2), VoteCount::new(4));

    // 5. The ninth vote resolves the pivot to b2.
    pivot_selector.report_candidate(b2.clone());
    assert_eq!(pivot_selector.pivot(), Some(&b2));

    // 6. The tally is discarded once the pivot is resolved.
    assert_eq!(pivot_selector.votes(&b2), VoteCount::new(0));

    match events.try_recv() {
        Ok(Event::SelectPivotHeight(event)) => {
            assert_eq!(event.height, BlockHeight::new(900));
            assert_eq!(event.network_best_height, BlockHeight::new(1000));
        }
        _ => panic!("expected a SelectPivotHeight event"),
    }
    match events.try_recv() {
        Ok(Event::ResolvePivot(event)) => {
            assert_eq!(event.pivot, b2);
            assert_eq!(event.votes, VoteCount::new(5));
        }
        _ => panic!("expected a ResolvePivot event"),
    }
}

/// Tests that blocks reported at heights other than the pivot height are not counted.
#[test]
fn candidates_at_other_heights_ignored_test() {
    let network = network_with_peers(2);
    network.set_best_height(Some(BlockHeight::new(1000)));
    let (pivot_selector, _events) = selector(network, 2, 1);

    let stale = block_at(899, 7);
    pivot_selector.report_candidate(stale.clone());
    pivot_selector.report_candidate(block_at(901, 8));

    assert_eq!(pivot_selector.target_height(), Some(BlockHeight::new(900)));
    assert_eq!(pivot_selector.votes(&stale), VoteCount::new(0));
    assert!(!pivot_selector.is_resolved());

    let pivot = block_at(900, 9);
    pivot_selector.report_candidate(pivot.clone());
    assert_eq!(pivot_selector.pivot(), Some(&pivot));
}

/// Tests that a pivot height is not chosen on a chain that is too short, and that selection is
/// retried later.
#[test]
fn too_shallow_chain_abandoned_test() {
    // 1. A best height of 150 with a distance of 100 gives a target of 50, which is not above 100.
    let network = network_with_peers(3);
    network.set_best_height(Some(BlockHeight::new(150)));
    let (pivot_selector, events) = selector(network.clone(), 3, 1);

    pivot_selector.report_candidate(block_at(50, 1));

    assert_eq!(pivot_selector.target_height(), None);
    assert!(!pivot_selector.is_resolved());
    assert!(network.pivot_requests().is_empty());
    match events.try_recv() {
        Ok(Event::AbandonPivotHeight(event)) => {
            assert_eq!(event.network_best_height, BlockHeight::new(150))
        }
        _ => panic!("expected an AbandonPivotHeight event"),
    }

    // 2. Once the chain has grown, the next report chooses a height.
    network.set_best_height(Some(BlockHeight::new(500)));
    let pivot = block_at(400, 2);
    pivot_selector.report_candidate(pivot.clone());
    assert_eq!(pivot_selector.target_height(), Some(BlockHeight::new(400)));
    assert_eq!(pivot_selector.pivot(), Some(&pivot));
}

/// Tests that no height is chosen while too few peers are connected or the best height is unknown.
#[test]
fn selection_deferred_test() {
    // 1. Too few peers.
    let network = network_with_peers(3);
    network.set_best_height(Some(BlockHeight::new(1000)));
    let (pivot_selector, events) = selector(network.clone(), 8, 1);

    pivot_selector.report_candidate(block_at(900, 1));
    assert_eq!(pivot_selector.target_height(), None);
    assert!(network.pivot_requests().is_empty());
    assert!(events.try_recv().is_err());

    // 2. Unknown best height.
    let network = network_with_peers(8);
    let (pivot_selector, events) = selector(network.clone(), 8, 1);

    pivot_selector.report_candidate(block_at(900, 1));
    assert_eq!(pivot_selector.target_height(), None);
    assert!(network.pivot_requests().is_empty());
    assert!(events.try_recv().is_err());

    // 3. A best height of 0 counts as unknown.
    network.set_best_height(Some(BlockHeight::new(0)));
    pivot_selector.report_candidate(block_at(900, 1));
    assert_eq!(pivot_selector.target_height(), None);
}

/// Tests that ties are broken in favour of the block with the smallest hash, and that the pivot never
/// changes once resolved.
#[test]
fn tie_break_and_idempotence_test() {
    let network = network_with_peers(2);
    network.set_best_height(Some(BlockHeight::new(1000)));
    let (pivot_selector, _events) = selector(network, 2, 2);

    let b1 = block_at(900, 1);
    let b2 = block_at(900, 2);
    let smallest = if b1.hash < b2.hash { b1.clone() } else { b2.clone() };

    pivot_selector.report_candidate(b1.clone());
    pivot_selector.report_candidate(b2.clone());
    assert_eq!(pivot_selector.pivot(), Some(&smallest));

    for _ in 0..5 {
        pivot_selector.report_candidate(b1.clone());
        pivot_selector.report_candidate(b2.clone());
    }
    assert_eq!(pivot_selector.pivot(), Some(&smallest));
    assert_eq!(pivot_selector.target_height(), Some(BlockHeight::new(900)));
}

/// Tests that a block whose hash does not match its contents is not counted, so it can neither win
/// the tie-break nor become the pivot.
#[test]
fn forged_candidate_dropped_test() {
    let network = network_with_peers(2);
    network.set_best_height(Some(BlockHeight::new(1000)));
    let (pivot_selector, _events) = selector(network, 2, 2);

    let honest = block_at(900, 1);
    let mut forged = honest.clone();
    forged.hash = CryptoHash::new([0; 32]);
    forged.state_root = CryptoHash::new([9; 32]);
    assert!(!forged.is_correct());

    pivot_selector.report_candidate(honest.clone());
    pivot_selector.report_candidate(forged.clone());
    assert_eq!(pivot_selector.votes(&forged), VoteCount::new(0));
    assert!(!pivot_selector.is_resolved());

    pivot_selector.report_candidate(honest.clone());
    let pivot = pivot_selector.pivot().unwrap();
    assert!(pivot.is_correct());
    assert_eq!(pivot, &honest);
}

/// Tests that candidates reported from many threads at once choose the height once and resolve
/// exactly one pivot, leaving no votes behind.
#[test]
fn concurrent_reports_test() {
    const REPORTERS: u8 = 16;

    for _ in 0..20 {
        // 1. 8 active peers, one distinct block at the target height per reporting thread.
        let network = network_with_peers(8);
        network.set_best_height(Some(BlockHeight::new(1000)));
        let (pivot_selector, events) = selector(network.clone(), 8, 1);
        let blocks: Vec<Block> = (0..REPORTERS).map(|tag| block_at(900, tag)).collect();

        // 2. Release all reporters at once.
        let barrier = Barrier::new(REPORTERS as usize);
        thread::scope(|scope| {
            for block in &blocks {
                let pivot_selector = &pivot_selector;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    pivot_selector.report_candidate(block.clone());
                });
            }
        });

        // 3. Every peer was asked once, and a single pivot out of the reported blocks was resolved.
        assert_eq!(network.pivot_requests().len(), 8);
        let pivot = pivot_selector.pivot().expect("a pivot should be resolved").clone();
        assert!(blocks.contains(&pivot));
        assert!(blocks.iter().all(|block| pivot_selector.votes(block) == VoteCount::new(0)));

        let events: Vec<Event> = events.try_iter().collect();
        let selections = events
            .iter()
            .filter(|event| matches!(event, Event::SelectPivotHeight(_)))
            .count();
        let resolutions: Vec<&Block> = events
            .iter()
            .filter_map(|event| match event {
                Event::ResolvePivot(event) => Some(&event.pivot),
                _ => None,
            })
            .collect();
        assert_eq!(selections, 1);
        assert_eq!(resolutions, vec![&pivot]);
    }
}
