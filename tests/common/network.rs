use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use ed25519_dalek::{SigningKey, VerifyingKey};
use fast_sync_rs::{
    networking::network::Network,
    types::data_types::{BlockHeight, PeerId},
};

/// A deterministic peer identity.
pub(crate) fn peer(seed: u8) -> PeerId {
    SigningKey::from_bytes(&[seed; 32]).verifying_key()
}

/// A mock network stub which passes frames from and to threads using channels.
///
/// Every stub considers all the other stubs of its mock network active peers. The network's best
/// height is shared by all stubs, and every stub records the pivot requests made through it.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, Vec<u8>)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Vec<u8>)>>>,
    best_height: Arc<Mutex<Option<BlockHeight>>>,
    pivot_requests: Arc<Mutex<Vec<(PeerId, BlockHeight)>>>,
}

impl NetworkStub {
    pub(crate) fn my_verifying_key(&self) -> VerifyingKey {
        self.my_verifying_key
    }

    pub(crate) fn set_best_height(&self, height: Option<BlockHeight>) {
        *self.best_height.lock().unwrap() = height;
    }

    pub(crate) fn pivot_requests(&self) -> Vec<(PeerId, BlockHeight)> {
        self.pivot_requests.lock().unwrap().clone()
    }

    /// Deliver `frame` to this stub as if `origin` had sent it.
    pub(crate) fn inject(&self, origin: PeerId, frame: Vec<u8>) {
        if let Some(me) = self.all_peers.get(&self.my_verifying_key) {
            let _ = me.send((origin, frame));
        }
    }
}

impl Network for NetworkStub {
    fn active_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .all_peers
            .keys()
            .filter(|peer| **peer != self.my_verifying_key)
            .copied()
            .collect();
        peers.sort_by_key(|peer| peer.to_bytes());
        peers
    }

    fn network_best_height(&self) -> Option<BlockHeight> {
        *self.best_height.lock().unwrap()
    }

    fn set_pivot_request_base(&mut self, peer: PeerId, height: BlockHeight) {
        self.pivot_requests.lock().unwrap().push((peer, height));
    }

    fn send(&mut self, peer: PeerId, message: Vec<u8>) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn recv(&mut self) -> Option<(PeerId, Vec<u8>)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Vec<u8>)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    let best_height = Arc::new(Mutex::new(None));

    peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| NetworkStub {
            my_verifying_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            best_height: best_height.clone(),
            pivot_requests: Arc::new(Mutex::new(Vec::new())),
        })
        .collect()
}
