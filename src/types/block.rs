/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.
//!
//! Fast sync only needs a thin view of a block: its position in the chain, the link to its
//! parent, and the root of the world state it commits to. Everything else the block carries is
//! kept as opaque `data`.

use borsh::{BorshDeserialize, BorshSerialize};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use super::data_types::{BlockHeight, CryptoHash};
use super::trie::TrieNodeKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub parent_hash: CryptoHash,
    pub state_root: CryptoHash,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(
        height: BlockHeight,
        parent_hash: CryptoHash,
        state_root: CryptoHash,
        data: Vec<u8>,
    ) -> Block {
        Block {
            height,
            hash: Block::hash(height, &parent_hash, &state_root, &data),
            parent_hash,
            state_root,
            data,
        }
    }

    pub fn hash(
        height: BlockHeight,
        parent_hash: &CryptoHash,
        state_root: &CryptoHash,
        data: &[u8],
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(height.int().to_le_bytes());
        hasher.update(parent_hash.bytes());
        hasher.update(state_root.bytes());
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        CryptoHash::new(hasher.finalize().into())
    }

    /// Checks if the stored hash matches the block's contents.
    pub fn is_correct(&self) -> bool {
        self.hash == Block::hash(self.height, &self.parent_hash, &self.state_root, &self.data)
    }

    /// The state root of this block as a key into the [`State`](super::trie::TrieDatabase::State)
    /// partition.
    pub fn state_root_key(&self) -> TrieNodeKey {
        TrieNodeKey::from(self.state_root)
    }
}
