/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [Chain] trait, which specifies everything the block manager consumes from the chain
//! container that hosts it: the backing database, the node's signing identity, the genesis
//! transaction bytes, the execution engine, and the decoder for consensus vote sets.

use std::sync::Arc;

use crate::engine::ExecutionEngine;
use crate::state::kv_store::KVStore;
use crate::types::keypair::Wallet;
use crate::types::voting::CommitVoteSet;

pub trait Chain: Send + Sync + 'static {
    type Store: KVStore;

    /// The key-value database backing the chain. Implementations of [KVStore] are cheap handles, so
    /// this returns a fresh handle per call.
    fn database(&self) -> Self::Store;

    /// The signing identity of this node, whose address stamps proposed blocks.
    fn wallet(&self) -> &Wallet;

    /// The raw bytes of the chain's genesis transaction.
    fn genesis(&self) -> &[u8];

    /// The state-transition service executing this chain's transactions.
    fn engine(&self) -> Arc<dyn ExecutionEngine>;

    /// Decode a commit-vote set from the encoding the consensus engine uses on the wire and in
    /// storage. Empty input decodes to the zero vote set.
    fn decode_vote_set(&self, bytes: &[u8]) -> std::io::Result<CommitVoteSet>;
}
