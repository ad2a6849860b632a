/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the block type and its wire formats.
//!
//! A block exists in two representations:
//! 1. [`Block`]: fully materialized, with decoded transaction lists, validator set, and vote set.
//!    This is the form held in the candidate tree and the block cache.
//! 2. [`BlockHeaderFormat`] + [`BlockBodyFormat`]: the canonical Borsh wire encoding. The header
//!    encoding is hashed to produce the [block id](Block::id), is the byte sequence persisted in
//!    the hash-addressed bucket, and is what peers exchange; the body carries raw transaction and
//!    vote-set bytes whose hashes must agree with the header.
//!
//! The wire codec defined here is distinct from the key-value codec used by
//! [buckets](crate::state::bucket::Bucket); the two must not be mixed.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::errors::BlockManagerError;
use crate::types::basic::{Address, BlockHeight, CryptoHash, LogsBloom, Timestamp};
use crate::types::transaction::TransactionList;
use crate::types::validator_set::ValidatorSet;
use crate::types::voting::CommitVoteSet;

/// Canonical header encoding. Hashing the Borsh serialization of this struct yields the block id.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct BlockHeaderFormat {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    pub proposer: Option<Address>,
    pub prev_id: Option<CryptoHash>,
    pub logs_bloom: LogsBloom,
    pub result: Vec<u8>,
    pub patch_transactions_hash: CryptoHash,
    pub normal_transactions_hash: CryptoHash,
    pub next_validators_hash: CryptoHash,
    pub votes_hash: CryptoHash,
}

/// Body encoding: the raw bytes of each transaction per group, plus the raw vote-set bytes. On the
/// wire a block is a header followed immediately by a body in one Borsh stream.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct BlockBodyFormat {
    pub patch_transactions: Vec<Vec<u8>>,
    pub normal_transactions: Vec<Vec<u8>>,
    pub votes: Vec<u8>,
}

/// A fully materialized block.
///
/// The id is computed once at construction from the canonical header encoding; all field accessors
/// are cheap.
#[derive(Clone)]
pub struct Block {
    height: BlockHeight,
    timestamp: Timestamp,
    proposer: Option<Address>,
    prev_id: Option<CryptoHash>,
    logs_bloom: LogsBloom,
    result: Vec<u8>,
    patch_transactions: TransactionList,
    normal_transactions: TransactionList,
    next_validators: ValidatorSet,
    votes: CommitVoteSet,
    id: CryptoHash,
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: BlockHeight,
        timestamp: Timestamp,
        proposer: Option<Address>,
        prev_id: Option<CryptoHash>,
        logs_bloom: LogsBloom,
        result: Vec<u8>,
        patch_transactions: TransactionList,
        normal_transactions: TransactionList,
        next_validators: ValidatorSet,
        votes: CommitVoteSet,
    ) -> Block {
        let header = BlockHeaderFormat {
            height,
            timestamp,
            proposer,
            prev_id,
            logs_bloom: logs_bloom.clone(),
            result: result.clone(),
            patch_transactions_hash: patch_transactions.hash(),
            normal_transactions_hash: normal_transactions.hash(),
            next_validators_hash: next_validators.hash(),
            votes_hash: votes.hash(),
        };
        let id = CryptoHash::of(&header.try_to_vec().unwrap());
        Block {
            height,
            timestamp,
            proposer,
            prev_id,
            logs_bloom,
            result,
            patch_transactions,
            normal_transactions,
            next_validators,
            votes,
            id,
        }
    }

    /// The cryptographic hash of the canonical header encoding.
    pub fn id(&self) -> CryptoHash {
        self.id
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn proposer(&self) -> Option<&Address> {
        self.proposer.as_ref()
    }

    pub fn prev_id(&self) -> Option<&CryptoHash> {
        self.prev_id.as_ref()
    }

    pub fn logs_bloom(&self) -> &LogsBloom {
        &self.logs_bloom
    }

    /// Opaque executor output: post-state root, receipt root, and validator-set root. The receipts
    /// for this block's transactions live in the `result` of the block one height above.
    pub fn result(&self) -> &[u8] {
        &self.result
    }

    pub fn patch_transactions(&self) -> &TransactionList {
        &self.patch_transactions
    }

    pub fn normal_transactions(&self) -> &TransactionList {
        &self.normal_transactions
    }

    /// The validator set authoritative for the block at `self.height() + 2`.
    pub fn next_validators(&self) -> &ValidatorSet {
        &self.next_validators
    }

    /// The commit-vote set attesting to this block's parent.
    pub fn votes(&self) -> &CommitVoteSet {
        &self.votes
    }

    pub(crate) fn header_format(&self) -> BlockHeaderFormat {
        BlockHeaderFormat {
            height: self.height,
            timestamp: self.timestamp,
            proposer: self.proposer,
            prev_id: self.prev_id,
            logs_bloom: self.logs_bloom.clone(),
            result: self.result.clone(),
            patch_transactions_hash: self.patch_transactions.hash(),
            normal_transactions_hash: self.normal_transactions.hash(),
            next_validators_hash: self.next_validators.hash(),
            votes_hash: self.votes.hash(),
        }
    }

    /// The canonical header bytes, as persisted in the hash-addressed bucket.
    pub fn header_bytes(&self) -> Vec<u8> {
        self.header_format().try_to_vec().unwrap()
    }

    /// The full wire encoding: header followed by body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header_bytes();
        let body = BlockBodyFormat {
            patch_transactions: self.patch_transactions.to_bytes_vec(),
            normal_transactions: self.normal_transactions.to_bytes_vec(),
            votes: self.votes.bytes(),
        };
        bytes.extend_from_slice(&body.try_to_vec().unwrap());
        bytes
    }

    /// Checks this block against its parent and against the validator set that authorizes its
    /// vote set (`None` when the parent is the genesis block): height and prev-id linkage, strictly
    /// increasing timestamp, proposer membership, and the commit votes for the parent.
    pub(crate) fn verify(
        &self,
        parent: &Block,
        validators: Option<&ValidatorSet>,
    ) -> Result<(), BlockManagerError> {
        if self.height != parent.height() + 1 {
            return Err(BlockManagerError::InvalidBlock {
                reason: format!(
                    "height {} does not extend parent height {}",
                    self.height,
                    parent.height()
                ),
            });
        }
        if self.prev_id != Some(parent.id()) {
            return Err(BlockManagerError::InvalidBlock {
                reason: "prev id does not match parent id".to_string(),
            });
        }
        if self.timestamp <= parent.timestamp() {
            return Err(BlockManagerError::InvalidBlock {
                reason: format!(
                    "timestamp {} not after parent timestamp {}",
                    self.timestamp,
                    parent.timestamp()
                ),
            });
        }
        if let Some(validators) = validators {
            match &self.proposer {
                Some(proposer) if validators.contains_address(proposer) => {}
                _ => {
                    return Err(BlockManagerError::InvalidBlock {
                        reason: "proposer is not a member of the validator set".to_string(),
                    })
                }
            }
        }
        self.votes.verify(parent, validators)
    }
}
