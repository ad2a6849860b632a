/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [CommitVoteSet] type: a bundle of signed votes certifying a block, produced
//! by the consensus vote engine and verified here against the validator set that was authoritative
//! for the certified block.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::Verifier;

use crate::errors::BlockManagerError;
use crate::types::basic::{CryptoHash, Round, SignatureSet, Timestamp, TotalPower};
use crate::types::block::Block;
use crate::types::validator_set::{Signature, ValidatorSet};

/// Proof that at least a quorum of validators have voted to commit a given block. A block carries
/// the commit-vote set certifying its parent; the set is checked against the `next_validators` of
/// the certified block's own parent.
///
/// A special case is the zero vote set, which is carried by the genesis block and by blocks whose
/// parent has no authorizing validator set (the block at height 1).
#[derive(Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitVoteSet {
    pub block_id: CryptoHash,
    pub round: Round,
    pub timestamp: Timestamp,
    pub signatures: SignatureSet,
}

impl CommitVoteSet {
    pub fn new(
        block_id: CryptoHash,
        round: Round,
        timestamp: Timestamp,
        signatures: SignatureSet,
    ) -> CommitVoteSet {
        CommitVoteSet {
            block_id,
            round,
            timestamp,
            signatures,
        }
    }

    /// The zero vote set: certifies nothing and carries no signatures.
    pub const fn zero() -> CommitVoteSet {
        CommitVoteSet {
            block_id: CryptoHash::zero(),
            round: Round::zero(),
            timestamp: Timestamp::zero(),
            signatures: SignatureSet::init(),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// The canonical encoding of the vote set, as persisted under [its hash](Self::hash).
    pub fn bytes(&self) -> Vec<u8> {
        self.try_to_vec().unwrap()
    }

    pub fn hash(&self) -> CryptoHash {
        CryptoHash::of(&self.bytes())
    }

    /// The commit time agreed by the voters. A block proposed on top of this vote set adopts it as
    /// its own timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The byte sequence each validator signs when voting to commit `block_id` in `round` at
    /// `timestamp`.
    pub fn vote_payload(block_id: &CryptoHash, round: Round, timestamp: Timestamp) -> Vec<u8> {
        (block_id, round, timestamp).try_to_vec().unwrap()
    }

    /// Checks that this vote set certifies `block` under `validators`.
    ///
    /// When no validator set is authoritative for `block` (its parent is the genesis block), only
    /// the link to `block` is checked, and the zero vote set is accepted as-is. Otherwise every
    /// present signature must be correct and the signers' combined power must reach a quorum.
    pub fn verify(
        &self,
        block: &Block,
        validators: Option<&ValidatorSet>,
    ) -> Result<(), BlockManagerError> {
        let validators = match validators {
            None => {
                if !self.is_zero() && self.block_id != block.id() {
                    return Err(BlockManagerError::InvalidBlock {
                        reason: "vote set does not certify its parent".to_string(),
                    });
                }
                return Ok(());
            }
            Some(validators) => validators,
        };

        if self.block_id != block.id() {
            return Err(BlockManagerError::InvalidBlock {
                reason: "vote set does not certify its parent".to_string(),
            });
        }
        if self.signatures.len() != validators.len() {
            return Err(BlockManagerError::InvalidBlock {
                reason: "vote set size does not match the validator set".to_string(),
            });
        }

        let payload = Self::vote_payload(&self.block_id, self.round, self.timestamp);
        let mut total_power = TotalPower::new(0);
        for (signature, (signer, power)) in self
            .signatures
            .iter()
            .zip(validators.validators_and_powers())
        {
            if let Some(signature) = signature {
                let signature = Signature::from_slice(&signature.bytes()).map_err(|_| {
                    BlockManagerError::InvalidBlock {
                        reason: "vote set contains a malformed signature".to_string(),
                    }
                })?;
                signer.verify(&payload, &signature).map_err(|_| {
                    BlockManagerError::InvalidBlock {
                        reason: "vote set contains an incorrect signature".to_string(),
                    }
                })?;
                total_power += power;
            }
        }

        if total_power >= validators.quorum() {
            Ok(())
        } else {
            Err(BlockManagerError::InvalidBlock {
                reason: "vote set does not form a quorum".to_string(),
            })
        }
    }
}
