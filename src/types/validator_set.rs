/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about validator sets.
//!
//! A block's `next_validators` field names the validator set that is authoritative for the block
//! two heights above it: the commit-vote set attached to a block at height `h` certifies the block
//! at `h - 1`, and is checked against the `next_validators` of the block at `h - 2`.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::HashMap, slice};

use super::basic::{Address, CryptoHash, Power, TotalPower};

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

pub(crate) type VerifyingKeyBytes = [u8; 32];

/// Stores the identities of validators and their voting powers.
///
/// ## Ordering of validators
///
/// `ValidatorSet` internally maintains the list of validators in ascending order of their
/// `VerifyingKey`s. Signature sets in commit-vote sets are indexed by this order.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the validator set does not exceed `u128::MAX/2`.
#[derive(Clone, PartialEq)]
pub struct ValidatorSet {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl Default for ValidatorSet {
    fn default() -> Self {
        ValidatorSet::new()
    }
}

impl ValidatorSet {
    /// Create an empty validator set.
    pub fn new() -> ValidatorSet {
        Self {
            validators: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Put a `validator` with the specified `power` into the validator set, placing them in a
    /// position that preserves the ordering of validators.
    ///
    /// If `validator` already exists in the validator set, this function updates its power instead.
    pub fn put(&mut self, validator: &VerifyingKey, power: Power) {
        if !self.contains(validator) {
            let validator_bytes = validator.to_bytes();
            let insert_pos = self
                .validators
                .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
                .unwrap_err();
            self.validators.insert(insert_pos, *validator);
        }

        self.powers.insert(*validator, power);
    }

    /// Get the power of the specified `validator` inside the validator set.
    pub fn power(&self, validator: &VerifyingKey) -> Option<&Power> {
        self.powers.get(validator)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the validator set contains `validator`.
    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.powers.contains_key(validator)
    }

    /// Check whether any validator in the set has the given proposer `address`.
    pub fn contains_address(&self, address: &Address) -> bool {
        self.validators
            .iter()
            .any(|v| Address::from_verifying_key(v) == *address)
    }

    /// Get an iterator through validators' verifying keys which walks through them in ascending
    /// order.
    pub fn validators(&self) -> slice::Iter<VerifyingKey> {
        self.validators.iter()
    }

    /// Get a vector containing each validator and its power, in ascending order of the validators'
    /// verifying keys.
    pub fn validators_and_powers(&self) -> Vec<(VerifyingKey, Power)> {
        self.validators()
            .map(|v| (*v, *self.power(v).unwrap()))
            .collect()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the index of the given `validator` in the sorted order of `VerifyingKey`s in the
    /// validator set, if it is actually in the validator set.
    pub fn position(&self, validator: &VerifyingKey) -> Option<usize> {
        let validator_bytes = validator.to_bytes();
        match self
            .validators
            .binary_search_by(|v| v.to_bytes().cmp(&validator_bytes))
        {
            Ok(pos) => Some(pos),
            Err(_) => None,
        }
    }

    /// Compute the total power that a commit-vote set must match or exceed (`>=`) in order to count
    /// as a quorum under the validator set.
    pub(crate) fn quorum(&self) -> TotalPower {
        const TOTAL_POWER_OVERFLOW: &str =
            "Validator set power exceeds u128::MAX/2. Read the itemdoc for `ValidatorSet`.";

        TotalPower::new(
            (self
                .total_power()
                .int()
                .checked_mul(2)
                .expect(TOTAL_POWER_OVERFLOW)
                / 3)
                + 1,
        )
    }

    /// The hash of the set's canonical encoding, as committed in block headers.
    pub fn hash(&self) -> CryptoHash {
        let bytes: ValidatorSetBytes = self.into();
        CryptoHash::of(&bytes.try_to_vec().unwrap())
    }
}

/// Intermediate representation of [`ValidatorSet`] for safe serialization and deserialization.
///
/// ## Rationale
///
/// This type exists because it is not straightforward to implement `BorshSerialize` and
/// `BorshDeserialize` on `ValidatorSet`, since the latter type internally contains
/// [`ed25519_dalek::VerifyingKey`], which does not implement the Borsh traits.
///
/// This type is internally exactly like `ValidatorSet`, but replaces `VerifyingKey` with its raw
/// bytes, and so is straightforward to serialize and deserialize. However, this also means that
/// instances of this type are not guaranteed to contain valid Ed25519 verifying keys, and therefore
/// conversion from this type into `ValidatorSet` using `TryFrom` is fallible.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) struct ValidatorSetBytes {
    // The verifying keys of validators are included here in ascending order.
    validators: Vec<VerifyingKeyBytes>,
    powers: HashMap<VerifyingKeyBytes, Power>,
}

impl TryFrom<ValidatorSetBytes> for ValidatorSet {
    type Error = ed25519_dalek::SignatureError;

    fn try_from(value: ValidatorSetBytes) -> Result<Self, Self::Error> {
        let mut new_validator_set = ValidatorSet::new();
        for pk_bytes in &value.validators {
            let pk = VerifyingKey::from_bytes(pk_bytes)?;
            let power = value.powers.get(pk_bytes).copied().unwrap_or(Power::new(0));
            new_validator_set.put(&pk, power);
        }
        Ok(new_validator_set)
    }
}

impl From<&ValidatorSet> for ValidatorSetBytes {
    fn from(value: &ValidatorSet) -> ValidatorSetBytes {
        let new_validators = value.validators.iter().map(|pk| pk.to_bytes()).collect();

        let mut new_powers = <HashMap<VerifyingKeyBytes, Power>>::new();
        value
            .powers
            .iter()
            .for_each(|(k, v)| match new_powers.insert(k.to_bytes(), *v) {
                _ => (),
            });

        ValidatorSetBytes {
            validators: new_validators,
            powers: new_powers,
        }
    }
}
