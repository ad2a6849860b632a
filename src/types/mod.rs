/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The types defined in `crate::types` are common across the components of the block manager:
//! inert newtypes, the block and its wire formats, transactions, validator sets, commit-vote sets,
//! and the node's signing identity.

pub mod basic;

pub mod block;

pub mod keypair;

pub mod transaction;

pub mod validator_set;

pub mod voting;
