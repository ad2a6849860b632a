/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error taxonomy of the block manager's public surface.
//!
//! Caller-initiated methods return a [`BlockManagerError`] directly; asynchronous task errors are
//! surfaced through the caller's callback exactly once per task.

use std::fmt::{self, Display, Formatter};

use crate::engine::EngineError;
use crate::state::kv_store::StoreError;
use crate::types::basic::CryptoHash;

#[derive(Debug)]
pub enum BlockManagerError {
    /// A requested record does not exist. Also distinguishes a fresh database from a reloadable one
    /// at startup.
    NotFound,

    /// Header/body mismatch, bad vote set, wrong height or prev-id linkage, or a bad transaction
    /// root.
    InvalidBlock { reason: String },

    /// The block's parent is not in the candidate tree: it may have been finalized and pruned, or
    /// never imported.
    InvalidPreviousId { prev_id: CryptoHash },

    /// Corruption discovered while following persistent pointers, or an executor that could not be
    /// initialized from persisted state.
    InvalidState { detail: String },

    /// `finalize` was called on a block whose parent is not the currently finalized node.
    InvalidStatusForBlock { block: CryptoHash },

    /// A receipt was requested but the block holding it is not finalized yet.
    ResultNotFinalized,

    /// A propagated execution-engine error.
    Engine(EngineError),

    /// A propagated storage error other than a miss.
    Store(StoreError),
}

impl Display for BlockManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockManagerError::NotFound => write!(f, "not found"),
            BlockManagerError::InvalidBlock { reason } => write!(f, "invalid block: {}", reason),
            BlockManagerError::InvalidPreviousId { prev_id } => {
                write!(f, "invalid previous id: {}", prev_id)
            }
            BlockManagerError::InvalidState { detail } => write!(f, "invalid state: {}", detail),
            BlockManagerError::InvalidStatusForBlock { block } => {
                write!(f, "invalid status for block {}", block)
            }
            BlockManagerError::ResultNotFinalized => write!(f, "result not finalized"),
            BlockManagerError::Engine(err) => write!(f, "engine error: {:?}", err),
            BlockManagerError::Store(err) => write!(f, "store error: {:?}", err),
        }
    }
}

impl From<EngineError> for BlockManagerError {
    fn from(value: EngineError) -> Self {
        BlockManagerError::Engine(value)
    }
}

impl From<StoreError> for BlockManagerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => BlockManagerError::NotFound,
            other => BlockManagerError::Store(other),
        }
    }
}
