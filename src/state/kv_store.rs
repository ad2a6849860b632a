/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Defines the [KVStore] trait, which specifies the required interface for the key-value database
//! provided by the user, and the [StoreError] type reported by typed reads and writes over it.
//!
//! The block manager persists all of its records through this interface; see
//! [bucket](crate::state::bucket) for the record layout.

use std::io;

/// A handle to the user's chosen key-value database. Handles are cheap to clone and clones refer to
/// the same underlying database.
pub trait KVStore: KVGet + Clone + Send + Sync + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically apply a batch of writes.
    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// An ordered set of puts and deletes applied atomically by [`KVStore::write`].
pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error when reading or writing a typed record in a [bucket](crate::state::bucket::Bucket). A miss
/// is reported as the dedicated [`NotFound`](StoreError::NotFound) kind, distinguishable from codec
/// failures.
#[derive(Debug)]
pub enum StoreError {
    NotFound,
    SerializeValue { source: io::Error },
    DeserializeValue { source: io::Error },
}
