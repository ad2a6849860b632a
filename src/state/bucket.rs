/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Typed, codec-aware views over fixed namespaces ("buckets") of the key-value database.
//!
//! # Record layout
//!
//! Every persistent record lives in one of four buckets. A record's key is the bucket's one-byte
//! prefix followed by the record key; values are Borsh-serialized, except in the hash-addressed
//! bucket, whose values are the raw bytes that hash to their key. The prefixes are externally
//! stable:
//!
//! |Bucket|Prefix|Mapping|
//! |---|---|---|
//! |[`CHAIN_PROPERTY`]|`[0]`|`"block.lastHeight"` -> [`BlockHeight`](crate::types::basic::BlockHeight)|
//! |[`BLOCK_HEADER_HASH_BY_HEIGHT`]|`[1]`|height -> block id|
//! |[`BYTES_BY_HASH`]|`[2]`|SHA-256 hash -> the bytes hashing to it (header and vote-set encodings)|
//! |[`TRANSACTION_LOCATOR_BY_HASH`]|`[3]`|transaction id -> [`TransactionLocator`](crate::types::basic::TransactionLocator)|
//!
//! Note that block headers stored in the hash-addressed bucket are encoded with the block wire
//! codec ([`BlockHeaderFormat`](crate::types::block::BlockHeaderFormat)), not the bucket value
//! codec; a bucket never re-encodes raw byte values.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::state::kv_store::{KVStore, StoreError, WriteBatch};
use crate::types::basic::CryptoHash;

// Bucket prefixes.
pub const CHAIN_PROPERTY: [u8; 1] = [0];
pub const BLOCK_HEADER_HASH_BY_HEIGHT: [u8; 1] = [1];
pub const BYTES_BY_HASH: [u8; 1] = [2];
pub const TRANSACTION_LOCATOR_BY_HASH: [u8; 1] = [3];

/// Concatenate two byteslices into one vector.
pub(crate) fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}

/// A thin typed overlay on one bucket of the key-value database.
pub(crate) struct Bucket<K: KVStore> {
    db: K,
    prefix: [u8; 1],
}

impl<K: KVStore> Bucket<K> {
    pub(crate) fn new(db: K, prefix: [u8; 1]) -> Bucket<K> {
        Bucket { db, prefix }
    }

    /// Read and decode the record at `key`. A miss is [`StoreError::NotFound`].
    pub(crate) fn get<V: BorshDeserialize>(&self, key: &[u8]) -> Result<V, StoreError> {
        let bytes = self.get_bytes(key)?;
        V::deserialize(&mut bytes.as_slice())
            .map_err(|err| StoreError::DeserializeValue { source: err })
    }

    /// Read the raw bytes at `key`.
    pub(crate) fn get_bytes(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.db
            .get(&combine(&self.prefix, key))
            .ok_or(StoreError::NotFound)
    }

    /// Encode `value` and write it at `key`.
    pub(crate) fn set<V: BorshSerialize>(&mut self, key: &[u8], value: &V) -> Result<(), StoreError> {
        let bytes = value
            .try_to_vec()
            .map_err(|err| StoreError::SerializeValue { source: err })?;
        self.set_bytes(key, &bytes);
        Ok(())
    }

    /// Write raw `value` bytes at `key`, bypassing the value codec.
    pub(crate) fn set_bytes(&mut self, key: &[u8], value: &[u8]) {
        let mut wb = K::WriteBatch::new();
        wb.set(&combine(&self.prefix, key), value);
        self.db.write(wb);
    }

    /// Write raw `value` bytes at the key `sha256(value)`, returning that key. This is how block
    /// headers and vote-set encodings enter the hash-addressed bucket.
    pub(crate) fn put(&mut self, value: &[u8]) -> CryptoHash {
        let hash = CryptoHash::of(value);
        self.set_bytes(&hash.bytes(), value);
        hash
    }
}
