/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistence of finalized chain state: header bytes and vote-set bytes in the hash-addressed
//! bucket, per-transaction locators, the height index, and the finalized-height pointer.
//!
//! Only finalized blocks are ever written here; candidates live purely in memory until they win.
//! Writes are best-effort in the sense that a failed finalize may leave a partial record set, so
//! re-finalizing the same height must be (and is) idempotent.

use borsh::BorshSerialize;

use crate::state::bucket::{
    Bucket, BLOCK_HEADER_HASH_BY_HEIGHT, BYTES_BY_HASH, CHAIN_PROPERTY, TRANSACTION_LOCATOR_BY_HASH,
};
use crate::state::kv_store::{KVStore, StoreError};
use crate::types::basic::{
    BlockHeight, CryptoHash, TransactionGroup, TransactionLocator,
};
use crate::types::block::Block;
use crate::types::transaction::TransactionList;

const KEY_LAST_BLOCK_HEIGHT: &[u8] = b"block.lastHeight";

/// Read/write access to the persisted records of the chain.
pub(crate) struct BlockStore<K: KVStore> {
    db: K,
}

impl<K: KVStore> BlockStore<K> {
    pub(crate) fn new(db: K) -> BlockStore<K> {
        BlockStore { db }
    }

    fn bucket(&self, prefix: [u8; 1]) -> Bucket<K> {
        Bucket::new(self.db.clone(), prefix)
    }

    /* ↓↓↓ Reads ↓↓↓ */

    /// The height of the last finalized block. `NotFound` on a fresh database.
    pub(crate) fn last_height(&self) -> Result<BlockHeight, StoreError> {
        self.bucket(CHAIN_PROPERTY).get(KEY_LAST_BLOCK_HEIGHT)
    }

    /// The id of the finalized block at `height`.
    pub(crate) fn id_by_height(&self, height: BlockHeight) -> Result<CryptoHash, StoreError> {
        let key = height
            .try_to_vec()
            .map_err(|err| StoreError::SerializeValue { source: err })?;
        self.bucket(BLOCK_HEADER_HASH_BY_HEIGHT).get(&key)
    }

    /// The raw bytes previously stored under `hash` (a header or vote-set encoding).
    pub(crate) fn bytes_by_hash(&self, hash: &CryptoHash) -> Result<Vec<u8>, StoreError> {
        self.bucket(BYTES_BY_HASH).get_bytes(&hash.bytes())
    }

    /// The locator of a finalized transaction.
    pub(crate) fn locator(&self, tx_id: &CryptoHash) -> Result<TransactionLocator, StoreError> {
        self.bucket(TRANSACTION_LOCATOR_BY_HASH).get(&tx_id.bytes())
    }

    /* ↓↓↓ Finalization ↓↓↓ */

    /// Persist every record of a newly finalized `block`: its canonical header bytes and vote-set
    /// bytes by hash, a locator per transaction, the height index entry, and the finalized-height
    /// pointer.
    pub(crate) fn store_finalized(&self, block: &Block) -> Result<(), StoreError> {
        let mut by_hash = self.bucket(BYTES_BY_HASH);
        by_hash.put(&block.header_bytes());
        by_hash.set_bytes(&block.votes().hash().bytes(), &block.votes().bytes());

        self.store_locators(
            block.patch_transactions(),
            block.height(),
            TransactionGroup::Patch,
        )?;
        self.store_locators(
            block.normal_transactions(),
            block.height(),
            TransactionGroup::Normal,
        )?;

        let height_key = block
            .height()
            .try_to_vec()
            .map_err(|err| StoreError::SerializeValue { source: err })?;
        self.bucket(BLOCK_HEADER_HASH_BY_HEIGHT)
            .set(&height_key, &block.id())?;

        self.bucket(CHAIN_PROPERTY)
            .set(KEY_LAST_BLOCK_HEIGHT, &block.height())
    }

    fn store_locators(
        &self,
        transactions: &TransactionList,
        height: BlockHeight,
        group: TransactionGroup,
    ) -> Result<(), StoreError> {
        let mut locators = self.bucket(TRANSACTION_LOCATOR_BY_HASH);
        for (index, tx) in transactions.iter().enumerate() {
            let locator = TransactionLocator {
                block_height: height,
                group,
                index_in_group: index as u32,
            };
            locators.set(&tx.id().bytes(), &locator)?;
        }
        Ok(())
    }
}
