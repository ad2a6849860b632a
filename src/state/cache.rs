/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A bounded LRU of recently accessed blocks, indexed both by block id and by height.
//!
//! Lookups through either key count as a reference for eviction purposes. The capacity is small
//! (see [`BlockManagerConfig`](crate::config::BlockManagerConfig)), so the cache keeps entries in a
//! recency-ordered vector rather than maintaining separate index maps.

use std::sync::Arc;

use crate::types::basic::{BlockHeight, CryptoHash};
use crate::types::block::Block;

pub(crate) struct BlockCache {
    capacity: usize,
    // Most recently referenced first.
    entries: Vec<Arc<Block>>,
}

impl BlockCache {
    pub(crate) fn new(capacity: usize) -> BlockCache {
        BlockCache {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Look up a block by id, refreshing its recency.
    pub(crate) fn get(&mut self, id: &CryptoHash) -> Option<Arc<Block>> {
        self.touch(|block| block.id() == *id)
    }

    /// Look up a block by height, refreshing its recency.
    pub(crate) fn get_by_height(&mut self, height: BlockHeight) -> Option<Arc<Block>> {
        self.touch(|block| block.height() == height)
    }

    /// Insert a block, evicting the least recently referenced entry if the cache is full. Inserting
    /// a block that is already present only refreshes its recency.
    pub(crate) fn put(&mut self, block: Arc<Block>) {
        if self.touch(|cached| cached.id() == block.id()).is_some() {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop();
        }
        self.entries.insert(0, block);
    }

    fn touch(&mut self, pred: impl Fn(&Block) -> bool) -> Option<Arc<Block>> {
        let pos = self.entries.iter().position(|block| pred(block))?;
        let block = self.entries.remove(pos);
        self.entries.insert(0, Arc::clone(&block));
        Some(block)
    }
}
