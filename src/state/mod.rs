/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Durable storage for the block manager: the pluggable key-value store interface, typed bucket
//! views over it, the persisted layout of finalized chain state, and the in-memory block cache.

pub mod kv_store;

pub mod bucket;

pub(crate) mod block_store;

pub(crate) mod cache;
