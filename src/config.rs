/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator.

/// Operator-tunable settings of a [`BlockManager`](crate::manager::BlockManager).
#[derive(Clone)]
pub struct BlockManagerConfig {
    /// Capacity of the recently-accessed-blocks cache.
    pub cache_capacity: usize,

    /// Whether the default logging handlers defined in [logging](crate::logging) are installed.
    pub log_events: bool,
}

impl Default for BlockManagerConfig {
    fn default() -> Self {
        BlockManagerConfig {
            cache_capacity: 10,
            log_events: true,
        }
    }
}
