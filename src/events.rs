/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the block manager.
//!
//! ## Event enum
//!
//! Significant occurrences are: a candidate block entering the tree, a block being finalized, and
//! an abandoned branch being pruned. Each corresponds to a variant of the [event enum](Event),
//! whose inner struct stores information summarizing the occurrence, always including a timestamp
//! corresponding to the exact time when the event occurred.
//!
//! ## Registering event handlers
//!
//! Library users can register event handler closures, which are internally called by the
//! [event bus](crate::event_bus::start_event_bus) thread when the handler's particular event
//! variant happens. Handlers are passed to
//! [`BlockManager::new`](crate::manager::BlockManager::new); default handlers that log events out
//! are enabled through the [configuration](crate::config::BlockManagerConfig).
//!
//! ## Timing
//!
//! Events are always emitted **after** the corresponding occurrence is completed. For example, the
//! [finalize event](FinalizeBlockEvent) is only emitted after the finalized records have been
//! persisted.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::SystemTime;

use crate::types::basic::{BlockHeight, CryptoHash};
use crate::types::block::Block;

/// Enumerates all events defined for the block manager.
pub enum Event {
    InsertBlock(InsertBlockEvent),
    FinalizeBlock(FinalizeBlockEvent),
    PruneBlock(PruneBlockEvent),
}

impl Event {
    /// Publishes a given instance of the [Event](Event) enum on the event publisher channel (if the
    /// channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A validated candidate block was attached to the tree.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Arc<Block>,
}

/// A block, identifiable by its id, was finalized, and its records persisted.
pub struct FinalizeBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub height: BlockHeight,
}

/// A candidate, identifiable by its id, was pruned: its subtree lost to a sibling that got
/// finalized, and its executor resources released.
pub struct PruneBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
}
