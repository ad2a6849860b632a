/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The manager-side [Transition] handle.
//!
//! A `Transition` wraps one engine transition id together with the engine that owns it. Handles can
//! be [forked](Transition::fork) to share the underlying execution: this is how a task's finished
//! transitions are installed into a tree node while the task still holds its own handles. The
//! engine transition is disposed exactly once, when the last handle referring to it is dropped, so
//! pruning a subtree or stopping a task releases executor resources without any party having to
//! know who else is still holding on.

use std::sync::Arc;

use crate::engine::{
    BlockContext, EngineError, ExecutionEngine, Observer, TransitionEffects, TransitionId,
};
use crate::errors::BlockManagerError;
use crate::types::block::Block;
use crate::types::transaction::TransactionList;

struct TransitionCore {
    engine: Arc<dyn ExecutionEngine>,
    id: TransitionId,
}

impl Drop for TransitionCore {
    fn drop(&mut self) {
        self.engine.dispose(self.id);
    }
}

/// A handle to a pending or completed state transition over a specific
/// (patch transactions, normal transactions, block context) input.
pub(crate) struct Transition {
    core: Arc<TransitionCore>,
}

impl Transition {
    /// Wrap a transition id freshly returned by the engine.
    pub(crate) fn new(engine: Arc<dyn ExecutionEngine>, id: TransitionId) -> Transition {
        Transition {
            core: Arc::new(TransitionCore { engine, id }),
        }
    }

    pub(crate) fn id(&self) -> TransitionId {
        self.core.id
    }

    fn engine(&self) -> &Arc<dyn ExecutionEngine> {
        &self.core.engine
    }

    /// Duplicate this handle. Both handles refer to the same engine transition; it is disposed when
    /// the last of them goes away.
    pub(crate) fn fork(&self) -> Transition {
        Transition {
            core: Arc::clone(&self.core),
        }
    }

    /// Release this handle. The engine transition is disposed if this was the last handle.
    pub(crate) fn dispose(self) {}

    /// Start a transition like this one but carrying `patches` as its patch-transaction list.
    pub(crate) fn patch(
        &self,
        patches: &TransactionList,
        observer: Option<Observer>,
    ) -> Result<Transition, EngineError> {
        let id = self.engine().patch(self.id(), patches, observer)?;
        Ok(Transition::new(Arc::clone(self.engine()), id))
    }

    /// Start a transition executing `transactions` on top of this one's result.
    pub(crate) fn transit(
        &self,
        transactions: &TransactionList,
        context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<Transition, EngineError> {
        let id = self
            .engine()
            .transit(self.id(), transactions, context, observer)?;
        Ok(Transition::new(Arc::clone(self.engine()), id))
    }

    /// Ask the engine to select pending transactions and execute them on top of this one's result.
    pub(crate) fn propose(
        &self,
        context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<Transition, EngineError> {
        let id = self.engine().propose(self.id(), context, observer)?;
        Ok(Transition::new(Arc::clone(self.engine()), id))
    }

    /// The observable output of this transition. Only available once the engine has reported
    /// `executed`.
    pub(crate) fn effects(&self) -> Result<TransitionEffects, EngineError> {
        self.engine().effects(self.id())
    }

    /// Confirms that this transition's computed effects match what `block`'s header committed to:
    /// the logs bloom, the result, and the next-validators hash.
    pub(crate) fn verify_result(&self, block: &Block) -> Result<(), BlockManagerError> {
        let effects = self.effects()?;
        if effects.result != block.result() {
            return Err(BlockManagerError::InvalidBlock {
                reason: "executed result does not match the header".to_string(),
            });
        }
        if &effects.logs_bloom != block.logs_bloom() {
            return Err(BlockManagerError::InvalidBlock {
                reason: "logs bloom does not match the header".to_string(),
            });
        }
        if effects.next_validators.hash() != block.next_validators().hash() {
            return Err(BlockManagerError::InvalidBlock {
                reason: "next validators do not match the header".to_string(),
            });
        }
        Ok(())
    }
}
