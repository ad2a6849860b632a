/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [ExecutionEngine] trait, which specifies the interface between the block manager and the
//! state-transition service that actually executes transactions.
//!
//! The engine owns every piece of execution state; the block manager refers to pending or completed
//! executions only through opaque [transition ids](TransitionId) and observes them through the
//! documented completion events. Besides implementing the functions specified in the trait,
//! implementors are additionally expected to be *deterministic*: executing the same transaction
//! lists on the same prior state must produce the same effects every time.
//!
//! ## Completion events
//!
//! `patch`, `transit` and `propose` start work that completes asynchronously. When the manager
//! passes an [Observer], the engine must invoke [`Observer::validated`] once the transaction list
//! has been checked for well-formedness against the prior state, and [`Observer::executed`] once
//! the execution result is available, in that order, from any thread. Events on transitions whose
//! observer belongs to a task the manager has since stopped are discarded by the manager; the
//! engine does not need to know whether anyone is still listening.
//!
//! ## Disposal
//!
//! Every transition id returned by the engine is eventually passed to [`ExecutionEngine::dispose`]
//! exactly once, which cancels pending work and releases the engine resources backing it.

use std::sync::mpsc::Sender;

use crate::manager::syncer::SyncerMessage;
use crate::types::basic::{BlockHeight, CryptoHash, LogsBloom, Timestamp};
use crate::types::transaction::{Transaction, TransactionList};
use crate::types::validator_set::ValidatorSet;

/// Identifies one transition held by the engine. Ids are engine-assigned and never reused within
/// the lifetime of a process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TransitionId(pub u64);

/// Identifies the import or propose task on whose behalf a transition executes. Carried inside an
/// [Observer] so completion events can be routed back to their task.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub(crate) u64);

/// The phase a completion event reports on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransitionPhase {
    Validate,
    Execute,
}

/// A completion event: transactions validated, or result computed, for the transition observed on
/// behalf of `task`.
pub struct EngineEvent {
    pub(crate) task: TaskId,
    pub(crate) phase: TransitionPhase,
    pub(crate) outcome: Result<(), EngineError>,
}

/// The handle through which an engine reports transition completion. Cheap to clone; events may be
/// posted from any engine thread.
#[derive(Clone)]
pub struct Observer {
    target: ObserverTarget,
}

#[derive(Clone)]
enum ObserverTarget {
    /// Routes events through the manager's dispatcher, which serializes them with every other
    /// manager mutation.
    Task {
        task: TaskId,
        syncer: Sender<SyncerMessage>,
    },
    /// Delivers outcomes directly on a channel, in phase order. Used while bootstrapping genesis,
    /// before the candidate tree exists.
    Channel(Sender<Result<(), EngineError>>),
}

impl Observer {
    pub(crate) fn task(task: TaskId, syncer: Sender<SyncerMessage>) -> Observer {
        Observer {
            target: ObserverTarget::Task { task, syncer },
        }
    }

    pub(crate) fn channel(sender: Sender<Result<(), EngineError>>) -> Observer {
        Observer {
            target: ObserverTarget::Channel(sender),
        }
    }

    /// Report that the transition's transaction list has been validated against the prior state.
    pub fn validated(&self, outcome: Result<(), EngineError>) {
        self.notify(TransitionPhase::Validate, outcome)
    }

    /// Report that the transition's result has been computed and its
    /// [effects](ExecutionEngine::effects) are available.
    pub fn executed(&self, outcome: Result<(), EngineError>) {
        self.notify(TransitionPhase::Execute, outcome)
    }

    fn notify(&self, phase: TransitionPhase, outcome: Result<(), EngineError>) {
        match &self.target {
            ObserverTarget::Task { task, syncer } => {
                let _ = syncer.send(SyncerMessage::Engine(EngineEvent {
                    task: *task,
                    phase,
                    outcome,
                }));
            }
            ObserverTarget::Channel(sender) => {
                let _ = sender.send(outcome);
            }
        }
    }
}

/// The observable output of an executed transition.
#[derive(Clone)]
pub struct TransitionEffects {
    pub patch_transactions: TransactionList,
    pub normal_transactions: TransactionList,
    pub logs_bloom: LogsBloom,
    pub result: Vec<u8>,
    pub next_validators: ValidatorSet,
}

/// Which parts of a transition the engine commits durably on
/// [finalization](ExecutionEngine::finalize).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FinalizeScope(u8);

impl FinalizeScope {
    pub const NORMAL_TRANSACTIONS: FinalizeScope = FinalizeScope(0b001);
    pub const PATCH_TRANSACTIONS: FinalizeScope = FinalizeScope(0b010);
    pub const RESULT: FinalizeScope = FinalizeScope(0b100);
    pub const ALL: FinalizeScope = FinalizeScope(0b111);

    pub const fn contains(&self, other: FinalizeScope) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FinalizeScope {
    type Output = FinalizeScope;
    fn bitor(self, rhs: FinalizeScope) -> FinalizeScope {
        FinalizeScope(self.0 | rhs.0)
    }
}

/// Context the engine needs about the block a transition executes under.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockContext {
    pub height: BlockHeight,
    pub timestamp: Timestamp,
}

impl BlockContext {
    pub fn new(height: BlockHeight, timestamp: Timestamp) -> BlockContext {
        BlockContext { height, timestamp }
    }
}

impl From<&crate::types::block::Block> for BlockContext {
    fn from(block: &crate::types::block::Block) -> BlockContext {
        BlockContext {
            height: block.height(),
            timestamp: block.timestamp(),
        }
    }
}

/// Errors reported by an [ExecutionEngine].
#[derive(Debug)]
pub enum EngineError {
    /// A transaction failed well-formedness checks against the prior state.
    InvalidTransaction { reason: String },

    /// Execution started but could not produce a result.
    ExecutionFailed { reason: String },

    /// The referenced transition does not exist or has been disposed.
    UnknownTransition,
}

pub trait ExecutionEngine: Send + Sync + 'static {
    /// Create an already-executed transition seeded with a persisted `result` and the validator set
    /// that was current for it, or with empty prior state when both are `None` (fresh chain).
    fn create_initial_transition(
        &self,
        result: Option<Vec<u8>>,
        next_validators: Option<ValidatorSet>,
    ) -> Result<TransitionId, EngineError>;

    /// Start a transition like `base` but carrying `patches` as its patch-transaction list.
    fn patch(
        &self,
        base: TransitionId,
        patches: &TransactionList,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError>;

    /// Start a transition executing `transactions` on top of `base`'s result, under `context`.
    fn transit(
        &self,
        base: TransitionId,
        transactions: &TransactionList,
        context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError>;

    /// Start a transition executing engine-selected pending transactions on top of `base`'s result,
    /// under `context`. The chosen lists are reported through the new transition's
    /// [effects](Self::effects).
    fn propose(
        &self,
        base: TransitionId,
        context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError>;

    /// The observable output of `transition`. Only available after the transition has reported
    /// `executed`; for `transit` results, the transaction lists are available from creation.
    fn effects(&self, transition: TransitionId) -> Result<TransitionEffects, EngineError>;

    /// Durably commit the parts of `transition` selected by `scope`. Finalizing the same parts of
    /// the same transition twice must be idempotent.
    fn finalize(&self, transition: TransitionId, scope: FinalizeScope) -> Result<(), EngineError>;

    /// The patch-transaction set the engine wants applied on top of the state observed by
    /// `parent_in`, for inclusion in a block proposal.
    fn get_patches(&self, parent_in: TransitionId) -> TransactionList;

    /// Cancel pending work and release the engine resources backing `transition`.
    fn dispose(&self, transition: TransitionId);

    /* ↓↓↓ Decoding services ↓↓↓ */

    /// Decode one transaction from its raw bytes, assigning its stable id.
    fn transaction_from_bytes(&self, bytes: &[u8]) -> Result<Transaction, EngineError>;

    /// Decode the chain's genesis transaction.
    fn genesis_transaction_from_bytes(&self, bytes: &[u8]) -> Result<Transaction, EngineError>;

    /// Assemble a list from decoded transactions, computing its root hash.
    fn transaction_list_from_slice(&self, transactions: Vec<Transaction>) -> TransactionList;

    /// Recover a previously assembled list by its root hash, or `None` if the engine does not know
    /// it.
    fn transaction_list_from_hash(&self, hash: &CryptoHash) -> Option<TransactionList>;

    /// Recover a validator set by the hash of its canonical encoding, or `None` if the engine does
    /// not know it.
    fn validator_set_from_hash(&self, hash: &CryptoHash) -> Option<ValidatorSet>;
}
