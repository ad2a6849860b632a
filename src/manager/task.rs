/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state machines driving a candidate block through its execution phases.
//!
//! An import or propose task moves through `ExecutingIn` (the patch-stage transition is running)
//! and, for imports, `ValidatingOut` (the patch stage succeeded and the normal-stage transition is
//! running). A task that installs its tree node and fires its callback is finished and leaves the
//! task table; a task that is cancelled or fails leaves it as well, after disposing its private
//! transition handles. Engine events addressed to a task no longer in the table are discarded,
//! which is what makes late callbacks on cancelled work harmless.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::SystemTime;

use crate::engine::{BlockContext, EngineError, TaskId, TransitionPhase};
use crate::errors::BlockManagerError;
use crate::events::{Event, InsertBlockEvent};
use crate::manager::syncer::Syncer;
use crate::manager::tree::TreeNode;
use crate::manager::ManagerCore;
use crate::transition::Transition;
use crate::types::basic::{Address, CryptoHash};
use crate::types::block::Block;
use crate::types::voting::CommitVoteSet;

/// The user callback fired exactly once when a task completes or fails.
pub(crate) type CompletionCallback =
    Box<dyn FnOnce(Result<Arc<Block>, BlockManagerError>) + Send>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum TaskState {
    ExecutingIn,
    ValidatingOut,
}

pub(crate) enum Task {
    Import(ImportTask),
    Propose(ProposeTask),
}

impl Task {
    fn on_event(
        &mut self,
        core: &mut ManagerCore,
        syncer: &Syncer,
        events: &Option<Sender<Event>>,
        task_id: TaskId,
        phase: TransitionPhase,
        outcome: Result<(), EngineError>,
    ) -> bool {
        match self {
            Task::Import(task) => task.on_event(core, syncer, events, task_id, phase, outcome),
            Task::Propose(task) => task.on_event(core, syncer, events, task_id, phase, outcome),
        }
    }
}

/// Routes an engine completion event to its task. Runs on the dispatcher with the core lock held.
pub(crate) fn handle_engine_event(
    core: &mut ManagerCore,
    syncer: &Syncer,
    events: &Option<Sender<Event>>,
    event: crate::engine::EngineEvent,
) {
    // A missing entry means the task was cancelled or already finished; the event is stale.
    let Some(mut task) = core.tasks.remove(&event.task) else {
        return;
    };
    let finished = task.on_event(core, syncer, events, event.task, event.phase, event.outcome);
    if !finished {
        core.tasks.insert(event.task, task);
    }
}

/// Cancels the task if it is still in flight. Returns whether cancellation succeeded; a task that
/// has already completed, failed, or been cancelled reports `false`.
pub(crate) fn cancel_task(core: &mut ManagerCore, task_id: TaskId) -> bool {
    match core.tasks.remove(&task_id) {
        Some(task) => {
            // Dropping the task disposes its private transition handles; its callback never fires.
            drop(task);
            log::debug!("CancelTask, {:?}, OK", task_id);
            true
        }
        None => {
            log::debug!("CancelTask, {:?}, Ignored", task_id);
            false
        }
    }
}

/// Install a finished candidate into the tree, unless a node with the same id already exists
/// (duplicate validations are no-ops). Fails only if the parent has left the tree in the meantime.
fn install_node(
    core: &mut ManagerCore,
    events: &Option<Sender<Event>>,
    block: &Arc<Block>,
    in_transition: Transition,
    preexe: Transition,
) -> Result<(), BlockManagerError> {
    if core.tree.contains(&block.id()) {
        return Ok(());
    }
    let parent_id = block.prev_id().copied().unwrap_or(CryptoHash::zero());
    let node = TreeNode::new(Arc::clone(block), in_transition, preexe);
    if !core.tree.attach(&parent_id, node) {
        return Err(BlockManagerError::InvalidPreviousId { prev_id: parent_id });
    }
    Event::InsertBlock(InsertBlockEvent {
        timestamp: SystemTime::now(),
        block: Arc::clone(block),
    })
    .publish(events);
    Ok(())
}

pub(crate) struct ImportTask {
    state: TaskState,
    block: Arc<Block>,
    in_transition: Option<Transition>,
    out_transition: Option<Transition>,
    cb: Option<CompletionCallback>,
}

impl ImportTask {
    pub(crate) fn new(
        block: Arc<Block>,
        in_transition: Transition,
        cb: CompletionCallback,
    ) -> ImportTask {
        ImportTask {
            state: TaskState::ExecutingIn,
            block,
            in_transition: Some(in_transition),
            out_transition: None,
            cb: Some(cb),
        }
    }

    /// Dispose both private handles and schedule the failure callback. The task is finished.
    fn fail(&mut self, syncer: &Syncer, err: BlockManagerError) -> bool {
        if let Some(tr) = self.in_transition.take() {
            tr.dispose();
        }
        if let Some(tr) = self.out_transition.take() {
            tr.dispose();
        }
        if let Some(cb) = self.cb.take() {
            syncer.call_later(move || cb(Err(err)));
        }
        true
    }

    fn on_event(
        &mut self,
        core: &mut ManagerCore,
        syncer: &Syncer,
        events: &Option<Sender<Event>>,
        task_id: TaskId,
        phase: TransitionPhase,
        outcome: Result<(), EngineError>,
    ) -> bool {
        match (phase, self.state) {
            (TransitionPhase::Validate, TaskState::ExecutingIn) => match outcome {
                Ok(()) => false,
                Err(err) => self.fail(syncer, err.into()),
            },
            (TransitionPhase::Execute, TaskState::ExecutingIn) => {
                if let Err(err) = outcome {
                    return self.fail(syncer, err.into());
                }
                let in_transition = self.in_transition.as_ref().unwrap();
                if let Err(err) = in_transition.verify_result(&self.block) {
                    return self.fail(syncer, err);
                }
                let out = in_transition.transit(
                    self.block.normal_transactions(),
                    BlockContext::from(&*self.block),
                    Some(syncer.observer(task_id)),
                );
                match out {
                    Ok(out) => {
                        self.out_transition = Some(out);
                        self.state = TaskState::ValidatingOut;
                        false
                    }
                    Err(err) => self.fail(syncer, err.into()),
                }
            }
            (TransitionPhase::Validate, TaskState::ValidatingOut) => {
                if let Err(err) = outcome {
                    return self.fail(syncer, err.into());
                }
                let installed = install_node(
                    core,
                    events,
                    &self.block,
                    self.in_transition.as_ref().unwrap().fork(),
                    self.out_transition.as_ref().unwrap().fork(),
                );
                if let Err(err) = installed {
                    return self.fail(syncer, err);
                }
                if let Some(tr) = self.in_transition.take() {
                    tr.dispose();
                }
                if let Some(tr) = self.out_transition.take() {
                    tr.dispose();
                }
                let block = Arc::clone(&self.block);
                if let Some(cb) = self.cb.take() {
                    syncer.call_later(move || cb(Ok(block)));
                }
                true
            }
            // The normal stage completes on its validate event; its execute event carries nothing
            // further for an import.
            (TransitionPhase::Execute, TaskState::ValidatingOut) => false,
        }
    }
}

pub(crate) struct ProposeTask {
    state: TaskState,
    parent_block: Arc<Block>,
    votes: CommitVoteSet,
    proposer: Address,
    in_transition: Option<Transition>,
    cb: Option<CompletionCallback>,
}

impl ProposeTask {
    pub(crate) fn new(
        parent_block: Arc<Block>,
        votes: CommitVoteSet,
        proposer: Address,
        in_transition: Transition,
        cb: CompletionCallback,
    ) -> ProposeTask {
        ProposeTask {
            state: TaskState::ExecutingIn,
            parent_block,
            votes,
            proposer,
            in_transition: Some(in_transition),
            cb: Some(cb),
        }
    }

    fn fail(&mut self, syncer: &Syncer, err: BlockManagerError) -> bool {
        if let Some(tr) = self.in_transition.take() {
            tr.dispose();
        }
        if let Some(cb) = self.cb.take() {
            syncer.call_later(move || cb(Err(err)));
        }
        true
    }

    fn on_event(
        &mut self,
        core: &mut ManagerCore,
        syncer: &Syncer,
        events: &Option<Sender<Event>>,
        _task_id: TaskId,
        phase: TransitionPhase,
        outcome: Result<(), EngineError>,
    ) -> bool {
        debug_assert_eq!(self.state, TaskState::ExecutingIn);
        match phase {
            TransitionPhase::Validate => match outcome {
                Ok(()) => false,
                Err(err) => self.fail(syncer, err.into()),
            },
            TransitionPhase::Execute => {
                if let Err(err) = outcome {
                    return self.fail(syncer, err.into());
                }
                let height = self.parent_block.height() + 1;
                let timestamp = self.votes.timestamp();
                let in_transition = self.in_transition.as_ref().unwrap();
                let proposed =
                    match in_transition.propose(BlockContext::new(height, timestamp), None) {
                        Ok(proposed) => proposed,
                        Err(err) => return self.fail(syncer, err.into()),
                    };
                let in_effects = match in_transition.effects() {
                    Ok(effects) => effects,
                    Err(err) => return self.fail(syncer, err.into()),
                };
                let proposed_effects = match proposed.effects() {
                    Ok(effects) => effects,
                    Err(err) => return self.fail(syncer, err.into()),
                };
                let block = Arc::new(Block::new(
                    height,
                    timestamp,
                    Some(self.proposer),
                    Some(self.parent_block.id()),
                    in_effects.logs_bloom,
                    in_effects.result,
                    proposed_effects.patch_transactions,
                    proposed_effects.normal_transactions,
                    in_effects.next_validators,
                    self.votes.clone(),
                ));
                let installed = install_node(
                    core,
                    events,
                    &block,
                    in_transition.fork(),
                    proposed,
                );
                if let Err(err) = installed {
                    return self.fail(syncer, err);
                }
                if let Some(tr) = self.in_transition.take() {
                    tr.dispose();
                }
                if let Some(cb) = self.cb.take() {
                    syncer.call_later(move || cb(Ok(block)));
                }
                true
            }
        }
    }
}
