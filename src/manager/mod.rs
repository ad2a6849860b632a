/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [BlockManager]: the subsystem that ingests, validates, extends, and finalizes blocks of a
//! linear chain while concurrently executing their transactions through the pluggable
//! [execution engine](crate::engine::ExecutionEngine).
//!
//! ## Construction
//!
//! [`BlockManager::new`] either bootstraps a fresh chain from the genesis transaction supplied by
//! the [chain container](crate::chain::Chain), or recovers the persisted chain head. Either way,
//! after construction the candidate tree is rooted at the finalized tip.
//!
//! ## Extending the chain
//!
//! [`import`](BlockManager::import) (or [`import_block`](BlockManager::import_block)) verifies a
//! block received from a peer against its parent and speculatively executes it;
//! [`propose`](BlockManager::propose) builds a new block on a parent from engine-selected
//! transactions. Both complete asynchronously through a callback and return a [Canceller]. A
//! successfully validated candidate joins the tree, where
//! [`finalize`](BlockManager::finalize), driven by the consensus engine, irrevocably commits one
//! child of the current tip and prunes its siblings.
//!
//! ## Concurrency
//!
//! Manager methods may be called from any thread; each acquires the manager lock for its duration.
//! Completion callbacks are delivered from the manager's dispatcher thread without the lock held,
//! so they may call back into the manager freely. See [syncer](crate::manager::syncer).

pub(crate) mod syncer;

pub(crate) mod task;

pub(crate) mod tree;

use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::SystemTime;

use borsh::BorshDeserialize;

use crate::chain::Chain;
use crate::config::BlockManagerConfig;
use crate::engine::{
    BlockContext, ExecutionEngine, FinalizeScope, Observer, TaskId,
};
use crate::errors::BlockManagerError;
use crate::event_bus::{start_event_bus, EventHandlers, HandlerPtr};
use crate::events::{Event, FinalizeBlockEvent, InsertBlockEvent, PruneBlockEvent};
use crate::state::block_store::BlockStore;
use crate::state::cache::BlockCache;
use crate::state::kv_store::StoreError;
use crate::transition::Transition;
use crate::types::basic::{BlockHeight, CryptoHash, TransactionGroup, Timestamp};
use crate::types::block::{Block, BlockBodyFormat, BlockHeaderFormat};
use crate::types::transaction::{Transaction, TransactionList};
use crate::types::validator_set::ValidatorSet;
use crate::types::voting::CommitVoteSet;

use self::syncer::{start_dispatcher, Syncer, SyncerMessage};
use self::task::{CompletionCallback, ImportTask, ProposeTask, Task};
use self::tree::{BlockTree, TreeNode};

/// The manager state guarded by the syncer discipline: the candidate tree, the table of in-flight
/// tasks, the block cache, and the finalization subscribers.
pub(crate) struct ManagerCore {
    pub(crate) tree: BlockTree,
    pub(crate) cache: BlockCache,
    pub(crate) tasks: HashMap<TaskId, Task>,
    pub(crate) finalization_cbs: Vec<Box<dyn FnMut(&Arc<Block>) -> bool + Send>>,
    next_task_id: u64,
    running: bool,
}

impl ManagerCore {
    fn new(cache_capacity: usize) -> ManagerCore {
        ManagerCore {
            tree: BlockTree::new(),
            cache: BlockCache::new(cache_capacity),
            tasks: HashMap::new(),
            finalization_cbs: Vec::new(),
            next_task_id: 0,
            running: true,
        }
    }

    fn alloc_task_id(&mut self) -> TaskId {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        id
    }
}

struct Shared<C: Chain> {
    chain: C,
    engine: Arc<dyn ExecutionEngine>,
    store: BlockStore<C::Store>,
    core: Arc<Mutex<ManagerCore>>,
    syncer: Syncer,
    event_publisher: Option<Sender<Event>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    event_bus: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

pub struct BlockManager<C: Chain> {
    shared: Arc<Shared<C>>,
}

impl<C: Chain> BlockManager<C> {
    /// Create the block manager for `chain`. On a fresh database this bootstraps the genesis
    /// chain: the chain's genesis transaction is executed through an initial transition with empty
    /// prior state, and the resulting height-0 block is finalized before this returns. Otherwise
    /// the persisted chain head is recovered and becomes the root of the candidate tree.
    pub fn new(
        chain: C,
        config: BlockManagerConfig,
        insert_block_handler: Option<HandlerPtr<InsertBlockEvent>>,
        finalize_block_handler: Option<HandlerPtr<FinalizeBlockEvent>>,
        prune_block_handler: Option<HandlerPtr<PruneBlockEvent>>,
    ) -> Result<BlockManager<C>, BlockManagerError> {
        let engine = chain.engine();
        let store = BlockStore::new(chain.database());
        let core = Arc::new(Mutex::new(ManagerCore::new(config.cache_capacity)));

        let handlers = EventHandlers::new(
            config.log_events,
            insert_block_handler,
            finalize_block_handler,
            prune_block_handler,
        );
        let (event_publisher, event_bus) = if handlers.is_empty() {
            (None, None)
        } else {
            let (event_tx, event_rx) = mpsc::channel();
            let (shutdown_tx, shutdown_rx) = mpsc::channel();
            let handle = start_event_bus(handlers, event_rx, shutdown_rx);
            (Some(event_tx), Some((shutdown_tx, handle)))
        };

        let (message_tx, message_rx) = mpsc::channel::<SyncerMessage>();
        let syncer = Syncer::new(message_tx);
        let dispatcher = start_dispatcher(
            Arc::downgrade(&core),
            syncer.clone(),
            message_rx,
            event_publisher.clone(),
        );

        let manager = BlockManager {
            shared: Arc::new(Shared {
                chain,
                engine,
                store,
                core,
                syncer,
                event_publisher,
                dispatcher: Mutex::new(Some(dispatcher)),
                event_bus: Mutex::new(event_bus),
            }),
        };

        match manager.shared.store.last_height() {
            Err(StoreError::NotFound) => manager.shared.finalize_genesis()?,
            Ok(height) => manager.shared.reload(height)?,
            Err(err) => return Err(err.into()),
        }
        Ok(manager)
    }

    /// Decode and import a serialized block. `cb` fires exactly once: with the materialized block
    /// once it has been fully validated and attached to the candidate tree, or with the error that
    /// stopped it.
    pub fn import(
        &self,
        mut reader: impl Read,
        cb: impl FnOnce(Result<Arc<Block>, BlockManagerError>) + Send + 'static,
    ) -> Result<Canceller, BlockManagerError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| BlockManagerError::InvalidBlock {
                reason: format!("unreadable block stream: {}", err),
            })?;
        let mut core = self.shared.core.lock().unwrap();
        self.shared.ensure_running(&core)?;
        let block = Arc::new(self.shared.read_block(&bytes)?);
        log::debug!("Import, {}", block.id());
        self.shared.start_import(&mut core, block, Box::new(cb))
    }

    /// Import an already-decoded block. Shares the whole validation and execution path with
    /// [`import`](Self::import).
    pub fn import_block(
        &self,
        block: Arc<Block>,
        cb: impl FnOnce(Result<Arc<Block>, BlockManagerError>) + Send + 'static,
    ) -> Result<Canceller, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        self.shared.ensure_running(&core)?;
        log::debug!("ImportBlock, {}", block.id());
        self.shared.start_import(&mut core, block, Box::new(cb))
    }

    /// Build a new block on top of the parent identified by `parent_id`, certifying the parent
    /// with `votes`. The engine selects the transactions; the block's timestamp is the vote set's
    /// commit time and its proposer is this node's wallet address.
    pub fn propose(
        &self,
        parent_id: &CryptoHash,
        votes: CommitVoteSet,
        cb: impl FnOnce(Result<Arc<Block>, BlockManagerError>) + Send + 'static,
    ) -> Result<Canceller, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        self.shared.ensure_running(&core)?;
        log::debug!("Propose, {}", parent_id);
        self.shared
            .start_propose(&mut core, parent_id, votes, Box::new(cb))
    }

    /// Irrevocably commit `block`, which must be a child of the currently finalized block. Sibling
    /// subtrees are pruned and their executor resources released; the block's records are
    /// persisted, and [`wait_for_block`](Self::wait_for_block) subscribers for its height are
    /// signalled.
    pub fn finalize(&self, block: &Block) -> Result<(), BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        self.shared.ensure_running(&core)?;
        let id = block.id();
        match core.tree.get(&id) {
            Some(node) if node.parent.is_some() && node.parent == core.tree.finalized_id() => {}
            _ => return Err(BlockManagerError::InvalidStatusForBlock { block: id }),
        }
        self.shared.finalize_node(&mut core, id)
    }

    /// Get a finalized (or still-candidate root) block by id, cache-first.
    pub fn get_block(&self, id: &CryptoHash) -> Result<Arc<Block>, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        self.shared.get_block_in_lock(&mut core, id)
    }

    /// Get a finalized block by height, cache-first.
    pub fn get_block_by_height(
        &self,
        height: BlockHeight,
    ) -> Result<Arc<Block>, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        self.shared.get_block_by_height_in_lock(&mut core, height)
    }

    /// The last finalized block.
    pub fn get_last_block(&self) -> Result<Arc<Block>, BlockManagerError> {
        let core = self.shared.core.lock().unwrap();
        core.tree
            .finalized()
            .map(|node| Arc::clone(&node.block))
            .ok_or(BlockManagerError::InvalidState {
                detail: "no finalized block".to_string(),
            })
    }

    /// Locate a finalized transaction by id.
    pub fn get_transaction_info(
        &self,
        id: &CryptoHash,
    ) -> Result<TransactionInfo, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        let locator = self
            .shared
            .store
            .locator(id)
            .map_err(|_| BlockManagerError::NotFound)?;
        let block = self
            .shared
            .get_block_by_height_in_lock(&mut core, locator.block_height)
            .map_err(|err| BlockManagerError::InvalidState {
                detail: format!("block h={} not found: {}", locator.block_height, err),
            })?;
        let list = match locator.group {
            TransactionGroup::Patch => block.patch_transactions(),
            TransactionGroup::Normal => block.normal_transactions(),
        };
        let transaction = list
            .get(locator.index_in_group as usize)
            .cloned()
            .ok_or_else(|| BlockManagerError::InvalidState {
                detail: format!(
                    "transaction i={} not in block h={}",
                    locator.index_in_group, locator.block_height
                ),
            })?;
        let finalized_height = core
            .tree
            .finalized()
            .map(|node| node.block.height())
            .ok_or(BlockManagerError::InvalidState {
                detail: "no finalized block".to_string(),
            })?;
        let result_block = if finalized_height < locator.block_height + 1 {
            None
        } else {
            Some(
                self.shared
                    .get_block_by_height_in_lock(&mut core, locator.block_height + 1)?,
            )
        };
        Ok(TransactionInfo {
            block,
            index: locator.index_in_group,
            group: locator.group,
            transaction,
            result_block,
        })
    }

    /// A channel that yields the block at `height` exactly once, as soon as it is finalized. If the
    /// height is already finalized the channel is signalled before this returns.
    pub fn wait_for_block(
        &self,
        height: BlockHeight,
    ) -> Result<Receiver<Arc<Block>>, BlockManagerError> {
        let mut core = self.shared.core.lock().unwrap();
        let (tx, rx) = mpsc::channel();
        match self.shared.get_block_by_height_in_lock(&mut core, height) {
            Ok(block) => {
                let _ = tx.send(block);
                return Ok(rx);
            }
            Err(BlockManagerError::NotFound) => {}
            Err(err) => return Err(err),
        }
        core.finalization_cbs.push(Box::new(move |block| {
            if block.height() == height {
                let _ = tx.send(Arc::clone(block));
                true
            } else {
                false
            }
        }));
        Ok(rx)
    }

    /// Decode a block from its wire encoding, performing all header/body consistency checks,
    /// without importing it.
    pub fn block_from_reader(&self, mut reader: impl Read) -> Result<Block, BlockManagerError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| BlockManagerError::InvalidBlock {
                reason: format!("unreadable block stream: {}", err),
            })?;
        let _core = self.shared.core.lock().unwrap();
        self.shared.read_block(&bytes)
    }

    /// Tear the manager down: dispose the whole candidate tree and every in-flight task, and stop
    /// the dispatcher and event bus. Dropping the manager does the same.
    pub fn terminate(&self) {
        {
            let mut core = self.shared.core.lock().unwrap();
            if !core.running {
                return;
            }
            core.running = false;
            core.tree.clear();
            core.tasks.clear();
            core.finalization_cbs.clear();
        }
        self.shared.syncer.shutdown();
        if let Some(handle) = self.shared.dispatcher.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some((shutdown, handle)) = self.shared.event_bus.lock().unwrap().take() {
            let _ = shutdown.send(());
            let _ = handle.join();
        }
    }
}

impl<C: Chain> Drop for BlockManager<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl<C: Chain> Shared<C> {
    fn ensure_running(&self, core: &ManagerCore) -> Result<(), BlockManagerError> {
        if core.running {
            Ok(())
        } else {
            Err(BlockManagerError::InvalidState {
                detail: "block manager is terminated".to_string(),
            })
        }
    }

    /* ↓↓↓ Bootstrap and reload ↓↓↓ */

    fn finalize_genesis(&self) -> Result<(), BlockManagerError> {
        log::debug!("FinalizeGenesisBlock");
        if self.core.lock().unwrap().tree.finalized_id().is_some() {
            return Err(BlockManagerError::InvalidState {
                detail: "chain is already bootstrapped".to_string(),
            });
        }
        let initial_id = self.engine.create_initial_transition(None, None)?;
        let initial = Transition::new(Arc::clone(&self.engine), initial_id);
        let genesis_tx = self
            .engine
            .genesis_transaction_from_bytes(self.chain.genesis())?;
        let genesis_txs = self.engine.transaction_list_from_slice(vec![genesis_tx]);

        let (result_tx, result_rx) = mpsc::channel();
        let genesis_transit = {
            let _core = self.core.lock().unwrap();
            initial.transit(
                &genesis_txs,
                BlockContext::new(BlockHeight::genesis(), Timestamp::zero()),
                Some(Observer::channel(result_tx)),
            )?
        };
        // Wait for the genesis transition's validation and then its execution; either failing is
        // fatal during bootstrap.
        for _ in 0..2 {
            result_rx
                .recv()
                .map_err(|_| BlockManagerError::InvalidState {
                    detail: "engine dropped the genesis observer".to_string(),
                })??;
        }

        let initial_effects = initial.effects()?;
        let genesis_effects = genesis_transit.effects()?;
        let votes =
            self.chain
                .decode_vote_set(&[])
                .map_err(|err| BlockManagerError::InvalidState {
                    detail: format!("cannot decode the zero vote set: {}", err),
                })?;
        let block = Arc::new(Block::new(
            BlockHeight::genesis(),
            Timestamp::zero(),
            None,
            None,
            initial_effects.logs_bloom,
            initial_effects.result,
            genesis_effects.patch_transactions,
            genesis_effects.normal_transactions,
            genesis_effects.next_validators,
            votes,
        ));

        let preexe_id = genesis_transit.id();
        let node = TreeNode::new(Arc::clone(&block), initial, genesis_transit);
        {
            let mut core = self.core.lock().unwrap();
            core.tree.insert_root(node);
            self.finalize_node(&mut core, block.id())?;
        }
        self.engine.finalize(preexe_id, FinalizeScope::ALL)?;
        Ok(())
    }

    fn reload(&self, height: BlockHeight) -> Result<(), BlockManagerError> {
        let last = {
            let mut core = self.core.lock().unwrap();
            self.get_block_by_height_in_lock(&mut core, height)?
        };
        let initial_id = self
            .engine
            .create_initial_transition(
                Some(last.result().to_vec()),
                Some(last.next_validators().clone()),
            )
            .map_err(|err| BlockManagerError::InvalidState {
                detail: format!("cannot reinitialize the executor: {:?}", err),
            })?;
        let initial = Transition::new(Arc::clone(&self.engine), initial_id);
        let preexe = initial.transit(
            last.normal_transactions(),
            BlockContext::from(&*last),
            None,
        )?;
        let id = last.id();
        let node = TreeNode::new(last, initial, preexe);
        let mut core = self.core.lock().unwrap();
        core.tree.insert_root(node);
        core.tree.set_finalized(id);
        Ok(())
    }

    /* ↓↓↓ Import and propose ↓↓↓ */

    /// The validator set that authorizes commit votes on a child of `parent`: `None` when `parent`
    /// is the genesis block, otherwise the `next_validators` of `parent`'s own parent.
    fn authorizing_validators(
        &self,
        core: &mut ManagerCore,
        parent: &Block,
    ) -> Result<Option<ValidatorSet>, BlockManagerError> {
        if parent.height() == BlockHeight::genesis() {
            return Ok(None);
        }
        let pprev_id = *parent
            .prev_id()
            .ok_or_else(|| BlockManagerError::InvalidState {
                detail: "non-genesis block has no prev id".to_string(),
            })?;
        let pprev = self
            .get_block_in_lock(core, &pprev_id)
            .map_err(|err| BlockManagerError::InvalidState {
                detail: format!("cannot get prev block {}: {}", pprev_id, err),
            })?;
        Ok(Some(pprev.next_validators().clone()))
    }

    fn start_import(
        &self,
        core: &mut ManagerCore,
        block: Arc<Block>,
        cb: CompletionCallback,
    ) -> Result<Canceller, BlockManagerError> {
        let prev_id = block.prev_id().copied().unwrap_or(CryptoHash::zero());
        let parent_block = match core.tree.get(&prev_id) {
            Some(node) => Arc::clone(&node.block),
            None => return Err(BlockManagerError::InvalidPreviousId { prev_id }),
        };
        let validators = self.authorizing_validators(core, &parent_block)?;
        block.verify(&parent_block, validators.as_ref())?;

        let task_id = core.alloc_task_id();
        let in_transition = core
            .tree
            .get(&prev_id)
            .unwrap()
            .preexe
            .patch(
                block.patch_transactions(),
                Some(self.syncer.observer(task_id)),
            )?;
        core.tasks
            .insert(task_id, Task::Import(ImportTask::new(block, in_transition, cb)));
        Ok(Canceller {
            core: Arc::downgrade(&self.core),
            task: task_id,
        })
    }

    fn start_propose(
        &self,
        core: &mut ManagerCore,
        parent_id: &CryptoHash,
        votes: CommitVoteSet,
        cb: CompletionCallback,
    ) -> Result<Canceller, BlockManagerError> {
        let parent_block = match core.tree.get(parent_id) {
            Some(node) => Arc::clone(&node.block),
            None => {
                return Err(BlockManagerError::InvalidPreviousId {
                    prev_id: *parent_id,
                })
            }
        };
        let validators = self.authorizing_validators(core, &parent_block)?;
        votes.verify(&parent_block, validators.as_ref())?;

        let task_id = core.alloc_task_id();
        let parent_node = core.tree.get(parent_id).unwrap();
        let patches = self.engine.get_patches(parent_node.in_transition.id());
        let in_transition = parent_node
            .preexe
            .patch(&patches, Some(self.syncer.observer(task_id)))?;
        core.tasks.insert(
            task_id,
            Task::Propose(ProposeTask::new(
                parent_block,
                votes,
                self.chain.wallet().address(),
                in_transition,
                cb,
            )),
        );
        Ok(Canceller {
            core: Arc::downgrade(&self.core),
            task: task_id,
        })
    }

    /* ↓↓↓ Finalization ↓↓↓ */

    fn finalize_node(
        &self,
        core: &mut ManagerCore,
        id: CryptoHash,
    ) -> Result<(), BlockManagerError> {
        if let Some(prev_id) = core.tree.finalized_id() {
            let mut pruned = Vec::new();
            core.tree.remove_except(&prev_id, &id, &mut pruned);
            for pruned_id in pruned.into_iter().filter(|p| *p != prev_id) {
                Event::PruneBlock(PruneBlockEvent {
                    timestamp: SystemTime::now(),
                    block: pruned_id,
                })
                .publish(&self.event_publisher);
            }
            let node = core
                .tree
                .get(&id)
                .ok_or(BlockManagerError::InvalidStatusForBlock { block: id })?;
            self.engine.finalize(
                node.in_transition.id(),
                FinalizeScope::PATCH_TRANSACTIONS | FinalizeScope::RESULT,
            )?;
        }
        let node = core
            .tree
            .get(&id)
            .ok_or(BlockManagerError::InvalidStatusForBlock { block: id })?;
        self.engine
            .finalize(node.preexe.id(), FinalizeScope::NORMAL_TRANSACTIONS)?;
        let block = Arc::clone(&node.block);

        core.tree.set_finalized(id);
        self.store.store_finalized(&block)?;

        Event::FinalizeBlock(FinalizeBlockEvent {
            timestamp: SystemTime::now(),
            block: id,
            height: block.height(),
        })
        .publish(&self.event_publisher);

        let mut i = 0;
        while i < core.finalization_cbs.len() {
            if (core.finalization_cbs[i])(&block) {
                core.finalization_cbs.swap_remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /* ↓↓↓ Block reads ↓↓↓ */

    fn get_block_in_lock(
        &self,
        core: &mut ManagerCore,
        id: &CryptoHash,
    ) -> Result<Arc<Block>, BlockManagerError> {
        if let Some(block) = core.cache.get(id) {
            return Ok(block);
        }
        let header_bytes = self.store.bytes_by_hash(id)?;
        let header = BlockHeaderFormat::try_from_slice(&header_bytes).map_err(|err| {
            BlockManagerError::InvalidState {
                detail: format!("undecodable stored header {}: {}", id, err),
            }
        })?;
        let block = Arc::new(self.block_from_header(header)?);
        core.cache.put(Arc::clone(&block));
        Ok(block)
    }

    fn get_block_by_height_in_lock(
        &self,
        core: &mut ManagerCore,
        height: BlockHeight,
    ) -> Result<Arc<Block>, BlockManagerError> {
        if let Some(block) = core.cache.get_by_height(height) {
            return Ok(block);
        }
        let id = self.store.id_by_height(height)?;
        match self.get_block_in_lock(core, &id) {
            Err(BlockManagerError::NotFound) => Err(BlockManagerError::InvalidState {
                detail: format!("block h={} by hash {} not found", height, id),
            }),
            other => other,
        }
    }

    /// Materialize a block from a stored header: transaction lists and the validator set are
    /// recovered from the engine by their committed hashes, and the vote set from the
    /// hash-addressed bucket. Any dangling reference is corruption.
    fn block_from_header(
        &self,
        header: BlockHeaderFormat,
    ) -> Result<Block, BlockManagerError> {
        let patches = self
            .engine
            .transaction_list_from_hash(&header.patch_transactions_hash)
            .ok_or_else(|| BlockManagerError::InvalidState {
                detail: format!(
                    "unknown patch transaction list {}",
                    header.patch_transactions_hash
                ),
            })?;
        let normal = self
            .engine
            .transaction_list_from_hash(&header.normal_transactions_hash)
            .ok_or_else(|| BlockManagerError::InvalidState {
                detail: format!(
                    "unknown normal transaction list {}",
                    header.normal_transactions_hash
                ),
            })?;
        let next_validators = self
            .engine
            .validator_set_from_hash(&header.next_validators_hash)
            .ok_or_else(|| BlockManagerError::InvalidState {
                detail: format!("unknown validator set {}", header.next_validators_hash),
            })?;
        let votes_bytes = self.store.bytes_by_hash(&header.votes_hash).map_err(|_| {
            BlockManagerError::InvalidState {
                detail: format!("missing vote set {}", header.votes_hash),
            }
        })?;
        let votes = self.chain.decode_vote_set(&votes_bytes).map_err(|err| {
            BlockManagerError::InvalidState {
                detail: format!("undecodable vote set {}: {}", header.votes_hash, err),
            }
        })?;
        Ok(Block::new(
            header.height,
            header.timestamp,
            header.proposer,
            header.prev_id,
            header.logs_bloom,
            header.result,
            patches,
            normal,
            next_validators,
            votes,
        ))
    }

    /// Decode a block from its wire encoding: header, then body, then every header/body
    /// consistency check.
    fn read_block(&self, bytes: &[u8]) -> Result<Block, BlockManagerError> {
        let mut cursor: &[u8] = bytes;
        let header = BlockHeaderFormat::deserialize(&mut cursor).map_err(|err| {
            BlockManagerError::InvalidBlock {
                reason: format!("undecodable header: {}", err),
            }
        })?;
        let body = BlockBodyFormat::deserialize(&mut cursor).map_err(|err| {
            BlockManagerError::InvalidBlock {
                reason: format!("undecodable body: {}", err),
            }
        })?;

        let patches = self.transaction_list_from_bytes(&body.patch_transactions)?;
        if patches.hash() != header.patch_transactions_hash {
            return Err(BlockManagerError::InvalidBlock {
                reason: "bad patch transactions hash".to_string(),
            });
        }
        let normal = self.transaction_list_from_bytes(&body.normal_transactions)?;
        if normal.hash() != header.normal_transactions_hash {
            return Err(BlockManagerError::InvalidBlock {
                reason: "bad normal transactions hash".to_string(),
            });
        }
        let next_validators = self
            .engine
            .validator_set_from_hash(&header.next_validators_hash)
            .ok_or_else(|| BlockManagerError::InvalidBlock {
                reason: "bad validator list hash".to_string(),
            })?;
        let votes = self.chain.decode_vote_set(&body.votes).map_err(|err| {
            BlockManagerError::InvalidBlock {
                reason: format!("undecodable vote set: {}", err),
            }
        })?;
        if votes.hash() != header.votes_hash {
            return Err(BlockManagerError::InvalidBlock {
                reason: "bad vote list hash".to_string(),
            });
        }
        Ok(Block::new(
            header.height,
            header.timestamp,
            header.proposer,
            header.prev_id,
            header.logs_bloom,
            header.result,
            patches,
            normal,
            next_validators,
            votes,
        ))
    }

    fn transaction_list_from_bytes(
        &self,
        raw: &[Vec<u8>],
    ) -> Result<TransactionList, BlockManagerError> {
        let mut transactions = Vec::with_capacity(raw.len());
        for bytes in raw {
            transactions.push(self.engine.transaction_from_bytes(bytes).map_err(|err| {
                BlockManagerError::InvalidBlock {
                    reason: format!("undecodable transaction: {:?}", err),
                }
            })?);
        }
        Ok(self.engine.transaction_list_from_slice(transactions))
    }
}

/// Cancellation token returned by [`BlockManager::import`], [`BlockManager::import_block`] and
/// [`BlockManager::propose`].
pub struct Canceller {
    core: Weak<Mutex<ManagerCore>>,
    task: TaskId,
}

impl Canceller {
    /// Cancel the task, disposing its in-flight transitions. Returns `true` if cancellation
    /// succeeded; once the task has completed (its callback fired) or was already cancelled, this
    /// returns `false`. Late engine callbacks on a cancelled task are discarded.
    pub fn cancel(&self) -> bool {
        match self.core.upgrade() {
            Some(core) => {
                let mut core = core.lock().unwrap();
                task::cancel_task(&mut core, self.task)
            }
            None => false,
        }
    }
}

/// Everything known about one finalized transaction: its containing block and position, and, once
/// the next block is finalized, the block whose `result` carries its receipt.
pub struct TransactionInfo {
    block: Arc<Block>,
    index: u32,
    group: TransactionGroup,
    transaction: Transaction,
    result_block: Option<Arc<Block>>,
}

impl TransactionInfo {
    /// The block the transaction executed in.
    pub fn block(&self) -> &Arc<Block> {
        &self.block
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn group(&self) -> TransactionGroup {
        self.group
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// The block whose `result` holds this transaction's receipt, or `ResultNotFinalized` while
    /// the block one height above the transaction is not finalized yet.
    pub fn result_block(&self) -> Result<&Arc<Block>, BlockManagerError> {
        self.result_block
            .as_ref()
            .ok_or(BlockManagerError::ResultNotFinalized)
    }
}
