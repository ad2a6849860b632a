//! A deterministic [`ExecutionEngine`] for tests.
//!
//! The engine executes [`CounterTransaction`]s over a single `u32` counter; a transition's result
//! bytes are the Borsh encoding of the counter after applying its transaction lists. Executing any
//! transition on top of a pre-validator-set state (the fresh chain) establishes the engine's
//! configured validator set, which stands in for a genesis transaction that appoints validators.
//!
//! Completion events are posted synchronously by default. Tests exercising cancellation races can
//! [hold](CounterEngine::hold_events) events back and [release](CounterEngine::release_events)
//! them later.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use borsh::{BorshDeserialize, BorshSerialize};

use blockmgr::engine::{
    BlockContext, EngineError, ExecutionEngine, FinalizeScope, Observer, TransitionEffects,
    TransitionId, TransitionPhase,
};
use blockmgr::types::basic::{CryptoHash, LogsBloom};
use blockmgr::types::block::Block;
use blockmgr::types::transaction::{Transaction, TransactionList};
use blockmgr::types::validator_set::ValidatorSet;

#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub(crate) enum CounterTransaction {
    Increment(u32),
}

impl CounterTransaction {
    pub(crate) fn to_transaction(&self) -> Transaction {
        let bytes = self.try_to_vec().unwrap();
        let id = CryptoHash::of(&bytes);
        Transaction::new(bytes, id)
    }
}

struct TransitionRecord {
    counter: u32,
    patch: TransactionList,
    normal: TransactionList,
    next_validators: ValidatorSet,
}

struct Inner {
    next_id: u64,
    transitions: HashMap<u64, TransitionRecord>,
    lists: HashMap<CryptoHash, TransactionList>,
    validator_sets: HashMap<CryptoHash, ValidatorSet>,
    disposed: HashSet<u64>,
    finalized: Vec<(TransitionId, FinalizeScope)>,
    mempool: Vec<Transaction>,
    hold_events: bool,
    held: Vec<(Observer, TransitionPhase)>,
}

pub(crate) struct CounterEngine {
    genesis_validators: ValidatorSet,
    inner: Mutex<Inner>,
}

impl CounterEngine {
    pub(crate) fn new(genesis_validators: ValidatorSet) -> CounterEngine {
        let engine = CounterEngine {
            genesis_validators: genesis_validators.clone(),
            inner: Mutex::new(Inner {
                next_id: 0,
                transitions: HashMap::new(),
                lists: HashMap::new(),
                validator_sets: HashMap::new(),
                disposed: HashSet::new(),
                finalized: Vec::new(),
                mempool: Vec::new(),
                hold_events: false,
                held: Vec::new(),
            }),
        };
        {
            let mut inner = engine.inner.lock().unwrap();
            inner
                .validator_sets
                .insert(genesis_validators.hash(), genesis_validators);
            let empty = ValidatorSet::new();
            inner.validator_sets.insert(empty.hash(), empty);
        }
        engine
    }

    /* ↓↓↓ Test controls and assertions ↓↓↓ */

    /// Queue a transaction for inclusion in the next `propose` transition.
    pub(crate) fn queue_transaction(&self, tx: CounterTransaction) {
        let mut inner = self.inner.lock().unwrap();
        inner.mempool.push(tx.to_transaction());
    }

    /// Stop posting completion events; they accumulate until released.
    pub(crate) fn hold_events(&self) {
        self.inner.lock().unwrap().hold_events = true;
    }

    /// Post every held completion event and resume synchronous posting.
    pub(crate) fn release_events(&self) {
        let held = {
            let mut inner = self.inner.lock().unwrap();
            inner.hold_events = false;
            std::mem::take(&mut inner.held)
        };
        for (observer, phase) in held {
            match phase {
                TransitionPhase::Validate => observer.validated(Ok(())),
                TransitionPhase::Execute => observer.executed(Ok(())),
            }
        }
    }

    /// The number of transitions created and not yet disposed.
    pub(crate) fn live_transitions(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.next_id as usize - inner.disposed.len()
    }

    pub(crate) fn finalize_calls(&self) -> Vec<(TransitionId, FinalizeScope)> {
        self.inner.lock().unwrap().finalized.clone()
    }

    pub(crate) fn validators(&self) -> ValidatorSet {
        self.genesis_validators.clone()
    }

    /// Assemble (and register) a list from counter transactions, for building test blocks.
    pub(crate) fn make_list(&self, txs: &[CounterTransaction]) -> TransactionList {
        self.transaction_list_from_slice(txs.iter().map(|tx| tx.to_transaction()).collect())
    }

    /// The result bytes a child of `parent` must commit to: the parent's result advanced by the
    /// parent's normal transactions (and the child's patch transactions, which tests leave empty).
    pub(crate) fn expected_child_result(&self, parent: &Block) -> Vec<u8> {
        let parent_counter = decode_counter(parent.result());
        let counter = parent_counter + increments(parent.normal_transactions()).unwrap();
        counter.try_to_vec().unwrap()
    }

    /* ↓↓↓ Internals ↓↓↓ */

    fn register(&self, inner: &mut Inner, record: TransitionRecord) -> TransitionId {
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .lists
            .insert(record.patch.hash(), record.patch.clone());
        inner
            .lists
            .insert(record.normal.hash(), record.normal.clone());
        inner
            .validator_sets
            .insert(record.next_validators.hash(), record.next_validators.clone());
        inner.transitions.insert(id, record);
        TransitionId(id)
    }

    fn record<'a>(
        &self,
        inner: &'a Inner,
        id: TransitionId,
    ) -> Result<&'a TransitionRecord, EngineError> {
        if inner.disposed.contains(&id.0) {
            return Err(EngineError::UnknownTransition);
        }
        inner
            .transitions
            .get(&id.0)
            .ok_or(EngineError::UnknownTransition)
    }

    fn inherit_validators(&self, base: &TransitionRecord) -> ValidatorSet {
        if base.next_validators.is_empty() {
            self.genesis_validators.clone()
        } else {
            base.next_validators.clone()
        }
    }

    /// Post the completion events of a freshly started transition: validation first, then
    /// execution.
    fn post(&self, observer: Option<Observer>, validation: Result<(), EngineError>) {
        let Some(observer) = observer else { return };
        let failed = validation.is_err();
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.hold_events {
                inner.held.push((observer.clone(), TransitionPhase::Validate));
                if !failed {
                    inner.held.push((observer, TransitionPhase::Execute));
                }
                return;
            }
        }
        observer.validated(validation);
        if !failed {
            observer.executed(Ok(()));
        }
    }
}

fn decode_counter(result: &[u8]) -> u32 {
    if result.is_empty() {
        0
    } else {
        u32::try_from_slice(result).unwrap()
    }
}

fn increments(list: &TransactionList) -> Result<u32, EngineError> {
    let mut total = 0;
    for tx in list.iter() {
        match CounterTransaction::try_from_slice(tx.bytes()) {
            Ok(CounterTransaction::Increment(_)) => total += 1,
            Err(err) => {
                return Err(EngineError::InvalidTransaction {
                    reason: err.to_string(),
                })
            }
        }
    }
    Ok(total)
}

fn list_hash(transactions: &[Transaction]) -> CryptoHash {
    let mut concatenated = Vec::new();
    for tx in transactions {
        concatenated.extend_from_slice(&tx.id().bytes());
    }
    CryptoHash::of(&concatenated)
}

impl ExecutionEngine for CounterEngine {
    fn create_initial_transition(
        &self,
        result: Option<Vec<u8>>,
        next_validators: Option<ValidatorSet>,
    ) -> Result<TransitionId, EngineError> {
        let empty = self.transaction_list_from_slice(Vec::new());
        let mut inner = self.inner.lock().unwrap();
        let record = TransitionRecord {
            counter: decode_counter(&result.unwrap_or_default()),
            patch: empty.clone(),
            normal: empty,
            next_validators: next_validators.unwrap_or_default(),
        };
        Ok(self.register(&mut inner, record))
    }

    fn patch(
        &self,
        base: TransitionId,
        patches: &TransactionList,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError> {
        let (id, validation) = {
            let mut inner = self.inner.lock().unwrap();
            let base = self.record(&inner, base)?;
            let validation = increments(patches);
            let record = TransitionRecord {
                counter: base.counter + *validation.as_ref().unwrap_or(&0),
                patch: patches.clone(),
                normal: base.normal.clone(),
                next_validators: self.inherit_validators(base),
            };
            (self.register(&mut inner, record), validation.map(|_| ()))
        };
        self.post(observer, validation);
        Ok(id)
    }

    fn transit(
        &self,
        base: TransitionId,
        transactions: &TransactionList,
        _context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError> {
        let (id, validation) = {
            let mut inner = self.inner.lock().unwrap();
            let base = self.record(&inner, base)?;
            let validation = increments(transactions);
            let record = TransitionRecord {
                counter: base.counter + *validation.as_ref().unwrap_or(&0),
                patch: base.patch.clone(),
                normal: transactions.clone(),
                next_validators: self.inherit_validators(base),
            };
            (self.register(&mut inner, record), validation.map(|_| ()))
        };
        self.post(observer, validation);
        Ok(id)
    }

    fn propose(
        &self,
        base: TransitionId,
        _context: BlockContext,
        observer: Option<Observer>,
    ) -> Result<TransitionId, EngineError> {
        let pending = {
            let mut inner = self.inner.lock().unwrap();
            std::mem::take(&mut inner.mempool)
        };
        let transactions = self.transaction_list_from_slice(pending);
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let base = self.record(&inner, base)?;
            let record = TransitionRecord {
                counter: base.counter + increments(&transactions)?,
                patch: base.patch.clone(),
                normal: transactions,
                next_validators: self.inherit_validators(base),
            };
            self.register(&mut inner, record)
        };
        self.post(observer, Ok(()));
        Ok(id)
    }

    fn effects(&self, transition: TransitionId) -> Result<TransitionEffects, EngineError> {
        let inner = self.inner.lock().unwrap();
        let record = self.record(&inner, transition)?;
        Ok(TransitionEffects {
            patch_transactions: record.patch.clone(),
            normal_transactions: record.normal.clone(),
            logs_bloom: LogsBloom::empty(),
            result: record.counter.try_to_vec().unwrap(),
            next_validators: record.next_validators.clone(),
        })
    }

    fn finalize(&self, transition: TransitionId, scope: FinalizeScope) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.finalized.push((transition, scope));
        Ok(())
    }

    fn get_patches(&self, _parent_in: TransitionId) -> TransactionList {
        self.transaction_list_from_slice(Vec::new())
    }

    fn dispose(&self, transition: TransitionId) {
        let mut inner = self.inner.lock().unwrap();
        inner.disposed.insert(transition.0);
    }

    fn transaction_from_bytes(&self, bytes: &[u8]) -> Result<Transaction, EngineError> {
        CounterTransaction::try_from_slice(bytes).map_err(|err| EngineError::InvalidTransaction {
            reason: err.to_string(),
        })?;
        Ok(Transaction::new(bytes.to_vec(), CryptoHash::of(bytes)))
    }

    fn genesis_transaction_from_bytes(&self, bytes: &[u8]) -> Result<Transaction, EngineError> {
        self.transaction_from_bytes(bytes)
    }

    fn transaction_list_from_slice(&self, transactions: Vec<Transaction>) -> TransactionList {
        let list = TransactionList::new(transactions.clone(), list_hash(&transactions));
        self.inner
            .lock()
            .unwrap()
            .lists
            .insert(list.hash(), list.clone());
        list
    }

    fn transaction_list_from_hash(&self, hash: &CryptoHash) -> Option<TransactionList> {
        self.inner.lock().unwrap().lists.get(hash).cloned()
    }

    fn validator_set_from_hash(&self, hash: &CryptoHash) -> Option<ValidatorSet> {
        self.inner.lock().unwrap().validator_sets.get(hash).cloned()
    }
}
