//! A minimal [`Chain`] container wiring the in-memory database, a deterministic wallet, and the
//! counter engine together.

use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use blockmgr::chain::Chain;
use blockmgr::engine::ExecutionEngine;
use blockmgr::types::keypair::Wallet;
use blockmgr::types::voting::CommitVoteSet;

use super::counter_engine::{CounterEngine, CounterTransaction};
use super::mem_db::MemDB;

pub(crate) struct TestChain {
    db: MemDB,
    wallet: Wallet,
    genesis: Vec<u8>,
    engine: Arc<CounterEngine>,
}

impl TestChain {
    pub(crate) fn new(db: MemDB, wallet: Wallet, engine: Arc<CounterEngine>) -> TestChain {
        TestChain {
            db,
            wallet,
            // The genesis transaction is an ordinary counter transaction; executing it establishes
            // the engine's validator set.
            genesis: CounterTransaction::Increment(0).try_to_vec().unwrap(),
            engine,
        }
    }
}

impl Chain for TestChain {
    type Store = MemDB;

    fn database(&self) -> MemDB {
        self.db.clone()
    }

    fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    fn genesis(&self) -> &[u8] {
        &self.genesis
    }

    fn engine(&self) -> Arc<dyn ExecutionEngine> {
        Arc::clone(&self.engine) as Arc<dyn ExecutionEngine>
    }

    fn decode_vote_set(&self, bytes: &[u8]) -> std::io::Result<CommitVoteSet> {
        if bytes.is_empty() {
            Ok(CommitVoteSet::zero())
        } else {
            CommitVoteSet::try_from_slice(bytes)
        }
    }
}
