pub(crate) mod counter_engine;

pub(crate) mod mem_db;

pub(crate) mod test_chain;

use std::io;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Once};
use std::thread;

use ed25519_dalek::{Signer, SigningKey};
use log::LevelFilter;

use blockmgr::config::BlockManagerConfig;
use blockmgr::errors::BlockManagerError;
use blockmgr::manager::BlockManager;
use blockmgr::types::basic::{
    Address, LogsBloom, Power, Round, SignatureBytes, SignatureSet, Timestamp,
};
use blockmgr::types::block::Block;
use blockmgr::types::keypair::Wallet;
use blockmgr::types::validator_set::ValidatorSet;
use blockmgr::types::voting::CommitVoteSet;

use counter_engine::{CounterEngine, CounterTransaction};
use mem_db::MemDB;
use test_chain::TestChain;

static LOGGER_INIT: Once = Once::new();

// Set up a logger that logs all log messages with level Trace and above.
pub(crate) fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .apply()
            .unwrap();
    })
}

/// Deterministic signing keys, so validator sets and addresses are stable across runs.
pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    (0..n)
        .map(|i| SigningKey::from_bytes(&[i as u8 + 1; 32]))
        .collect()
}

pub(crate) fn validator_set(keys: &[SigningKey]) -> ValidatorSet {
    let mut set = ValidatorSet::new();
    for key in keys {
        set.put(&key.verifying_key(), Power::new(1));
    }
    set
}

/// A commit-vote set over `block` signed by every key, all voting in round 0 at `timestamp`.
pub(crate) fn commit_votes(
    block: &Block,
    keys: &[SigningKey],
    timestamp: Timestamp,
) -> CommitVoteSet {
    let set = validator_set(keys);
    let payload = CommitVoteSet::vote_payload(&block.id(), Round::zero(), timestamp);
    let mut signatures = SignatureSet::new(set.len());
    for key in keys {
        let pos = set.position(&key.verifying_key()).unwrap();
        let signature = SignatureBytes::new(key.sign(&payload).to_bytes());
        signatures.set(pos, Some(signature));
    }
    CommitVoteSet::new(block.id(), Round::zero(), timestamp, signatures)
}

/// Build a block extending `parent` that the counter engine will accept on import: its result is
/// what the engine will compute for it, its patch list is empty, and its normal transactions are
/// `txs`.
pub(crate) fn build_child(
    engine: &CounterEngine,
    parent: &Block,
    proposer: &SigningKey,
    votes: CommitVoteSet,
    txs: &[CounterTransaction],
    timestamp: Timestamp,
) -> Block {
    Block::new(
        parent.height() + 1,
        timestamp,
        Some(Address::from_verifying_key(&proposer.verifying_key())),
        Some(parent.id()),
        LogsBloom::empty(),
        engine.expected_child_result(parent),
        engine.make_list(&[]),
        engine.make_list(txs),
        engine.validators(),
        votes,
    )
}

pub(crate) struct TestNode {
    pub(crate) manager: BlockManager<TestChain>,
    pub(crate) engine: Arc<CounterEngine>,
    pub(crate) keys: Vec<SigningKey>,
    pub(crate) db: MemDB,
}

/// Start a node on a fresh database, bootstrapping the genesis chain.
pub(crate) fn start_node() -> TestNode {
    start_node_on(MemDB::new())
}

/// Start a node on an existing database, recovering the persisted chain head if there is one.
pub(crate) fn start_node_on(db: MemDB) -> TestNode {
    setup_logger(LevelFilter::Debug);
    let keys = signing_keys(3);
    let engine = Arc::new(CounterEngine::new(validator_set(&keys)));
    let chain = TestChain::new(db.clone(), Wallet::new(keys[0].clone()), Arc::clone(&engine));
    let manager = BlockManager::new(chain, BlockManagerConfig::default(), None, None, None)
        .expect("manager construction failed");
    TestNode {
        manager,
        engine,
        keys,
        db,
    }
}

/// Shut the node's manager down and start a fresh one over the same database and engine, as after
/// a process restart.
pub(crate) fn restart_node(node: TestNode) -> TestNode {
    let TestNode {
        manager,
        engine,
        keys,
        db,
    } = node;
    drop(manager);
    let chain = TestChain::new(db.clone(), Wallet::new(keys[0].clone()), Arc::clone(&engine));
    let manager = BlockManager::new(chain, BlockManagerConfig::default(), None, None, None)
        .expect("manager recovery failed");
    TestNode {
        manager,
        engine,
        keys,
        db,
    }
}

/// A completion callback paired with the receiver its result arrives on.
pub(crate) fn completion_channel() -> (
    impl FnOnce(Result<Arc<Block>, BlockManagerError>) + Send + 'static,
    Receiver<Result<Arc<Block>, BlockManagerError>>,
) {
    let (tx, rx) = mpsc::channel();
    (
        move |result: Result<Arc<Block>, BlockManagerError>| {
            let _ = tx.send(result);
        },
        rx,
    )
}
