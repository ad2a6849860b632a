//! End-to-end scenarios for the block manager, driven through its public surface against the
//! in-memory database and the deterministic counter engine defined in `common`.

mod common;

use std::time::Duration;

use borsh::BorshSerialize;

use blockmgr::engine::FinalizeScope;
use blockmgr::errors::BlockManagerError;
use blockmgr::types::basic::{BlockHeight, CryptoHash, Timestamp};
use blockmgr::types::voting::CommitVoteSet;

use common::counter_engine::CounterTransaction;
use common::{build_child, commit_votes, completion_channel, restart_node, start_node};

const CB_TIMEOUT: Duration = Duration::from_secs(5);

// Bucket prefixes and the chain-property key, as fixed by the persisted layout.
const CHAIN_PROPERTY: u8 = 0;
const BLOCK_HEADER_HASH_BY_HEIGHT: u8 = 1;

fn raw_key(prefix: u8, key: &[u8]) -> Vec<u8> {
    let mut raw = vec![prefix];
    raw.extend_from_slice(key);
    raw
}

#[test]
fn genesis_bootstrap() {
    let node = start_node();

    let last = node.manager.get_last_block().unwrap();
    assert_eq!(last.height(), BlockHeight::genesis());
    assert!(last.prev_id().is_none());
    assert!(last.proposer().is_none());

    let fetched = node.manager.get_block(&last.id()).unwrap();
    assert_eq!(fetched.id(), last.id());
    assert!(fetched.prev_id().is_none());

    // The persisted layout is externally stable: the finalized height lives in the chain-property
    // bucket, and the height index maps height 0 to the 32-byte genesis id.
    let last_height = node
        .db
        .get_raw(&raw_key(CHAIN_PROPERTY, b"block.lastHeight"))
        .expect("finalized height is persisted");
    assert_eq!(last_height, 0u64.try_to_vec().unwrap());

    let height_key = raw_key(
        BLOCK_HEADER_HASH_BY_HEIGHT,
        &BlockHeight::genesis().try_to_vec().unwrap(),
    );
    let genesis_id = node.db.get_raw(&height_key).expect("height index is persisted");
    assert_eq!(genesis_id.len(), 32);
    assert_eq!(genesis_id, last.id().bytes());
}

#[test]
fn linear_import_and_finalize() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let block = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );

    // The wire encoding round-trips to the same id.
    let bytes = block.to_bytes();
    let decoded = node.manager.block_from_reader(&bytes[..]).unwrap();
    assert_eq!(decoded.id(), block.id());

    let (cb, done) = completion_channel();
    node.manager.import(&bytes[..], cb).unwrap();
    let imported = done.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    assert_eq!(imported.id(), block.id());

    // Still a candidate: finalized height stays 0 until the caller finalizes.
    assert_eq!(
        node.manager.get_last_block().unwrap().height(),
        BlockHeight::genesis()
    );

    node.manager.finalize(&imported).unwrap();
    assert_eq!(
        node.manager.get_last_block().unwrap().height(),
        BlockHeight::new(1)
    );
    let last_height = node
        .db
        .get_raw(&raw_key(CHAIN_PROPERTY, b"block.lastHeight"))
        .unwrap();
    assert_eq!(last_height, 1u64.try_to_vec().unwrap());
    assert_eq!(
        node.manager.get_block_by_height(BlockHeight::new(1)).unwrap().id(),
        block.id()
    );
}

#[test]
fn finalize_prunes_sibling_subtrees() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let block_a = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );
    let block_b = build_child(
        &node.engine,
        &genesis,
        &node.keys[1],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(2)],
        Timestamp::new(20),
    );

    let (cb_a, done_a) = completion_channel();
    node.manager.import(&block_a.to_bytes()[..], cb_a).unwrap();
    let imported_a = done_a.recv_timeout(CB_TIMEOUT).unwrap().unwrap();

    let (cb_b, done_b) = completion_channel();
    node.manager.import(&block_b.to_bytes()[..], cb_b).unwrap();
    done_b.recv_timeout(CB_TIMEOUT).unwrap().unwrap();

    node.manager.finalize(&imported_a).unwrap();

    // B was never finalized, so it has no persistent record, and its node left the tree: a child
    // of B has no parent to attach to.
    assert!(matches!(
        node.manager.get_block(&block_b.id()),
        Err(BlockManagerError::NotFound)
    ));
    let orphan = build_child(
        &node.engine,
        &block_b,
        &node.keys[0],
        commit_votes(&block_b, &node.keys, Timestamp::new(30)),
        &[],
        Timestamp::new(30),
    );
    assert!(matches!(
        node.manager.import(&orphan.to_bytes()[..], |_| {}),
        Err(BlockManagerError::InvalidPreviousId { .. })
    ));

    // Everything except A's own two transitions has been disposed: the old root's pair and B's
    // pair.
    assert_eq!(node.engine.live_transitions(), 2);

    // The engine was asked to finalize A's patch+result and then its normal transactions.
    let calls = node.engine.finalize_calls();
    let scopes: Vec<FinalizeScope> = calls.iter().rev().take(2).map(|(_, s)| *s).collect();
    assert!(scopes.contains(&FinalizeScope::NORMAL_TRANSACTIONS));
    assert!(scopes
        .contains(&(FinalizeScope::PATCH_TRANSACTIONS | FinalizeScope::RESULT)));

    // A child of A still imports fine.
    let child = build_child(
        &node.engine,
        &imported_a,
        &node.keys[0],
        commit_votes(&imported_a, &node.keys, Timestamp::new(40)),
        &[],
        Timestamp::new(40),
    );
    let (cb, done) = completion_channel();
    node.manager.import(&child.to_bytes()[..], cb).unwrap();
    done.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
}

#[test]
fn import_with_unknown_parent_is_rejected() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let mut block = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[],
        Timestamp::new(10),
    );
    // Rebuild the block with a parent id nobody has.
    block = blockmgr::types::block::Block::new(
        block.height(),
        block.timestamp(),
        block.proposer().copied(),
        Some(CryptoHash::of(b"no such block")),
        block.logs_bloom().clone(),
        block.result().to_vec(),
        block.patch_transactions().clone(),
        block.normal_transactions().clone(),
        block.next_validators().clone(),
        block.votes().clone(),
    );

    assert!(matches!(
        node.manager.import(&block.to_bytes()[..], |_| {}),
        Err(BlockManagerError::InvalidPreviousId { .. })
    ));
}

#[test]
fn cancelled_import_fires_no_callback() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();
    let baseline = node.engine.live_transitions();

    let block = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );

    node.engine.hold_events();
    let (cb, done) = completion_channel();
    let canceller = node.manager.import(&block.to_bytes()[..], cb).unwrap();

    assert!(canceller.cancel());
    assert!(!canceller.cancel());

    // The engine delivers its (now stale) completion events; they must be discarded.
    node.engine.release_events();

    assert!(done.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(node.engine.live_transitions(), baseline);
    assert_eq!(
        node.manager.get_last_block().unwrap().height(),
        BlockHeight::genesis()
    );
}

#[test]
fn wait_for_block_signals_on_finalization() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let waiter = node.manager.wait_for_block(BlockHeight::new(2)).unwrap();

    let block1 = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );
    let (cb1, done1) = completion_channel();
    node.manager.import(&block1.to_bytes()[..], cb1).unwrap();
    let imported1 = done1.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported1).unwrap();

    let block2 = build_child(
        &node.engine,
        &imported1,
        &node.keys[0],
        commit_votes(&imported1, &node.keys, Timestamp::new(20)),
        &[CounterTransaction::Increment(2)],
        Timestamp::new(20),
    );
    let (cb2, done2) = completion_channel();
    node.manager.import(&block2.to_bytes()[..], cb2).unwrap();
    let imported2 = done2.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported2).unwrap();

    let notified = waiter.recv_timeout(CB_TIMEOUT).unwrap();
    assert_eq!(notified.height(), BlockHeight::new(2));
    assert_eq!(notified.id(), block2.id());
    // Exactly once: the subscriber was removed, dropping the sender.
    assert!(waiter.try_recv().is_err());

    // An already-finalized height is signalled immediately.
    let ready = node.manager.wait_for_block(BlockHeight::new(1)).unwrap();
    assert_eq!(ready.recv_timeout(CB_TIMEOUT).unwrap().id(), block1.id());
}

#[test]
fn propose_builds_on_parent() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();
    let wallet_address =
        blockmgr::types::basic::Address::from_verifying_key(&node.keys[0].verifying_key());

    node.engine.queue_transaction(CounterTransaction::Increment(7));

    let (cb, done) = completion_channel();
    node.manager
        .propose(&genesis.id(), CommitVoteSet::zero(), cb)
        .unwrap();
    let proposed = done.recv_timeout(CB_TIMEOUT).unwrap().unwrap();

    assert_eq!(proposed.height(), BlockHeight::new(1));
    assert_eq!(proposed.prev_id(), Some(&genesis.id()));
    assert_eq!(proposed.proposer(), Some(&wallet_address));
    assert_eq!(proposed.normal_transactions().len(), 1);

    node.manager.finalize(&proposed).unwrap();
    assert_eq!(
        node.manager.get_last_block().unwrap().height(),
        BlockHeight::new(1)
    );
}

#[test]
fn transaction_info_tracks_receipt_availability() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let tx = CounterTransaction::Increment(1);
    let block1 = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[tx.clone()],
        Timestamp::new(10),
    );
    let (cb1, done1) = completion_channel();
    node.manager.import(&block1.to_bytes()[..], cb1).unwrap();
    let imported1 = done1.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported1).unwrap();

    let tx_id = tx.to_transaction().id();
    let info = node.manager.get_transaction_info(&tx_id).unwrap();
    assert_eq!(info.block().id(), block1.id());
    assert_eq!(info.index(), 0);
    // The receipt lives in the result of the block at height 2, which is not finalized yet.
    assert!(matches!(
        info.result_block(),
        Err(BlockManagerError::ResultNotFinalized)
    ));

    let block2 = build_child(
        &node.engine,
        &imported1,
        &node.keys[0],
        commit_votes(&imported1, &node.keys, Timestamp::new(20)),
        &[],
        Timestamp::new(20),
    );
    let (cb2, done2) = completion_channel();
    node.manager.import(&block2.to_bytes()[..], cb2).unwrap();
    let imported2 = done2.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported2).unwrap();

    let info = node.manager.get_transaction_info(&tx_id).unwrap();
    assert_eq!(info.result_block().unwrap().id(), block2.id());

    assert!(matches!(
        node.manager.get_transaction_info(&CryptoHash::of(b"unknown")),
        Err(BlockManagerError::NotFound)
    ));
}

#[test]
fn restart_recovers_chain_head() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let block1 = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );
    let (cb1, done1) = completion_channel();
    node.manager.import(&block1.to_bytes()[..], cb1).unwrap();
    let imported1 = done1.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported1).unwrap();

    let node = restart_node(node);
    let recovered = node.manager.get_last_block().unwrap();
    assert_eq!(recovered.height(), BlockHeight::new(1));
    assert_eq!(recovered.id(), block1.id());

    // The recovered tip carries a reconstructed pre-execution: children import on top of it.
    let block2 = build_child(
        &node.engine,
        &recovered,
        &node.keys[0],
        commit_votes(&recovered, &node.keys, Timestamp::new(20)),
        &[CounterTransaction::Increment(2)],
        Timestamp::new(20),
    );
    let (cb2, done2) = completion_channel();
    node.manager.import(&block2.to_bytes()[..], cb2).unwrap();
    let imported2 = done2.recv_timeout(CB_TIMEOUT).unwrap().unwrap();
    node.manager.finalize(&imported2).unwrap();
    assert_eq!(
        node.manager.get_last_block().unwrap().height(),
        BlockHeight::new(2)
    );
}

#[test]
fn mismatched_body_is_rejected() {
    let node = start_node();
    let genesis = node.manager.get_last_block().unwrap();

    let block = build_child(
        &node.engine,
        &genesis,
        &node.keys[0],
        CommitVoteSet::zero(),
        &[CounterTransaction::Increment(1)],
        Timestamp::new(10),
    );

    // Replace the body's normal transactions without updating the header's committed hash.
    let header_len = block.header_bytes().len();
    let mut bytes = block.to_bytes();
    let forged_body = blockmgr::types::block::BlockBodyFormat {
        patch_transactions: Vec::new(),
        normal_transactions: vec![CounterTransaction::Increment(9).try_to_vec().unwrap()],
        votes: block.votes().bytes(),
    };
    bytes.truncate(header_len);
    bytes.extend_from_slice(&forged_body.try_to_vec().unwrap());

    assert!(matches!(
        node.manager.block_from_reader(&bytes[..]),
        Err(BlockManagerError::InvalidBlock { .. })
    ));
}
