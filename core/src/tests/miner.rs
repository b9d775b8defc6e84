use std::sync::Arc;

use dotcoin_block::{POW_MARKER, merkle_root, verify_block_hash};
use dotcoin_hash::Hash;

use super::{Node, address, params};
use crate::miner::{Miner, MinerError, MiningService};
use crate::storage::SortDirection;

#[test]
fn test_mined_block_meets_difficulty() {
    for difficulty in 0..=2 {
        let node = Node::memory(params(difficulty));
        let mined = node.mine_and_submit(&node.client(1), 0);

        let id = mined.block.id.as_str();
        assert!(id.chars().take(difficulty).all(|c| c == POW_MARKER));
        assert!(verify_block_hash(&mined.block, difficulty));
        assert_eq!(mined.block.compute_id().unwrap(), mined.block.id);
    }
}

#[test]
fn test_verify_block_hash_matches_prefix_for_any_block() {
    let node = Node::memory(params(1));
    let mut block = node.mine(&node.client(1), 0).block;

    // Not a mined block, only the prefix matters
    block.id = Hash::from_bytes(&[0, 0, 0, 9]);
    assert!(verify_block_hash(&block, 3));
    assert!(!verify_block_hash(&block, 4));
    block.id = Hash::from_bytes(&[9, 0]);
    assert!(verify_block_hash(&block, 0));
    assert!(!verify_block_hash(&block, 1));
}

#[test]
fn test_block_links_to_latest() {
    let node = Node::memory(params(1));
    let client = node.client(1);
    let genesis = node.mine_and_submit(&client, 0);
    let second = node.mine_and_submit(&client, 0);
    let third = node.mine(&client, 0);

    assert_eq!(second.block.previous, Some(genesis.block.id));
    assert_eq!(third.block.previous, Some(second.block.id));
}

#[test]
fn test_root_covers_coinbase_and_pool() {
    let node = Node::memory(params(1));
    let client = node.client(1);
    node.mine_and_submit(&client, 0);
    node.mine_and_submit(&client, 0);

    let first = client.create_transaction(0, &address(2, 0), 10).unwrap();
    node.validator.add_transaction(first.clone()).unwrap();
    let second = client.create_transaction(0, &address(2, 0), 10).unwrap();
    node.validator.add_transaction(second.clone()).unwrap();

    let mined = node.mine(&client, 0);
    // Newest first
    assert_eq!(mined.transactions, vec![second.id.clone(), first.id.clone()]);
    assert_eq!(
        mined.block.root,
        merkle_root(&[mined.coinbase.id.clone(), second.id, first.id])
    );
}

#[test]
fn test_pool_capped_below_limit() {
    let mut params = params(1);
    params.limit = 2;
    let node = Node::memory(params);
    let client = node.client(1);
    node.mine_and_submit(&client, 0);
    node.mine_and_submit(&client, 0);

    for _ in 0..2 {
        let tx = client.create_transaction(0, &address(2, 0), 10).unwrap();
        node.validator.add_transaction(tx).unwrap();
    }

    let mined = node.mine_and_submit(&client, 0);
    assert_eq!(mined.transactions.len(), 1);
    assert_eq!(
        node.validator
            .get_transactions(0, 0, SortDirection::Ascending, true)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_mining_service_finds_block() {
    let node = Node::memory(params(1));
    let service = MiningService::new(Arc::new(Miner::new(node.client(1))));

    let mined = service.start(0).join().await.unwrap();
    node.validator
        .add_block(&mined.block, &mined.coinbase, &mined.transactions)
        .unwrap();
}

#[tokio::test]
async fn test_mining_service_cancellation() {
    // Unreachable difficulty: the search only ends when cancelled
    let node = Node::memory(params(64));
    let service = MiningService::new(Arc::new(Miner::new(node.client(1))));

    let handle = service.start(0);
    handle.cancel();
    let result = handle.join().await;
    assert!(matches!(result, Err(MinerError::Cancelled { .. })));
}
