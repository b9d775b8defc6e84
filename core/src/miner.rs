//! Proof-of-work mining.
//!
//! The miner assembles a candidate block on top of the latest block: a fresh
//! coinbase, up to `limit - 1` pool transactions, their Merkle root, and a
//! nonce found by incrementing a random 256-bit counter until the block id
//! carries `difficulty` leading markers.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dotcoin_block::{Block, BlockPreimage, NONCE_LEN, increment_nonce, meets_difficulty, merkle_root};
use dotcoin_hash::{Hash, HashError};
use dotcoin_transaction::Transaction;

use crate::client::{ClientError, LedgerClient};
use crate::storage::SortDirection;

/// Attempts between cancellation checks.
const CANCEL_POLL_INTERVAL: u64 = 1024;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("corrupt block link: {0}")]
    Hash(#[from] HashError),
    #[error("mining worker failed: {0}")]
    Worker(String),
}

/// What `addBlock` takes: the block, its coinbase and the pool ids it confirms.
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub coinbase: Transaction,
    pub transactions: Vec<Hash>,
}

pub struct Miner {
    client: Arc<LedgerClient>,
}

impl Miner {
    pub fn new(client: Arc<LedgerClient>) -> Self {
        Self { client }
    }

    /// Builds a candidate block paying the reward to `account`.
    pub fn mine(&self, account: u32, cancel: &CancellationToken) -> Result<MinedBlock, MinerError> {
        let params = *self.client.params();
        let store = self.client.store();

        let previous = store
            .get_blocks(0, 1, SortDirection::Descending)
            .map_err(ClientError::from)?
            .into_iter()
            .next()
            .map(|block| block.id);

        let address = self.client.receiving_address(account)?;
        let coinbase = self.client.create_coinbase_transaction(&address)?;

        // A limit of 0 would read the whole pool
        let transactions: Vec<Hash> = if params.limit <= 1 {
            Vec::new()
        } else {
            store
                .get_transactions(0, params.limit - 1, SortDirection::Descending, true)
                .map_err(ClientError::from)?
                .into_iter()
                .map(|tx| tx.id)
                .collect()
        };

        let mut ids = Vec::with_capacity(transactions.len() + 1);
        ids.push(coinbase.id.clone());
        ids.extend_from_slice(&transactions);
        let root = merkle_root(&ids);

        info!(
            "Mining on {} with {} pool transactions at difficulty {}",
            previous.as_ref().map_or("genesis", Hash::as_str),
            transactions.len(),
            params.difficulty
        );

        let preimage = BlockPreimage::new(previous.as_ref(), &root)?;
        let (id, nonce) = search_nonce(&preimage, params.difficulty, cancel)?;

        Ok(MinedBlock {
            block: Block {
                id,
                previous,
                root,
                nonce: Hash::from_bytes(&nonce),
            },
            coinbase,
            transactions,
        })
    }
}

/// Increments a random nonce until the block id meets `difficulty`.
fn search_nonce(
    preimage: &BlockPreimage,
    difficulty: usize,
    cancel: &CancellationToken,
) -> Result<(Hash, [u8; NONCE_LEN]), MinerError> {
    let started = Instant::now();
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut attempts = 0u64;
    loop {
        if attempts % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
            warn!("Mining cancelled after {attempts} attempts");
            return Err(MinerError::Cancelled { attempts });
        }
        increment_nonce(&mut nonce);
        attempts += 1;

        let id = preimage.hash_with(&nonce);
        if meets_difficulty(&id, difficulty) {
            info!(
                "Found block {id} after {attempts} attempts in {:?}",
                started.elapsed()
            );
            return Ok((id, nonce));
        }
    }
}

/// Runs [`Miner::mine`] on tokio's blocking pool.
pub struct MiningService {
    miner: Arc<Miner>,
}

/// A running nonce search.
pub struct MiningHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<MinedBlock, MinerError>>,
}

impl MiningService {
    pub fn new(miner: Arc<Miner>) -> Self {
        Self { miner }
    }

    pub fn start(&self, account: u32) -> MiningHandle {
        let cancel = CancellationToken::new();
        let miner = Arc::clone(&self.miner);
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || miner.mine(account, &token));
        debug!("Mining task started for account {account}");
        MiningHandle { cancel, task }
    }
}

impl MiningHandle {
    /// Preempts the search, for example when another block arrives first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<MinedBlock, MinerError> {
        self.task
            .await
            .map_err(|err| MinerError::Worker(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_nonce_meets_difficulty() {
        let preimage = BlockPreimage::new(None, &Hash::from_bytes(b"root")).unwrap();
        let (id, nonce) = search_nonce(&preimage, 1, &CancellationToken::new()).unwrap();
        assert!(meets_difficulty(&id, 1));
        assert_eq!(preimage.hash_with(&nonce), id);
    }

    #[test]
    fn test_search_nonce_honours_cancellation() {
        let preimage = BlockPreimage::new(None, &Hash::from_bytes(b"root")).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = search_nonce(&preimage, 64, &cancel);
        assert!(matches!(result, Err(MinerError::Cancelled { attempts: 0 })));
    }
}
