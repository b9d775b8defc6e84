//! Cross-module tests: a validator, its store and wallet clients wired
//! together the way a node runs them.

mod client;
mod miner;

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use dotcoin_config::ConsensusParams;
use dotcoin_keypair::Keypair;
use dotcoin_prover::{MockProofService, ProofService};
use dotcoin_pubkey::Address;

use crate::client::LedgerClient;
use crate::ledger::ConsensusValidator;
use crate::miner::{MinedBlock, Miner};
use crate::storage::{LedgerStore, MemoryStore, RocksDbStore};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn params(difficulty: usize) -> ConsensusParams {
    ConsensusParams {
        difficulty,
        limit: 16,
        reward: 100,
        root_history: 8,
    }
}

pub(crate) fn seed(id: u8) -> [u8; 32] {
    [id; 32]
}

/// Child `index` of the receive chain of wallet `id`, account 0.
pub(crate) fn address(id: u8, index: u32) -> Address {
    Keypair::from_seed(&seed(id))
        .unwrap()
        .receive_key(0)
        .unwrap()
        .derive_child(index)
        .unwrap()
        .address()
}

/// A validator over one store, with the mock proof service.
pub(crate) struct Node {
    pub store: Arc<dyn LedgerStore>,
    pub validator: ConsensusValidator,
    pub prover: Arc<dyn ProofService>,
    pub params: ConsensusParams,
    _dir: Option<TempDir>,
}

impl Node {
    pub fn memory(params: ConsensusParams) -> Self {
        Self::with_prover(params, Arc::new(MockProofService))
    }

    pub fn rocksdb(params: ConsensusParams) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
        Self::build(store, Arc::new(MockProofService), params, Some(dir))
    }

    pub fn with_prover(params: ConsensusParams, prover: Arc<dyn ProofService>) -> Self {
        Self::build(Arc::new(MemoryStore::new()), prover, params, None)
    }

    fn build(
        store: Arc<dyn LedgerStore>,
        prover: Arc<dyn ProofService>,
        params: ConsensusParams,
        dir: Option<TempDir>,
    ) -> Self {
        init_logger();
        let validator = ConsensusValidator::new(store.clone(), prover.clone(), params).unwrap();
        Self {
            store,
            validator,
            prover,
            params,
            _dir: dir,
        }
    }

    pub fn client(&self, id: u8) -> Arc<LedgerClient> {
        Arc::new(LedgerClient::from_seed(&seed(id), self.store.clone(), self.params).unwrap())
    }

    pub fn mine(&self, client: &Arc<LedgerClient>, account: u32) -> MinedBlock {
        Miner::new(client.clone())
            .mine(account, &CancellationToken::new())
            .unwrap()
    }

    /// Mines on behalf of `client` and submits the block.
    pub fn mine_and_submit(&self, client: &Arc<LedgerClient>, account: u32) -> MinedBlock {
        let mined = self.mine(client, account);
        self.validator
            .add_block(&mined.block, &mined.coinbase, &mined.transactions)
            .unwrap();
        mined
    }
}
