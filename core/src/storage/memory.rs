use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use dotcoin_block::Block;
use dotcoin_hash::Hash;
use dotcoin_privacy::{Commitment, Nullifier};
use dotcoin_pubkey::Address;
use dotcoin_transaction::{Transaction, Utxo};

use super::{
    Admission, Conflict, LedgerStore, LedgerView, SortDirection, paginate, plan_admission,
};

#[derive(Default)]
struct State {
    blocks: Vec<Block>,
    block_index: HashMap<Hash, usize>,
    transactions: Vec<Transaction>,
    tx_index: HashMap<Hash, usize>,
    utxos: HashMap<Address, Utxo>,
    nullifiers: HashSet<Nullifier>,
    commitments: Vec<Commitment>,
    commitment_set: HashSet<Commitment>,
}

impl State {
    fn apply(&mut self, admission: Admission) {
        for utxo in admission.spent.into_iter().chain(admission.created) {
            self.utxos.insert(utxo.address.clone(), utxo);
        }
        if let Some(nullifier) = admission.nullifier {
            self.nullifiers.insert(nullifier);
        }
        for commitment in admission.commitments {
            self.commitment_set.insert(commitment);
            self.commitments.push(commitment);
        }
        self.tx_index
            .insert(admission.record.id.clone(), self.transactions.len());
        self.transactions.push(admission.record);
    }

    fn check_block(&self, block: &Block) -> Result<()> {
        if self.block_index.contains_key(&block.id) {
            anyhow::bail!(Conflict::DuplicateBlock(block.id.clone()));
        }
        Ok(())
    }

    fn push_block(&mut self, block: Block) {
        self.block_index.insert(block.id.clone(), self.blocks.len());
        self.blocks.push(block);
    }

    /// Positions of the listed transactions, all present and unconfirmed.
    fn check_confirmations(&self, tx_ids: &[Hash]) -> Result<Vec<usize>> {
        let mut seen = HashSet::new();
        tx_ids
            .iter()
            .map(|id| -> Result<usize> {
                let position = *self
                    .tx_index
                    .get(id)
                    .ok_or_else(|| Conflict::MissingTransaction(id.clone()))?;
                if self.transactions[position].is_confirmed() || !seen.insert(position) {
                    anyhow::bail!(Conflict::AlreadyConfirmed(id.clone()));
                }
                Ok(position)
            })
            .collect()
    }

    fn confirm(&mut self, block_id: &Hash, positions: Vec<usize>) {
        for position in positions {
            self.transactions[position].confirming_block = Some(block_id.clone());
        }
    }
}

impl LedgerView for State {
    fn utxo(&self, address: &Address) -> Result<Option<Utxo>> {
        Ok(self.utxos.get(address).cloned())
    }

    fn has_transaction(&self, id: &Hash) -> Result<bool> {
        Ok(self.tx_index.contains_key(id))
    }

    fn has_nullifier(&self, nullifier: &Nullifier) -> Result<bool> {
        Ok(self.nullifiers.contains(nullifier))
    }

    fn has_commitment(&self, commitment: &Commitment) -> Result<bool> {
        Ok(self.commitment_set.contains(commitment))
    }
}

/// Volatile store for tests and throwaway ledgers; one lock over everything.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ordered<T>(items: &[T], sort: SortDirection) -> Box<dyn Iterator<Item = &T> + '_> {
    match sort {
        SortDirection::Ascending => Box::new(items.iter()),
        SortDirection::Descending => Box::new(items.iter().rev()),
    }
}

impl LedgerStore for MemoryStore {
    fn get_blocks(&self, page: usize, limit: usize, sort: SortDirection) -> Result<Vec<Block>> {
        let state = self.state();
        paginate(
            ordered(&state.blocks, sort).map(|block| Ok(block.clone())),
            page,
            limit,
        )
    }

    fn get_block(&self, id: &Hash) -> Result<Option<Block>> {
        let state = self.state();
        Ok(state.block_index.get(id).map(|&i| state.blocks[i].clone()))
    }

    fn get_transactions(
        &self,
        page: usize,
        limit: usize,
        sort: SortDirection,
        unconfirmed_only: bool,
    ) -> Result<Vec<Transaction>> {
        let state = self.state();
        paginate(
            ordered(&state.transactions, sort)
                .filter(|tx| !unconfirmed_only || !tx.is_confirmed())
                .map(|tx| Ok(tx.clone())),
            page,
            limit,
        )
    }

    fn get_transaction(&self, id: &Hash) -> Result<Option<Transaction>> {
        let state = self.state();
        Ok(state.tx_index.get(id).map(|&i| state.transactions[i].clone()))
    }

    fn get_utxo(&self, address: &Address) -> Result<Option<Utxo>> {
        self.state().utxo(address)
    }

    fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool> {
        self.state().has_nullifier(nullifier)
    }

    fn commitments(&self) -> Result<Vec<Commitment>> {
        Ok(self.state().commitments.clone())
    }

    fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state();
        let admission = plan_admission(&*state, tx, None)?;
        state.apply(admission);
        Ok(())
    }

    fn add_block(&self, block: &Block) -> Result<()> {
        let mut state = self.state();
        state.check_block(block)?;
        state.push_block(block.clone());
        Ok(())
    }

    fn confirm_transactions(&self, block_id: &Hash, tx_ids: &[Hash]) -> Result<()> {
        let mut state = self.state();
        let positions = state.check_confirmations(tx_ids)?;
        state.confirm(block_id, positions);
        Ok(())
    }

    fn apply_block(&self, block: &Block, coinbase: &Transaction, tx_ids: &[Hash]) -> Result<()> {
        let mut state = self.state();
        // Every check runs before the first mutation
        let admission = plan_admission(&*state, coinbase, Some(&block.id))?;
        state.check_block(block)?;
        let positions = state.check_confirmations(tx_ids)?;

        state.apply(admission);
        state.push_block(block.clone());
        state.confirm(&block.id, positions);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        *self.state() = State::default();
        Ok(())
    }
}
