//! Ledger persistence.
//!
//! [`LedgerStore`] is the contract the validator writes through and the
//! client reads from. Every mutating call is check-then-write under the
//! store's own lock, so "input unspent" and "transaction unconfirmed" are
//! re-checked at commit time and a losing writer gets a [`Conflict`].

pub mod db;
pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use thiserror::Error;

use dotcoin_block::Block;
use dotcoin_hash::Hash;
use dotcoin_privacy::{Commitment, Nullifier};
use dotcoin_pubkey::Address;
use dotcoin_transaction::{Transaction, Utxo};

pub use db::RocksDbStore;
pub use memory::MemoryStore;

/// Insertion-order sort for paged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Oldest first (`1`)
    #[default]
    Ascending,
    /// Newest first (`-1`)
    Descending,
}

impl SortDirection {
    /// `1` is ascending, anything negative descending.
    pub fn from_sign(sign: i32) -> Self {
        if sign < 0 {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// A write lost a race against the current ledger state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Conflict {
    #[error("transaction {0} already exists")]
    DuplicateTransaction(Hash),
    #[error("transaction {0} does not exist")]
    MissingTransaction(Hash),
    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(Hash),
    #[error("utxo {0} does not exist")]
    MissingUtxo(Address),
    #[error("utxo {0} is already spent")]
    SpentUtxo(Address),
    #[error("utxo {0} already exists")]
    DuplicateUtxo(Address),
    #[error("nullifier {0} is already published")]
    NullifierSpent(Nullifier),
    #[error("commitment {0} is already in the note tree")]
    DuplicateCommitment(Commitment),
    #[error("block {0} already exists")]
    DuplicateBlock(Hash),
}

pub trait LedgerStore: Send + Sync {
    /// A page of blocks; `limit == 0` returns everything from `page * 0`.
    fn get_blocks(&self, page: usize, limit: usize, sort: SortDirection) -> Result<Vec<Block>>;

    fn get_block(&self, id: &Hash) -> Result<Option<Block>>;

    /// A page of transactions, optionally only those not yet in a block.
    fn get_transactions(
        &self,
        page: usize,
        limit: usize,
        sort: SortDirection,
        unconfirmed_only: bool,
    ) -> Result<Vec<Transaction>>;

    fn get_transaction(&self, id: &Hash) -> Result<Option<Transaction>>;

    fn get_utxo(&self, address: &Address) -> Result<Option<Utxo>>;

    fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool>;

    /// Note commitments in insertion order.
    fn commitments(&self) -> Result<Vec<Commitment>>;

    /// Records `tx`, spends its inputs, creates its transparent outputs,
    /// publishes its nullifier and appends its commitments.
    fn add_transaction(&self, tx: &Transaction) -> Result<()>;

    fn add_block(&self, block: &Block) -> Result<()>;

    /// Sets `confirming_block` on every listed transaction.
    fn confirm_transactions(&self, block_id: &Hash, tx_ids: &[Hash]) -> Result<()>;

    /// Coinbase admission, block insert and confirmations as one write.
    fn apply_block(&self, block: &Block, coinbase: &Transaction, tx_ids: &[Hash]) -> Result<()>;

    /// Erases every record.
    fn destroy(&self) -> Result<()>;
}

/// Reads the admission planner needs, served from inside a store's write lock.
pub(crate) trait LedgerView {
    fn utxo(&self, address: &Address) -> Result<Option<Utxo>>;
    fn has_transaction(&self, id: &Hash) -> Result<bool>;
    fn has_nullifier(&self, nullifier: &Nullifier) -> Result<bool>;
    fn has_commitment(&self, commitment: &Commitment) -> Result<bool>;
}

/// Everything admitting one transaction writes.
pub(crate) struct Admission {
    pub record: Transaction,
    pub spent: Vec<Utxo>,
    pub created: Vec<Utxo>,
    pub nullifier: Option<Nullifier>,
    pub commitments: Vec<Commitment>,
}

pub(crate) fn plan_admission(
    view: &impl LedgerView,
    tx: &Transaction,
    confirming_block: Option<&Hash>,
) -> Result<Admission> {
    if view.has_transaction(&tx.id)? {
        anyhow::bail!(Conflict::DuplicateTransaction(tx.id.clone()));
    }

    let mut seen = HashSet::new();
    let mut spent = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let utxo = view
            .utxo(input)?
            .ok_or_else(|| Conflict::MissingUtxo(input.clone()))?;
        if utxo.is_spent() || !seen.insert(input) {
            anyhow::bail!(Conflict::SpentUtxo(input.clone()));
        }
        spent.push(Utxo {
            spending_tx: Some(tx.id.clone()),
            ..utxo
        });
    }

    let mut seen = HashSet::new();
    let mut created = Vec::new();
    for output in tx.transparent_outputs() {
        if view.utxo(&output.address)?.is_some() || !seen.insert(&output.address) {
            anyhow::bail!(Conflict::DuplicateUtxo(output.address.clone()));
        }
        created.push(Utxo {
            address: output.address.clone(),
            amount: output.amount,
            origin: tx.id.clone(),
            spending_tx: None,
        });
    }

    let nullifier = tx.pour.as_ref().map(|pour| pour.nullifier);
    if let Some(nullifier) = &nullifier {
        if view.has_nullifier(nullifier)? {
            anyhow::bail!(Conflict::NullifierSpent(*nullifier));
        }
    }

    let mut seen = HashSet::new();
    let mut commitments = Vec::new();
    for output in tx.shielded_outputs() {
        if view.has_commitment(&output.commitment)? || !seen.insert(output.commitment) {
            anyhow::bail!(Conflict::DuplicateCommitment(output.commitment));
        }
        commitments.push(output.commitment);
    }

    let mut record = tx.clone();
    if let Some(block_id) = confirming_block {
        record.confirming_block = Some(block_id.clone());
    }

    Ok(Admission {
        record,
        spent,
        created,
        nullifier,
        commitments,
    })
}

/// Skips `page * limit` items and takes `limit` (all when zero).
pub(crate) fn paginate<T>(
    items: impl Iterator<Item = Result<T>>,
    page: usize,
    limit: usize,
) -> Result<Vec<T>> {
    let items = items.skip(page.saturating_mul(limit));
    if limit == 0 {
        items.collect()
    } else {
        items.take(limit).collect()
    }
}
