use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::{Serialize, de::DeserializeOwned};

use dotcoin_block::Block;
use dotcoin_hash::Hash;
use dotcoin_privacy::{Commitment, Nullifier};
use dotcoin_pubkey::Address;
use dotcoin_transaction::{Transaction, Utxo};

use super::{
    Admission, Conflict, LedgerStore, LedgerView, SortDirection, paginate, plan_admission,
};

const CF_BLOCKS: &str = "blocks";
const CF_BLOCK_SEQ: &str = "block_seq";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TX_SEQ: &str = "tx_seq";
const CF_UTXOS: &str = "utxos";
const CF_NULLIFIERS: &str = "nullifiers";
const CF_COMMITMENTS: &str = "commitments";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 8] = [
    CF_BLOCKS,
    CF_BLOCK_SEQ,
    CF_TRANSACTIONS,
    CF_TX_SEQ,
    CF_UTXOS,
    CF_NULLIFIERS,
    CF_COMMITMENTS,
    CF_META,
];

const META_BLOCK_COUNT: &[u8] = b"block_count";
const META_TX_COUNT: &[u8] = b"tx_count";
const META_COMMITMENT_COUNT: &[u8] = b"commitment_count";

/// A thread-safe wrapper around RocksDB.
///
/// Records are JSON documents keyed by their encoded id. Insertion order is
/// kept in the `*_seq` families (big-endian sequence number to id) and note
/// commitments map to their leaf position.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    /// Serialises check-then-write paths
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), families)
            .map_err(|e| anyhow::anyhow!("Failed to open RocksDB: {}", e))?;

        let store = Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        };
        log::info!(
            "Opened ledger store at {}: {} blocks, {} transactions",
            path.as_ref().display(),
            store.counter(META_BLOCK_COUNT)?,
            store.counter(META_TX_COUNT)?
        );
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("{name} CF missing"))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt record in {cf}"))?,
            )),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_META)?, key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .context("invalid counter length")?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Ids from a sequence family, in the requested order.
    fn ordered_ids(&self, seq_cf: &str, sort: SortDirection) -> Result<Vec<Hash>> {
        let mode = match sort {
            SortDirection::Ascending => IteratorMode::Start,
            SortDirection::Descending => IteratorMode::End,
        };
        self.db
            .iterator_cf(self.cf(seq_cf)?, mode)
            .map(|item| -> Result<Hash> {
                let (_, value) = item?;
                let id = String::from_utf8(value.to_vec()).context("invalid id in sequence")?;
                Ok(Hash::from(id))
            })
            .collect()
    }

    fn stage_admission(&self, batch: &mut WriteBatch, admission: &Admission) -> Result<()> {
        let id = admission.record.id.as_str().as_bytes();
        self.put_json(batch, CF_TRANSACTIONS, id, &admission.record)?;

        let seq = self.counter(META_TX_COUNT)?;
        batch.put_cf(self.cf(CF_TX_SEQ)?, seq.to_be_bytes(), id);
        batch.put_cf(self.cf(CF_META)?, META_TX_COUNT, (seq + 1).to_be_bytes());

        for utxo in admission.spent.iter().chain(&admission.created) {
            self.put_json(batch, CF_UTXOS, utxo.address.as_str().as_bytes(), utxo)?;
        }

        if let Some(nullifier) = &admission.nullifier {
            batch.put_cf(self.cf(CF_NULLIFIERS)?, nullifier, b"");
        }

        let mut position = self.counter(META_COMMITMENT_COUNT)?;
        for commitment in &admission.commitments {
            batch.put_cf(self.cf(CF_COMMITMENTS)?, commitment, position.to_be_bytes());
            position += 1;
        }
        batch.put_cf(
            self.cf(CF_META)?,
            META_COMMITMENT_COUNT,
            position.to_be_bytes(),
        );
        Ok(())
    }

    fn stage_block(&self, batch: &mut WriteBatch, block: &Block) -> Result<()> {
        let id = block.id.as_str().as_bytes();
        if self.db.get_cf(self.cf(CF_BLOCKS)?, id)?.is_some() {
            anyhow::bail!(Conflict::DuplicateBlock(block.id.clone()));
        }
        self.put_json(batch, CF_BLOCKS, id, block)?;

        let seq = self.counter(META_BLOCK_COUNT)?;
        batch.put_cf(self.cf(CF_BLOCK_SEQ)?, seq.to_be_bytes(), id);
        batch.put_cf(self.cf(CF_META)?, META_BLOCK_COUNT, (seq + 1).to_be_bytes());
        Ok(())
    }

    fn stage_confirmations(
        &self,
        batch: &mut WriteBatch,
        block_id: &Hash,
        tx_ids: &[Hash],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for id in tx_ids {
            let mut tx: Transaction = self
                .get_json(CF_TRANSACTIONS, id.as_str().as_bytes())?
                .ok_or_else(|| Conflict::MissingTransaction(id.clone()))?;
            if tx.is_confirmed() || !seen.insert(id) {
                anyhow::bail!(Conflict::AlreadyConfirmed(id.clone()));
            }
            tx.confirming_block = Some(block_id.clone());
            self.put_json(batch, CF_TRANSACTIONS, id.as_str().as_bytes(), &tx)?;
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerView for RocksDbStore {
    fn utxo(&self, address: &Address) -> Result<Option<Utxo>> {
        self.get_json(CF_UTXOS, address.as_str().as_bytes())
    }

    fn has_transaction(&self, id: &Hash) -> Result<bool> {
        Ok(self
            .db
            .get_cf(self.cf(CF_TRANSACTIONS)?, id.as_str().as_bytes())?
            .is_some())
    }

    fn has_nullifier(&self, nullifier: &Nullifier) -> Result<bool> {
        Ok(self.db.get_cf(self.cf(CF_NULLIFIERS)?, nullifier)?.is_some())
    }

    fn has_commitment(&self, commitment: &Commitment) -> Result<bool> {
        Ok(self
            .db
            .get_cf(self.cf(CF_COMMITMENTS)?, commitment)?
            .is_some())
    }
}

impl LedgerStore for RocksDbStore {
    fn get_blocks(&self, page: usize, limit: usize, sort: SortDirection) -> Result<Vec<Block>> {
        let ids = self.ordered_ids(CF_BLOCK_SEQ, sort)?;
        let blocks = ids.iter().map(|id| -> Result<Block> {
            self.get_block(id)?
                .with_context(|| format!("block {id} listed but missing"))
        });
        paginate(blocks, page, limit)
    }

    fn get_block(&self, id: &Hash) -> Result<Option<Block>> {
        self.get_json(CF_BLOCKS, id.as_str().as_bytes())
    }

    fn get_transactions(
        &self,
        page: usize,
        limit: usize,
        sort: SortDirection,
        unconfirmed_only: bool,
    ) -> Result<Vec<Transaction>> {
        let ids = self.ordered_ids(CF_TX_SEQ, sort)?;
        let transactions = ids
            .iter()
            .map(|id| -> Result<Transaction> {
                self.get_transaction(id)?
                    .with_context(|| format!("transaction {id} listed but missing"))
            })
            .filter(|tx| match tx {
                Ok(tx) => !unconfirmed_only || !tx.is_confirmed(),
                Err(_) => true,
            });
        paginate(transactions, page, limit)
    }

    fn get_transaction(&self, id: &Hash) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, id.as_str().as_bytes())
    }

    fn get_utxo(&self, address: &Address) -> Result<Option<Utxo>> {
        self.utxo(address)
    }

    fn nullifier_exists(&self, nullifier: &Nullifier) -> Result<bool> {
        self.has_nullifier(nullifier)
    }

    fn commitments(&self) -> Result<Vec<Commitment>> {
        let mut positioned = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf(CF_COMMITMENTS)?, IteratorMode::Start)
        {
            let (key, value) = item?;
            let commitment: [u8; 32] = key
                .as_ref()
                .try_into()
                .context("invalid commitment length")?;
            let position: [u8; 8] = value
                .as_ref()
                .try_into()
                .context("invalid position length")?;
            positioned.push((u64::from_be_bytes(position), Commitment(commitment)));
        }
        positioned.sort_unstable_by_key(|(position, _)| *position);
        Ok(positioned.into_iter().map(|(_, c)| c).collect())
    }

    fn add_transaction(&self, tx: &Transaction) -> Result<()> {
        let _guard = self.lock();
        let admission = plan_admission(self, tx, None)?;
        let mut batch = WriteBatch::default();
        self.stage_admission(&mut batch, &admission)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn add_block(&self, block: &Block) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_block(&mut batch, block)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn confirm_transactions(&self, block_id: &Hash, tx_ids: &[Hash]) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_confirmations(&mut batch, block_id, tx_ids)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn apply_block(&self, block: &Block, coinbase: &Transaction, tx_ids: &[Hash]) -> Result<()> {
        let _guard = self.lock();
        let admission = plan_admission(self, coinbase, Some(&block.id))?;
        let mut batch = WriteBatch::default();
        self.stage_admission(&mut batch, &admission)?;
        self.stage_block(&mut batch, block)?;
        self.stage_confirmations(&mut batch, &block.id, tx_ids)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        for name in ALL_CFS {
            let cf = self.cf(name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = item?;
                batch.delete_cf(cf, key);
            }
        }
        self.db.write(batch)?;
        log::info!("Ledger store erased");
        Ok(())
    }
}
