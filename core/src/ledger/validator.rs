//! The ledger state machine.
//!
//! Transactions go `pending -> confirmed`, UTXOs `unspent -> spent`, and
//! neither ever reverses. Every check is fail-fast and ordered; the first
//! violated rule is the one reported.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use serde_json::Value;

use dotcoin_block::{Block, merkle_root, meets_difficulty};
use dotcoin_config::ConsensusParams;
use dotcoin_hash::Hash;
use dotcoin_keypair::verify;
use dotcoin_privacy::{Fr, NoteCommitmentTree, Nullifier};
use dotcoin_prover::{POUR_OUTPUTS, PourPublicInputs, ProofError, ProofService};
use dotcoin_pubkey::Address;
use dotcoin_transaction::{Output, PourDescription, Transaction, Utxo};

use super::error::{LedgerError, ValidationError};
use super::shielded_state::ShieldedState;
use crate::storage::{LedgerStore, SortDirection};

/// Fields a submitted transaction document must carry.
const REQUIRED_FIELDS: [&str; 4] = ["id", "inputs", "outputs", "signatures"];

/// The sole gate into the ledger store.
///
/// Admission is serialised on the shielded-state lock so the note tree and
/// the store advance together.
pub struct ConsensusValidator {
    store: Arc<dyn LedgerStore>,
    prover: Arc<dyn ProofService>,
    params: ConsensusParams,
    shielded: Mutex<ShieldedState>,
}

impl ConsensusValidator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prover: Arc<dyn ProofService>,
        params: ConsensusParams,
    ) -> Result<Self, LedgerError> {
        let shielded = ShieldedState::load(store.as_ref(), params.root_history)?;
        Ok(Self {
            store,
            prover,
            params,
            shielded: Mutex::new(shielded),
        })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    fn shielded(&self) -> MutexGuard<'_, ShieldedState> {
        self.shielded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Admits a transaction received as a JSON document.
    pub fn submit_transaction(&self, raw: &Value) -> Result<Transaction, LedgerError> {
        let tx = parse_transaction(raw).inspect_err(|err| warn!("Rejected submission: {err}"))?;
        self.add_transaction(tx)
    }

    /// Runs every transaction rule without writing anything.
    pub fn verify_transaction(&self, tx: &Transaction, coinbase: bool) -> Result<(), LedgerError> {
        let shielded = self.shielded();
        self.check_transaction(&shielded, tx, coinbase)
    }

    /// Verifies `tx` and records it as pending.
    pub fn add_transaction(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        let mut shielded = self.shielded();

        self.check_transaction(&shielded, &tx, false)
            .and_then(|()| {
                self.store
                    .add_transaction(&tx)
                    .map_err(|err| LedgerError::from_store(err, &tx.id))
            })
            .inspect_err(|err| warn!("Rejected transaction {}: {err}", tx.id))?;

        for output in tx.shielded_outputs() {
            shielded.insert_commitment(&output.commitment)?;
        }

        info!(
            "Accepted transaction {} ({} inputs, {} outputs{})",
            tx.id,
            tx.inputs.len(),
            tx.outputs.len(),
            if tx.pour.is_some() { ", pour" } else { "" }
        );
        Ok(tx)
    }

    fn check_transaction(
        &self,
        shielded: &ShieldedState,
        tx: &Transaction,
        coinbase: bool,
    ) -> Result<(), LedgerError> {
        let id = &tx.id;

        // Required fields
        if id.is_empty() {
            return Err(missing(id, "id"));
        }
        let Some(signatures) = &tx.signatures else {
            return Err(missing(id, "signatures"));
        };

        // Id
        let expected = tx.compute_id().map_err(|err| ValidationError::Malformed {
            id: id.clone(),
            reason: err.to_string(),
        })?;
        if expected != *id {
            return Err(ValidationError::InvalidId {
                id: id.clone(),
                expected,
            }
            .into());
        }

        // Inputs exist and are unspent
        let mut input_total = 0u64;
        let mut seen = HashSet::new();
        for address in &tx.inputs {
            if !seen.insert(address) {
                return Err(ValidationError::DuplicateInput {
                    id: id.clone(),
                    address: address.clone(),
                }
                .into());
            }
            let utxo = self.unspent_input(id, address)?;
            input_total = checked_add(id, input_total, utxo.amount)?;
        }

        // Outputs are fresh
        let mut output_total = 0u64;
        let mut seen_addresses = HashSet::new();
        let mut seen_commitments = HashSet::new();
        for output in &tx.outputs {
            match output {
                Output::Transparent(output) => {
                    if !seen_addresses.insert(&output.address)
                        || self.store.get_utxo(&output.address)?.is_some()
                    {
                        return Err(ValidationError::DuplicateOutput {
                            id: id.clone(),
                            address: output.address.clone(),
                        }
                        .into());
                    }
                    output_total = checked_add(id, output_total, output.amount)?;
                }
                Output::Shielded(output) => {
                    if !output.payload.opens() || output.payload.commitment() != output.commitment
                    {
                        return Err(ValidationError::InvalidPayload {
                            id: id.clone(),
                            commitment: output.commitment,
                        }
                        .into());
                    }
                    if shielded.contains(&output.commitment)
                        || !seen_commitments.insert(output.commitment)
                    {
                        return Err(ValidationError::DuplicateCommitment {
                            id: id.clone(),
                            commitment: output.commitment,
                        }
                        .into());
                    }
                    // A mint pays for its coin; a pour's value is proven instead
                    if tx.pour.is_none() {
                        output_total = checked_add(id, output_total, output.payload.value)?;
                    }
                }
            }
        }
        let new_leaves = seen_commitments.len() as u64;
        if shielded.commitment_count().saturating_add(new_leaves) > NoteCommitmentTree::CAPACITY {
            return Err(ValidationError::TreeFull { id: id.clone() }.into());
        }

        if let Some(pour) = &tx.pour {
            self.check_pour(shielded, tx, signatures.len(), pour)?;
        }

        // Balance
        if !coinbase && input_total < output_total {
            return Err(ValidationError::Imbalance {
                id: id.clone(),
                inputs: input_total,
                outputs: output_total,
            }
            .into());
        }

        // Signatures
        if signatures.len() != tx.inputs.len() {
            return Err(ValidationError::SignatureCount {
                id: id.clone(),
                signatures: signatures.len(),
                inputs: tx.inputs.len(),
            }
            .into());
        }

        let digest = tx.signing_digest().map_err(|err| ValidationError::Malformed {
            id: id.clone(),
            reason: err.to_string(),
        })?;
        for (address, signature) in tx.inputs.iter().zip(signatures) {
            if !matches!(verify(&digest, address, signature), Ok(true)) {
                return Err(ValidationError::InvalidSignature {
                    id: id.clone(),
                    address: address.clone(),
                }
                .into());
            }
        }

        Ok(())
    }

    fn unspent_input(&self, id: &Hash, address: &Address) -> Result<Utxo, LedgerError> {
        let Some(utxo) = self.store.get_utxo(address)? else {
            return Err(ValidationError::UnknownInput {
                id: id.clone(),
                address: address.clone(),
            }
            .into());
        };
        if utxo.is_spent() {
            return Err(ValidationError::SpentInput {
                id: id.clone(),
                address: address.clone(),
            }
            .into());
        }
        Ok(utxo)
    }

    fn check_pour(
        &self,
        shielded: &ShieldedState,
        tx: &Transaction,
        signature_count: usize,
        pour: &PourDescription,
    ) -> Result<(), LedgerError> {
        let malformed = |reason| ValidationError::MalformedPour {
            id: tx.id.clone(),
            reason,
        };

        if !tx.inputs.is_empty() {
            return Err(malformed("pours take no transparent inputs").into());
        }
        if signature_count != 0 {
            return Err(malformed("pours carry no signatures").into());
        }
        let outputs: Vec<_> = tx.shielded_outputs().collect();
        if outputs.len() != POUR_OUTPUTS || tx.transparent_outputs().next().is_some() {
            return Err(malformed("pours create exactly two shielded outputs").into());
        }
        if pour.outputs.len() != POUR_OUTPUTS {
            return Err(malformed("pours publish exactly two output coins").into());
        }
        let matches = outputs.iter().zip(&pour.outputs).all(|(output, public)| {
            public.cm == output.payload.cm && public.value == output.payload.value
        });
        if !matches {
            return Err(ValidationError::PourOutputMismatch { id: tx.id.clone() }.into());
        }

        // The nullifier set is keyed on bytes, so only one encoding may exist
        if !pour.nullifier.is_canonical() {
            return Err(malformed("nullifier is not a canonical field element").into());
        }
        if !shielded.is_valid_root(&pour.root) {
            return Err(ValidationError::UnknownRoot { id: tx.id.clone() }.into());
        }
        if self.store.nullifier_exists(&pour.nullifier)? {
            return Err(ValidationError::NullifierSpent {
                id: tx.id.clone(),
                nullifier: pour.nullifier,
            }
            .into());
        }

        let public = PourPublicInputs::new(pour.root, pour.nullifier, &pour.outputs)?;
        if !self.prover.verify_proof(&public, &pour.proof)? {
            return Err(ProofError::Rejected.into());
        }
        Ok(())
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Verifies a mined block and, in one store write, records its coinbase,
    /// the block, and the confirmation of every pool transaction.
    pub fn add_block(
        &self,
        block: &Block,
        coinbase: &Transaction,
        pool: &[Hash],
    ) -> Result<(), LedgerError> {
        let shielded = self.shielded();

        self.check_block(&shielded, block, coinbase, pool)
            .and_then(|()| {
                self.store
                    .apply_block(block, coinbase, pool)
                    .map_err(|err| LedgerError::from_store(err, &coinbase.id))
            })
            .inspect_err(|err| warn!("Rejected block {}: {err}", block.id))?;

        info!(
            "Accepted block {} confirming {} transactions",
            block.id,
            pool.len()
        );
        Ok(())
    }

    fn check_block(
        &self,
        shielded: &ShieldedState,
        block: &Block,
        coinbase: &Transaction,
        pool: &[Hash],
    ) -> Result<(), LedgerError> {
        // Coinbase amount
        let amount = coinbase_amount(coinbase)?;
        if amount != self.params.reward {
            return Err(ValidationError::CoinbaseAmount {
                id: coinbase.id.clone(),
                amount,
                expected: self.params.reward,
            }
            .into());
        }

        // Pool transactions exist and are pending
        let mut seen = HashSet::new();
        for id in pool {
            match self.store.get_transaction(id)? {
                None => {
                    return Err(ValidationError::UnknownPoolTransaction { id: id.clone() }.into());
                }
                Some(tx) if tx.is_confirmed() || !seen.insert(id) => {
                    return Err(
                        ValidationError::PoolTransactionConfirmed { id: id.clone() }.into(),
                    );
                }
                Some(_) => {}
            }
        }

        // Capacity, coinbase included
        if pool.len() >= self.params.limit {
            return Err(ValidationError::PoolOverLimit {
                count: pool.len(),
                limit: self.params.limit,
            }
            .into());
        }

        // Chain linkage
        match &block.previous {
            None => {
                if !self
                    .store
                    .get_blocks(0, 1, SortDirection::Descending)?
                    .is_empty()
                {
                    return Err(ValidationError::GenesisExists {
                        id: block.id.clone(),
                    }
                    .into());
                }
            }
            Some(previous) => {
                if self.store.get_block(previous)?.is_none() {
                    return Err(ValidationError::UnknownPrevious {
                        id: block.id.clone(),
                        previous: previous.clone(),
                    }
                    .into());
                }
            }
        }

        // Required fields
        for (field, value) in [("id", &block.id), ("root", &block.root), ("nonce", &block.nonce)] {
            if value.is_empty() {
                return Err(ValidationError::MissingBlockField {
                    id: block.id.clone(),
                    field,
                }
                .into());
            }
        }

        // Merkle root over [coinbase, pool...]
        let mut ids = Vec::with_capacity(pool.len() + 1);
        ids.push(coinbase.id.clone());
        ids.extend_from_slice(pool);
        let expected = merkle_root(&ids);
        if expected != block.root {
            return Err(ValidationError::MerkleRootMismatch {
                root: block.root.clone(),
                expected,
            }
            .into());
        }

        // Block id
        let expected = block
            .compute_id()
            .map_err(|err| ValidationError::MalformedBlock {
                id: block.id.clone(),
                reason: err.to_string(),
            })?;
        if expected != block.id {
            return Err(ValidationError::InvalidBlockId {
                id: block.id.clone(),
                expected,
            }
            .into());
        }

        // Proof of work
        if !meets_difficulty(&block.id, self.params.difficulty) {
            return Err(ValidationError::InsufficientWork {
                id: block.id.clone(),
                difficulty: self.params.difficulty,
            }
            .into());
        }

        self.check_transaction(shielded, coinbase, true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get_blocks(
        &self,
        page: usize,
        limit: usize,
        sort: SortDirection,
    ) -> Result<Vec<Block>, LedgerError> {
        Ok(self.store.get_blocks(page, limit, sort)?)
    }

    pub fn get_block(&self, id: &Hash) -> Result<Option<Block>, LedgerError> {
        Ok(self.store.get_block(id)?)
    }

    pub fn get_transactions(
        &self,
        page: usize,
        limit: usize,
        sort: SortDirection,
        unconfirmed_only: bool,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .store
            .get_transactions(page, limit, sort, unconfirmed_only)?)
    }

    pub fn get_transaction(&self, id: &Hash) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.store.get_transaction(id)?)
    }

    pub fn get_utxo(&self, address: &Address) -> Result<Option<Utxo>, LedgerError> {
        Ok(self.store.get_utxo(address)?)
    }

    pub fn note_tree_root(&self) -> Fr {
        self.shielded().root()
    }

    pub fn is_known_root(&self, root: &Fr) -> bool {
        self.shielded().is_valid_root(root)
    }

    pub fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, LedgerError> {
        Ok(self.store.nullifier_exists(nullifier)?)
    }

    /// Erases the ledger and resets the note tree.
    pub fn destroy(&self) -> Result<(), LedgerError> {
        let mut shielded = self.shielded();
        self.store.destroy()?;
        *shielded = ShieldedState::new(self.params.root_history);
        info!("Ledger destroyed");
        Ok(())
    }
}

fn missing(id: &Hash, field: &'static str) -> LedgerError {
    ValidationError::MissingField {
        id: id.clone(),
        field,
    }
    .into()
}

fn checked_add(id: &Hash, total: u64, amount: u64) -> Result<u64, LedgerError> {
    total
        .checked_add(amount)
        .ok_or_else(|| ValidationError::AmountOverflow { id: id.clone() }.into())
}

/// The single transparent output a coinbase must carry.
fn coinbase_amount(coinbase: &Transaction) -> Result<u64, LedgerError> {
    let invalid = |reason| -> LedgerError {
        ValidationError::InvalidCoinbase {
            id: coinbase.id.clone(),
            reason,
        }
        .into()
    };
    if !coinbase.inputs.is_empty() || coinbase.pour.is_some() {
        return Err(invalid("a coinbase spends nothing"));
    }
    match coinbase.outputs.as_slice() {
        [Output::Transparent(output)] => Ok(output.amount),
        _ => Err(invalid("a coinbase has exactly one transparent output")),
    }
}

/// Null and field-presence checks on a raw document, then decoding.
pub fn parse_transaction(raw: &Value) -> Result<Transaction, ValidationError> {
    if raw.is_null() {
        return Err(ValidationError::NullTransaction);
    }
    let id = Hash::from(raw.get("id").and_then(Value::as_str).unwrap_or_default());
    for field in REQUIRED_FIELDS {
        if raw.get(field).is_none_or(Value::is_null) {
            return Err(ValidationError::MissingField { id, field });
        }
    }
    serde_json::from_value(raw.clone()).map_err(|err| ValidationError::Malformed {
        id,
        reason: err.to_string(),
    })
}
