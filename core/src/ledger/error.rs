use thiserror::Error;

use dotcoin_hash::Hash;
use dotcoin_privacy::{Commitment, Nullifier, PrivacyError};
use dotcoin_prover::ProofError;
use dotcoin_pubkey::Address;

use crate::storage::Conflict;

/// A ledger rule was violated. One variant per rule, each naming the
/// offending transaction or block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    // Transactions
    #[error("transaction parameters input is null")]
    NullTransaction,
    #[error("transaction {id} has an empty {field} field")]
    MissingField { id: Hash, field: &'static str },
    #[error("transaction {id} is malformed: {reason}")]
    Malformed { id: Hash, reason: String },
    #[error("transaction id {id} is invalid, expected {expected}")]
    InvalidId { id: Hash, expected: Hash },
    #[error("transaction {id} already exists")]
    DuplicateTransaction { id: Hash },
    #[error("transaction {id} spends a utxo {address} that does not exist")]
    UnknownInput { id: Hash, address: Address },
    #[error("transaction {id} spends a utxo {address} that is already spent")]
    SpentInput { id: Hash, address: Address },
    #[error("transaction {id} spends utxo {address} twice")]
    DuplicateInput { id: Hash, address: Address },
    #[error("transaction {id} outputs a utxo {address} that is already used")]
    DuplicateOutput { id: Hash, address: Address },
    #[error("transaction {id} amounts overflow")]
    AmountOverflow { id: Hash },
    #[error("transaction {id} shielded output {commitment} does not open its commitment")]
    InvalidPayload { id: Hash, commitment: Commitment },
    #[error("transaction {id} outputs commitment {commitment} that is already in the note tree")]
    DuplicateCommitment { id: Hash, commitment: Commitment },
    #[error("transaction {id} would overflow the note commitment tree")]
    TreeFull { id: Hash },
    #[error("pour {id} is malformed: {reason}")]
    MalformedPour { id: Hash, reason: &'static str },
    #[error("pour {id} public outputs do not match its shielded outputs")]
    PourOutputMismatch { id: Hash },
    #[error("pour {id} references an unknown note tree root")]
    UnknownRoot { id: Hash },
    #[error("pour {id} reveals nullifier {nullifier} that is already spent")]
    NullifierSpent { id: Hash, nullifier: Nullifier },
    #[error("transaction {id} has an input and output imbalance ({inputs} < {outputs})")]
    Imbalance { id: Hash, inputs: u64, outputs: u64 },
    #[error("transaction {id} has {signatures} signatures for {inputs} inputs")]
    SignatureCount {
        id: Hash,
        signatures: usize,
        inputs: usize,
    },
    #[error("transaction {id} signature is invalid for utxo {address}")]
    InvalidSignature { id: Hash, address: Address },

    // Blocks
    #[error("coinbase transaction {id} is malformed: {reason}")]
    InvalidCoinbase { id: Hash, reason: &'static str },
    #[error("coinbase transaction {id} has an invalid amount {amount}, expected {expected}")]
    CoinbaseAmount { id: Hash, amount: u64, expected: u64 },
    #[error("transaction list has a transaction {id} that does not exist")]
    UnknownPoolTransaction { id: Hash },
    #[error("transaction list has a transaction {id} that is already confirmed")]
    PoolTransactionConfirmed { id: Hash },
    #[error("transaction list has {count} transactions, limit is {limit}")]
    PoolOverLimit { count: usize, limit: usize },
    #[error("block {id} claims genesis but a genesis block already exists")]
    GenesisExists { id: Hash },
    #[error("block {id} has an invalid previous {previous}")]
    UnknownPrevious { id: Hash, previous: Hash },
    #[error("block {id} has an empty {field} field")]
    MissingBlockField { id: Hash, field: &'static str },
    #[error("block {id} is malformed: {reason}")]
    MalformedBlock { id: Hash, reason: String },
    #[error("block root {root} does not match computed merkle root {expected}")]
    MerkleRootMismatch { root: Hash, expected: Hash },
    #[error("block id {id} does not match computed hash {expected}")]
    InvalidBlockId { id: Hash, expected: Hash },
    #[error("block id {id} does not match difficulty {difficulty}")]
    InsufficientWork { id: Hash, difficulty: usize },
    #[error("block {id} already exists")]
    DuplicateBlock { id: Hash },
}

/// Everything admission can fail with. The three kinds never mix: a rule
/// violation, a proof-system failure, or the store itself failing.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("proof check failed: {0}")]
    Proof(#[from] ProofError),
    #[error("note tree: {0}")]
    Privacy(#[from] PrivacyError),
    #[error("ledger store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl LedgerError {
    /// Maps a store write failure. Conflicts (the store's commit-time
    /// re-checks) become the matching rule violation for `id`.
    pub fn from_store(err: anyhow::Error, id: &Hash) -> Self {
        let id = id.clone();
        let violation = match err.downcast_ref::<Conflict>() {
            Some(Conflict::DuplicateTransaction(_)) => ValidationError::DuplicateTransaction { id },
            Some(Conflict::MissingTransaction(tx)) => {
                ValidationError::UnknownPoolTransaction { id: tx.clone() }
            }
            Some(Conflict::AlreadyConfirmed(tx)) => {
                ValidationError::PoolTransactionConfirmed { id: tx.clone() }
            }
            Some(Conflict::MissingUtxo(address)) => ValidationError::UnknownInput {
                id,
                address: address.clone(),
            },
            Some(Conflict::SpentUtxo(address)) => ValidationError::SpentInput {
                id,
                address: address.clone(),
            },
            Some(Conflict::DuplicateUtxo(address)) => ValidationError::DuplicateOutput {
                id,
                address: address.clone(),
            },
            Some(Conflict::NullifierSpent(nullifier)) => ValidationError::NullifierSpent {
                id,
                nullifier: *nullifier,
            },
            Some(Conflict::DuplicateCommitment(commitment)) => {
                ValidationError::DuplicateCommitment {
                    id,
                    commitment: *commitment,
                }
            }
            Some(Conflict::DuplicateBlock(block)) => {
                ValidationError::DuplicateBlock { id: block.clone() }
            }
            None => return Self::Store(err),
        };
        Self::Validation(violation)
    }

    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}
