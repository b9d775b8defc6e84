//! Dotcoin ledger core.
//!
//! ```text
//!   LedgerClient ──candidate tx──►  ConsensusValidator ──atomic write──► LedgerStore
//!   Miner ──────candidate block──►        │                          (RocksDB / memory)
//!                                         ▼
//!                                   ShieldedState (note tree + recent roots)
//! ```
//!
//! The validator is the only writer. The client and miner read the store
//! directly and hand their candidates to the validator.

pub mod client;
pub mod ledger;
pub mod miner;
pub mod prover;
pub mod storage;

pub use client::{Balance, ClientError, LedgerClient};
pub use ledger::{ConsensusValidator, LedgerError, ValidationError};
pub use miner::{MinedBlock, Miner, MinerError, MiningHandle, MiningService};
pub use prover::ProvingService;
pub use storage::{LedgerStore, MemoryStore, RocksDbStore, SortDirection};

#[cfg(test)]
mod tests;
