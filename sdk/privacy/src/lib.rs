//! Dotcoin Privacy SDK
//!
//! Commitment-based shielded coins in the style of Zerocash "pour".
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Pour Transaction                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  Nullifier   │  │ Commitments  │  │   Coin payloads       │ │
//! │  │  (spent)     │  │  (new coins) │  │   (for recipient)     │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              ZK Proof (Groth16 over BN254)               │   │
//! │  │  • Old commitment is a leaf under a known root           │   │
//! │  │  • Spender owns the old coin                             │   │
//! │  │  • Value conservation: v_old = v_1 + v_2                 │   │
//! │  │  • New commitments are well formed                       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All values live in the BN254 scalar field so the same hashes can be
//! evaluated natively and inside the pour circuit.

pub mod commitment;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod poseidon;

pub use ark_bn254::Fr;
pub use commitment::{Commitment, bind, commit};
pub use merkle::{MembershipProof, NoteCommitmentTree, RootHistory, TREE_DEPTH};
pub use note::{
    CoinPayload, PublicCoin, ShieldedCoin, ShieldedKeyBundle, SpendingKey, create_shielded_coin,
};
pub use nullifier::Nullifier;
pub use poseidon::{
    fr_from_bytes, fr_from_canonical_bytes, fr_to_bytes, poseidon_config, poseidon_hash,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivacyError {
    #[error("note commitment tree is full ({0} leaves)")]
    TreeFull(u64),
    #[error("commitment {0} is not in the note commitment tree")]
    CommitmentNotFound(Commitment),
    #[error("commitment {0} is already in the note commitment tree")]
    DuplicateCommitment(Commitment),
}
