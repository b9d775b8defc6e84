//! Shielded pool state held by the validator.
//!
//! The note commitment tree and the window of recent roots pours may be
//! proven against. Rebuilt from the store's commitments at start-up; the
//! nullifier set itself lives in the store.

use anyhow::Result;
use log::info;

use dotcoin_privacy::{
    Commitment, Fr, MembershipProof, NoteCommitmentTree, PrivacyError, RootHistory,
};

use crate::storage::LedgerStore;

pub struct ShieldedState {
    tree: NoteCommitmentTree,
    root_history: RootHistory,
}

impl ShieldedState {
    /// Empty tree; its root is the first accepted root.
    pub fn new(history: usize) -> Self {
        let tree = NoteCommitmentTree::new();
        let mut root_history = RootHistory::new(history);
        root_history.push(tree.root());
        Self { tree, root_history }
    }

    /// Replays the store's commitments in insertion order.
    pub fn load(store: &dyn LedgerStore, history: usize) -> Result<Self> {
        let mut state = Self::new(history);
        for commitment in store.commitments()? {
            state.insert_commitment(&commitment)?;
        }

        info!(
            "Loaded shielded state: {} commitments, root window {}",
            state.tree.len(),
            state.root_history.len()
        );
        Ok(state)
    }

    /// Appends `commitment` and records the new root.
    pub fn insert_commitment(&mut self, commitment: &Commitment) -> Result<u64, PrivacyError> {
        let position = self.tree.insert(commitment)?;
        self.root_history.push(self.tree.root());
        Ok(position)
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.tree.contains(commitment)
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    /// Current or recent root.
    pub fn is_valid_root(&self, root: &Fr) -> bool {
        self.root_history.is_valid(root)
    }

    pub fn commitment_count(&self) -> u64 {
        self.tree.len()
    }

    pub fn prove_membership(
        &self,
        commitment: &Commitment,
    ) -> Result<MembershipProof, PrivacyError> {
        self.tree.prove_membership(commitment)
    }
}
