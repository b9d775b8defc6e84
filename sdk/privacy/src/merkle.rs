//! Note Commitment Tree
//!
//! An append-only, fixed-depth sparse Merkle tree over coin commitments.
//! Leaves fill left to right; unfilled leaves are the zero element.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2    0   (Coin Commitments, zero padding)
//! ```

use ark_bn254::Fr;
use ark_ff::Zero;
use std::collections::{HashMap, VecDeque};

use crate::PrivacyError;
use crate::commitment::Commitment;
use crate::poseidon::poseidon_hash;

/// Tree depth (supports 2^20 coins)
pub const TREE_DEPTH: usize = 20;

/// Parent node hash.
pub fn hash_pair(left: Fr, right: Fr) -> Fr {
    poseidon_hash(&[left, right])
}

/// A Merkle path proving inclusion of a coin commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipProof {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Fr>,
    /// Position bits, leaf first (false = current node is the left child)
    pub path_indices: Vec<bool>,
    /// The leaf position
    pub position: u64,
    /// The root this path was taken against
    pub root: Fr,
}

impl MembershipProof {
    /// Folds `leaf` up the path.
    pub fn compute_root(&self, leaf: Fr) -> Fr {
        self.siblings
            .iter()
            .zip(&self.path_indices)
            .fold(leaf, |current, (sibling, is_right)| {
                if *is_right {
                    hash_pair(*sibling, current)
                } else {
                    hash_pair(current, *sibling)
                }
            })
    }

    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self, leaf: Fr, root: Fr) -> bool {
        self.siblings.len() == TREE_DEPTH
            && self.path_indices.len() == TREE_DEPTH
            && self.compute_root(leaf) == root
    }
}

/// Sparse Merkle Tree for coin commitments
///
/// Only stores non-empty nodes.
#[derive(Debug, Clone)]
pub struct NoteCommitmentTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Fr>,
    /// Leaf position of every inserted commitment
    positions: HashMap<Commitment, u64>,
    /// Roots of all-zero subtrees, per level
    empty_roots: Vec<Fr>,
    /// Next available leaf position
    next_index: u64,
    root: Fr,
}

impl NoteCommitmentTree {
    pub const CAPACITY: u64 = 1 << TREE_DEPTH;

    pub fn new() -> Self {
        let mut empty_roots = Vec::with_capacity(TREE_DEPTH + 1);
        let mut current = Fr::zero();
        empty_roots.push(current);
        for _ in 0..TREE_DEPTH {
            current = hash_pair(current, current);
            empty_roots.push(current);
        }

        Self {
            nodes: HashMap::new(),
            positions: HashMap::new(),
            root: current,
            empty_roots,
            next_index: 0,
        }
    }

    /// Rebuilds a tree from commitments in insertion order.
    pub fn from_commitments<'a>(
        commitments: impl IntoIterator<Item = &'a Commitment>,
    ) -> Result<Self, PrivacyError> {
        let mut tree = Self::new();
        for commitment in commitments {
            tree.insert(commitment)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn empty_root(&self, level: usize) -> Fr {
        self.empty_roots[level]
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.positions.contains_key(commitment)
    }

    pub fn position(&self, commitment: &Commitment) -> Option<u64> {
        self.positions.get(commitment).copied()
    }

    /// Appends a commitment and returns its leaf position.
    pub fn insert(&mut self, commitment: &Commitment) -> Result<u64, PrivacyError> {
        if self.next_index >= Self::CAPACITY {
            return Err(PrivacyError::TreeFull(Self::CAPACITY));
        }
        if self.contains(commitment) {
            return Err(PrivacyError::DuplicateCommitment(*commitment));
        }

        let position = self.next_index;
        let mut current_index = position;
        let mut current_hash = commitment.to_field();
        self.nodes.insert((0, position), current_hash);

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            let sibling = self.node(level, current_index ^ 1);

            current_hash = if is_right {
                hash_pair(sibling, current_hash)
            } else {
                hash_pair(current_hash, sibling)
            };
            current_index >>= 1;
            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
        self.positions.insert(*commitment, position);
        self.next_index += 1;
        Ok(position)
    }

    /// Authentication path for the leaf holding `commitment`, against the
    /// current root.
    pub fn prove_membership(&self, commitment: &Commitment) -> Result<MembershipProof, PrivacyError> {
        let position = self
            .position(commitment)
            .ok_or(PrivacyError::CommitmentNotFound(*commitment))?;

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut path_indices = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = position;

        for level in 0..TREE_DEPTH {
            path_indices.push(current_index & 1 == 1);
            siblings.push(self.node(level, current_index ^ 1));
            current_index >>= 1;
        }

        Ok(MembershipProof {
            siblings,
            path_indices,
            position,
            root: self.root,
        })
    }

    fn node(&self, level: usize, index: u64) -> Fr {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.empty_roots[level])
    }
}

impl Default for NoteCommitmentTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Recent tree roots
///
/// Pours may reference a slightly stale root: the tree keeps growing
/// between proof construction and admission.
#[derive(Debug, Clone)]
pub struct RootHistory {
    /// Most recent last
    roots: VecDeque<Fr>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size.max(1)),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, root: Fr) {
        self.roots.push_back(root);
        while self.roots.len() > self.max_size {
            self.roots.pop_front();
        }
    }

    pub fn is_valid(&self, root: &Fr) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<&Fr> {
        self.roots.back()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
