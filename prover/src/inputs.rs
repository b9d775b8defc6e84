//! Prover inputs and outputs.
//!
//! Public input order, fixed by the circuit:
//!
//! ```text
//! root, nullifier, (apk, value, rho, cm) for new coin 1, then new coin 2
//! ```

use ark_bn254::Fr;
use dotcoin_privacy::{MembershipProof, Nullifier, PublicCoin, ShieldedCoin};

use crate::error::ProofError;

/// Every pour consumes one coin and creates exactly two.
pub const POUR_OUTPUTS: usize = 2;

/// Number of field elements in the public input vector.
pub const NUM_PUBLIC_INPUTS: usize = 2 + 4 * POUR_OUTPUTS;

/// What the verifier sees of a pour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PourPublicInputs {
    pub root: Fr,
    pub nullifier: Nullifier,
    pub outputs: [PublicCoin; POUR_OUTPUTS],
}

impl PourPublicInputs {
    /// Builds the inputs from a transaction's pour signals.
    pub fn new(root: Fr, nullifier: Nullifier, outputs: &[PublicCoin]) -> Result<Self, ProofError> {
        let outputs: [PublicCoin; POUR_OUTPUTS] = outputs
            .try_into()
            .map_err(|_| ProofError::OutputCount(outputs.len()))?;
        Ok(Self {
            root,
            nullifier,
            outputs,
        })
    }

    pub fn to_field_elements(&self) -> Vec<Fr> {
        let mut elements = Vec::with_capacity(NUM_PUBLIC_INPUTS);
        elements.push(self.root);
        elements.push(self.nullifier.to_field());
        for coin in &self.outputs {
            elements.push(coin.apk);
            elements.push(Fr::from(coin.value));
            elements.push(coin.rho);
            elements.push(coin.cm);
        }
        elements
    }

    /// Stable byte encoding, used to bind mock proofs.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_field_elements()
            .iter()
            .flat_map(dotcoin_privacy::fr_to_bytes)
            .collect()
    }
}

/// The coin being spent together with its path in the note tree.
#[derive(Debug, Clone)]
pub struct OldCoinOpening {
    pub coin: ShieldedCoin,
    pub membership: MembershipProof,
}

/// A proof and the public inputs it was produced for.
#[derive(Debug, Clone)]
pub struct PourProof {
    /// Compressed proof bytes
    pub proof: Vec<u8>,
    pub public: PourPublicInputs,
}
