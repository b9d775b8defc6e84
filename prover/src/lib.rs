//! Dotcoin Pour Prover
//!
//! Groth16 (BN254) proofs for shielded pours. A pour spends one committed
//! coin and creates two, revealing only the nullifier of the old coin, the
//! note tree root it was proven against and the public signals of the new
//! coins.
//!
//! ## Usage
//!
//! ```ignore
//! let service = Groth16ProofService::setup(&mut rng)?;
//! let proof = service.build_proof(&spending_key, &old_coin, [payment, change])?;
//! assert!(service.verify_proof(&proof.public, &proof.proof)?);
//! ```

pub mod circuit;
pub mod error;
pub mod inputs;
pub mod service;

pub use circuit::PourCircuit;
pub use error::ProofError;
pub use inputs::{NUM_PUBLIC_INPUTS, OldCoinOpening, POUR_OUTPUTS, PourProof, PourPublicInputs};
#[cfg(any(test, feature = "mock-prover"))]
pub use service::MockProofService;
pub use service::{Groth16ProofService, ProofService};
