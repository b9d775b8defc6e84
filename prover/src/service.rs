//! Proof services.
//!
//! [`ProofService`] is the seam the ledger and the wallet share: the wallet
//! builds pour proofs through it, the validator checks them through it.

use std::fs;
use std::path::Path;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use dotcoin_privacy::{ShieldedCoin, SpendingKey};
use rand::rngs::OsRng;

use crate::circuit::PourCircuit;
use crate::error::ProofError;
use crate::inputs::{OldCoinOpening, POUR_OUTPUTS, PourProof, PourPublicInputs};

pub trait ProofService: Send + Sync {
    /// Proves that `new_coins` are a valid pour of `old`.
    fn build_proof(
        &self,
        spending_key: &SpendingKey,
        old: &OldCoinOpening,
        new_coins: [ShieldedCoin; POUR_OUTPUTS],
    ) -> Result<PourProof, ProofError>;

    /// `Ok(true)` only for a proof that verifies against `public`.
    fn verify_proof(&self, public: &PourPublicInputs, proof: &[u8]) -> Result<bool, ProofError>;
}

/// Groth16 over BN254 with circuit-specific keys.
pub struct Groth16ProofService {
    proving_key: ProvingKey<Bn254>,
    verifying_key: VerifyingKey<Bn254>,
    prepared_vk: PreparedVerifyingKey<Bn254>,
}

impl Groth16ProofService {
    /// Runs a fresh circuit-specific setup.
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ProofError> {
        let (proving_key, verifying_key) =
            Groth16::<Bn254>::circuit_specific_setup(PourCircuit::blank(), rng)?;
        log::info!("Pour circuit setup complete");
        Self::from_keys(proving_key, verifying_key)
    }

    fn from_keys(
        proving_key: ProvingKey<Bn254>,
        verifying_key: VerifyingKey<Bn254>,
    ) -> Result<Self, ProofError> {
        let prepared_vk = Groth16::<Bn254>::process_vk(&verifying_key)?;
        Ok(Self {
            proving_key,
            verifying_key,
            prepared_vk,
        })
    }

    /// Load from compressed key bytes
    pub fn from_bytes(pk_bytes: &[u8], vk_bytes: &[u8]) -> Result<Self, ProofError> {
        let proving_key =
            ProvingKey::deserialize_compressed_unchecked(pk_bytes).map_err(ProofError::Keys)?;
        let verifying_key =
            VerifyingKey::deserialize_compressed(vk_bytes).map_err(ProofError::Keys)?;
        Self::from_keys(proving_key, verifying_key)
    }

    /// Load from key files written by `keygen`
    pub fn from_files(pk_path: impl AsRef<Path>, vk_path: impl AsRef<Path>) -> Result<Self, ProofError> {
        let pk_bytes = fs::read(pk_path.as_ref())?;
        let vk_bytes = fs::read(vk_path.as_ref())?;
        let service = Self::from_bytes(&pk_bytes, &vk_bytes)?;
        log::info!(
            "Loaded pour keys from {} (vk {})",
            pk_path.as_ref().display(),
            hex::encode(service.verifying_key_hash()?)
        );
        Ok(service)
    }

    /// Loads keys when both paths are given, otherwise runs a setup.
    pub fn load_or_setup(paths: Option<(&str, &str)>) -> Result<Self, ProofError> {
        match paths {
            Some((pk, vk)) => Self::from_files(pk, vk),
            None => {
                log::warn!("No pour keys configured, running an ephemeral setup");
                Self::setup(&mut OsRng)
            }
        }
    }

    pub fn proving_key_bytes(&self) -> Result<Vec<u8>, ProofError> {
        let mut bytes = Vec::new();
        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(ProofError::Keys)?;
        Ok(bytes)
    }

    pub fn verifying_key_bytes(&self) -> Result<Vec<u8>, ProofError> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(ProofError::Keys)?;
        Ok(bytes)
    }

    /// blake3 of the compressed verifying key.
    pub fn verifying_key_hash(&self) -> Result<[u8; 32], ProofError> {
        Ok(*blake3::hash(&self.verifying_key_bytes()?).as_bytes())
    }
}

impl ProofService for Groth16ProofService {
    fn build_proof(
        &self,
        spending_key: &SpendingKey,
        old: &OldCoinOpening,
        new_coins: [ShieldedCoin; POUR_OUTPUTS],
    ) -> Result<PourProof, ProofError> {
        let circuit = PourCircuit::new(spending_key, old, new_coins)?;
        let public = circuit.public_inputs().clone();

        let start = std::time::Instant::now();
        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, &mut OsRng)?;
        log::debug!("Pour proof generated in {:?}", start.elapsed());

        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .map_err(ProofError::MalformedProof)?;
        Ok(PourProof {
            proof: bytes,
            public,
        })
    }

    fn verify_proof(&self, public: &PourPublicInputs, proof: &[u8]) -> Result<bool, ProofError> {
        let proof = Proof::<Bn254>::deserialize_compressed(proof).map_err(ProofError::MalformedProof)?;
        let inputs: Vec<Fr> = public.to_field_elements();
        Ok(Groth16::<Bn254>::verify_with_processed_vk(
            &self.prepared_vk,
            &inputs,
            &proof,
        )?)
    }
}

/// Stand-in proofs: blake3 over the public inputs. The witness is still
/// checked natively, so malformed pours fail the same way they would with
/// Groth16.
#[cfg(any(test, feature = "mock-prover"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProofService;

#[cfg(any(test, feature = "mock-prover"))]
impl MockProofService {
    const DOMAIN: &'static [u8] = b"dotcoin-mock-pour";

    fn tag(public: &PourPublicInputs) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(Self::DOMAIN);
        hasher.update(&public.to_bytes());
        hasher.finalize().as_bytes().to_vec()
    }
}

#[cfg(any(test, feature = "mock-prover"))]
impl ProofService for MockProofService {
    fn build_proof(
        &self,
        spending_key: &SpendingKey,
        old: &OldCoinOpening,
        new_coins: [ShieldedCoin; POUR_OUTPUTS],
    ) -> Result<PourProof, ProofError> {
        let circuit = PourCircuit::new(spending_key, old, new_coins)?;
        let public = circuit.public_inputs().clone();
        Ok(PourProof {
            proof: Self::tag(&public),
            public,
        })
    }

    fn verify_proof(&self, public: &PourPublicInputs, proof: &[u8]) -> Result<bool, ProofError> {
        Ok(proof == Self::tag(public).as_slice())
    }
}
