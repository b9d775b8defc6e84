//! The pour relation.
//!
//! Private: `ask`, the old coin opening and its Merkle path, the openings of
//! the two new coins. Public: see [`crate::inputs`].
//!
//! Constraints:
//! 1. `apk_old = Poseidon(ADDR, ask)`
//! 2. `cm_old = Commit(v_old, Bind(apk_old, rho_old, r_old), s_old)`
//! 3. `cm_old` is a leaf under `root`
//! 4. `nullifier = Poseidon(NULL, ask, rho_old)`
//! 5. each new `cm_i = Commit(v_i, Bind(apk_i, rho_i, r_i), s_i)`
//! 6. `v_1 + v_2 = v_old`

use ark_bn254::Fr;
use ark_ff::Zero;
use ark_r1cs_std::{
    alloc::AllocVar,
    eq::EqGadget,
    fields::{FieldVar, fp::FpVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use dotcoin_privacy::{
    MembershipProof, Nullifier, ShieldedCoin, SpendingKey, TREE_DEPTH,
    note::PUBLIC_KEY_DOMAIN, nullifier::NULLIFIER_DOMAIN,
};

use crate::circuit::gadgets::{merkle_root_var, poseidon_var};
use crate::error::ProofError;
use crate::inputs::{OldCoinOpening, POUR_OUTPUTS, PourPublicInputs};

#[derive(Clone)]
pub struct PourCircuit {
    ask: Fr,
    old_coin: ShieldedCoin,
    path: MembershipProof,
    new_coins: [ShieldedCoin; POUR_OUTPUTS],
    public: PourPublicInputs,
}

impl PourCircuit {
    /// Checks the witness natively before anything is proved, so a bad
    /// pour fails fast with a reason instead of an unsatisfied system.
    pub fn new(
        spending_key: &SpendingKey,
        old: &OldCoinOpening,
        new_coins: [ShieldedCoin; POUR_OUTPUTS],
    ) -> Result<Self, ProofError> {
        let coin = &old.coin;
        if spending_key.public_key() != coin.apk {
            return Err(ProofError::MalformedWitness(
                "spending key does not own the coin",
            ));
        }
        if !coin.is_well_formed() {
            return Err(ProofError::MalformedWitness(
                "old coin does not open its commitment",
            ));
        }
        if !old.membership.verify(coin.cm, old.membership.root) {
            return Err(ProofError::MalformedWitness(
                "membership path does not reach the root",
            ));
        }
        if new_coins.iter().any(|c| !c.is_well_formed()) {
            return Err(ProofError::MalformedWitness(
                "new coin does not open its commitment",
            ));
        }
        let total = new_coins
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(c.value));
        if total != Some(coin.value) {
            return Err(ProofError::MalformedWitness(
                "new coin values do not sum to the old value",
            ));
        }

        let public = PourPublicInputs {
            root: old.membership.root,
            nullifier: spending_key.nullifier(coin),
            outputs: [new_coins[0].public_part(), new_coins[1].public_part()],
        };

        Ok(Self {
            ask: spending_key.secret(),
            old_coin: coin.clone(),
            path: old.membership.clone(),
            new_coins,
            public,
        })
    }

    /// All-zero witness with the right shape, for key generation.
    pub fn blank() -> Self {
        let coin = ShieldedCoin {
            apk: Fr::zero(),
            value: 0,
            rho: Fr::zero(),
            r: Fr::zero(),
            s: Fr::zero(),
            cm: Fr::zero(),
        };
        Self {
            ask: Fr::zero(),
            old_coin: coin.clone(),
            path: MembershipProof {
                siblings: vec![Fr::zero(); TREE_DEPTH],
                path_indices: vec![false; TREE_DEPTH],
                position: 0,
                root: Fr::zero(),
            },
            new_coins: [coin.clone(), coin.clone()],
            public: PourPublicInputs {
                root: Fr::zero(),
                nullifier: Nullifier::from_field(Fr::zero()),
                outputs: [coin.public_part(), coin.public_part()],
            },
        }
    }

    pub fn public_inputs(&self) -> &PourPublicInputs {
        &self.public
    }
}

fn commitment_var(
    cs: ConstraintSystemRef<Fr>,
    apk: &FpVar<Fr>,
    value: &FpVar<Fr>,
    rho: &FpVar<Fr>,
    r: &FpVar<Fr>,
    s: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let k = poseidon_var(cs.clone(), &[apk, rho, r])?;
    poseidon_var(cs, &[value, &k, s])
}

impl ConstraintSynthesizer<Fr> for PourCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        if self.path.siblings.len() != TREE_DEPTH || self.path.path_indices.len() != TREE_DEPTH {
            return Err(SynthesisError::Unsatisfiable);
        }

        // Public inputs, in the order `PourPublicInputs::to_field_elements` uses
        let root = FpVar::new_input(cs.clone(), || Ok(self.public.root))?;
        let nullifier = FpVar::new_input(cs.clone(), || Ok(self.public.nullifier.to_field()))?;
        let mut outputs = Vec::with_capacity(POUR_OUTPUTS);
        for coin in &self.public.outputs {
            let apk = FpVar::new_input(cs.clone(), || Ok(coin.apk))?;
            let value = FpVar::new_input(cs.clone(), || Ok(Fr::from(coin.value)))?;
            let rho = FpVar::new_input(cs.clone(), || Ok(coin.rho))?;
            let cm = FpVar::new_input(cs.clone(), || Ok(coin.cm))?;
            outputs.push((apk, value, rho, cm));
        }

        // Old coin
        let ask = FpVar::new_witness(cs.clone(), || Ok(self.ask))?;
        let old_value = FpVar::new_witness(cs.clone(), || Ok(Fr::from(self.old_coin.value)))?;
        let old_rho = FpVar::new_witness(cs.clone(), || Ok(self.old_coin.rho))?;
        let old_r = FpVar::new_witness(cs.clone(), || Ok(self.old_coin.r))?;
        let old_s = FpVar::new_witness(cs.clone(), || Ok(self.old_coin.s))?;

        let addr_domain = FpVar::constant(Fr::from(PUBLIC_KEY_DOMAIN));
        let old_apk = poseidon_var(cs.clone(), &[&addr_domain, &ask])?;
        let old_cm = commitment_var(cs.clone(), &old_apk, &old_value, &old_rho, &old_r, &old_s)?;

        merkle_root_var(cs.clone(), &old_cm, &self.path)?.enforce_equal(&root)?;

        let null_domain = FpVar::constant(Fr::from(NULLIFIER_DOMAIN));
        poseidon_var(cs.clone(), &[&null_domain, &ask, &old_rho])?.enforce_equal(&nullifier)?;

        // New coins
        let mut total = FpVar::zero();
        for ((apk, value, rho, cm), coin) in outputs.iter().zip(&self.new_coins) {
            let r = FpVar::new_witness(cs.clone(), || Ok(coin.r))?;
            let s = FpVar::new_witness(cs.clone(), || Ok(coin.s))?;
            commitment_var(cs.clone(), apk, value, rho, &r, &s)?.enforce_equal(cm)?;
            total += value;
        }

        total.enforce_equal(&old_value)?;
        Ok(())
    }
}
