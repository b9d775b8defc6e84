use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar, poseidon::constraints::PoseidonSpongeVar,
};
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, fields::fp::FpVar, select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};
use dotcoin_privacy::{MembershipProof, poseidon_config};

/// In-circuit twin of `poseidon_hash`: one sponge, inputs absorbed in order,
/// one element squeezed.
pub fn poseidon_var(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[&FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, poseidon_config());
    for input in inputs {
        sponge.absorb(*input)?;
    }
    let mut out = sponge.squeeze_field_elements(1)?;
    out.pop().ok_or(SynthesisError::Unsatisfiable)
}

/// Folds `leaf` up a witnessed Merkle path and returns the root variable.
///
/// A `true` path bit means the current node is the right child.
pub fn merkle_root_var(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    path: &MembershipProof,
) -> Result<FpVar<Fr>, SynthesisError> {
    if path.siblings.len() != path.path_indices.len() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let mut current = leaf.clone();
    for (sibling, is_right) in path.siblings.iter().zip(&path.path_indices) {
        let sibling = FpVar::new_witness(cs.clone(), || Ok(*sibling))?;
        let is_right = Boolean::new_witness(cs.clone(), || Ok(*is_right))?;

        let left = FpVar::conditionally_select(&is_right, &sibling, &current)?;
        let right = FpVar::conditionally_select(&is_right, &current, &sibling)?;

        current = poseidon_var(cs.clone(), &[&left, &right])?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_r1cs_std::{R1CSVar, eq::EqGadget};
    use ark_relations::r1cs::ConstraintSystem;
    use dotcoin_privacy::{Commitment, NoteCommitmentTree, poseidon_hash};

    #[test]
    fn test_poseidon_var_matches_native() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let a = FpVar::new_witness(cs.clone(), || Ok(Fr::from(3u64))).unwrap();
        let b = FpVar::new_witness(cs.clone(), || Ok(Fr::from(4u64))).unwrap();

        let out = poseidon_var(cs.clone(), &[&a, &b]).unwrap();
        assert_eq!(
            out.value().unwrap(),
            poseidon_hash(&[Fr::from(3u64), Fr::from(4u64)])
        );
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_merkle_gadget_matches_tree() {
        let mut tree = NoteCommitmentTree::new();
        let leaves: Vec<Commitment> = (1..=3u64)
            .map(|i| Commitment::from_field(Fr::from(i)))
            .collect();
        for leaf in &leaves {
            tree.insert(leaf).unwrap();
        }
        let path = tree.prove_membership(&leaves[1]).unwrap();

        let cs = ConstraintSystem::<Fr>::new_ref();
        let leaf = FpVar::new_witness(cs.clone(), || Ok(leaves[1].to_field())).unwrap();
        let root = FpVar::new_input(cs.clone(), || Ok(tree.root())).unwrap();

        let computed = merkle_root_var(cs.clone(), &leaf, &path).unwrap();
        computed.enforce_equal(&root).unwrap();
        assert!(cs.is_satisfied().unwrap());
    }
}
