//! Poseidon over the BN254 scalar field.
//!
//! One parameter set is shared by every hash in the protocol and by the pour
//! circuit's sponge gadget.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};
use std::sync::OnceLock;

pub const RATE: usize = 2;
pub const CAPACITY: usize = 1;
pub const FULL_ROUNDS: usize = 8;
pub const PARTIAL_ROUNDS: usize = 57;
pub const ALPHA: u64 = 5;

static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// Rate 2, capacity 1, 8 full and 57 partial rounds, x^5 S-box.
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    CONFIG.get_or_init(|| {
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            Fr::MODULUS_BIT_SIZE as u64,
            RATE,
            FULL_ROUNDS as u64,
            PARTIAL_ROUNDS as u64,
            0,
        );
        PoseidonConfig::new(FULL_ROUNDS, PARTIAL_ROUNDS, ALPHA, mds, ark, RATE, CAPACITY)
    })
}

/// Absorbs `inputs` in order and squeezes one element.
pub fn poseidon_hash(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(poseidon_config());
    for input in inputs {
        sponge.absorb(input);
    }
    let result: Fr = sponge.squeeze_field_elements(1)[0];
    result
}

/// Canonical 32-byte little-endian encoding.
pub fn fr_to_bytes(f: &Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Reduces little-endian bytes into the field.
pub fn fr_from_bytes(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Decodes little-endian bytes, rejecting values at or above the modulus.
///
/// Every element has exactly one accepted encoding, so byte comparisons
/// agree with field comparisons.
pub fn fr_from_canonical_bytes(bytes: &[u8; 32]) -> Option<Fr> {
    let f = fr_from_bytes(bytes);
    (fr_to_bytes(&f) == *bytes).then_some(f)
}

/// `#[serde(with = "...")]` adapter: a field element as hex of its LE bytes.
pub mod serde_fr {
    use super::{Fr, fr_from_canonical_bytes, fr_to_bytes};
    use serde::{Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        hex::serde::serialize(fr_to_bytes(value), serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let bytes: [u8; 32] = hex::serde::deserialize(deserializer)?;
        fr_from_canonical_bytes(&bytes)
            .ok_or_else(|| D::Error::custom("field element is not below the modulus"))
    }
}
