//! Nullifiers
//!
//! ```text
//! Nullifier = Poseidon(NULL, ask, rho)
//! ```
//!
//! Only the owner (holder of `ask`) can compute it, and every coin has a
//! single one. Once published, the coin cannot be poured again.

use ark_bn254::Fr;
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use std::fmt;

use crate::poseidon::{fr_from_bytes, fr_from_canonical_bytes, fr_to_bytes, poseidon_hash};

/// Domain tag for nullifier derivation ("NULL").
pub const NULLIFIER_DOMAIN: u64 = 0x4e55_4c4c;

/// A nullifier (32 bytes) - unique tag for a spent coin
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Nullifier(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Nullifier {
    pub fn derive(ask: Fr, rho: Fr) -> Self {
        Self::from_field(poseidon_hash(&[Fr::from(NULLIFIER_DOMAIN), ask, rho]))
    }

    pub fn from_field(f: Fr) -> Self {
        Self(fr_to_bytes(&f))
    }

    pub fn to_field(&self) -> Fr {
        fr_from_bytes(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The bytes are the unique encoding of a field element.
    pub fn is_canonical(&self) -> bool {
        fr_from_canonical_bytes(&self.0).is_some()
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 32] = hex::serde::deserialize(deserializer)?;
        let value = Self(bytes);
        if !value.is_canonical() {
            return Err(D::Error::custom("nullifier is not below the field modulus"));
        }
        Ok(value)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullifier_deterministic() {
        let ask = Fr::from(11u64);
        let rho = Fr::from(12u64);
        assert_eq!(Nullifier::derive(ask, rho), Nullifier::derive(ask, rho));
    }

    #[test]
    fn test_nullifier_depends_on_key_and_serial() {
        let ask = Fr::from(11u64);
        let rho = Fr::from(12u64);
        let nf = Nullifier::derive(ask, rho);
        assert_ne!(nf, Nullifier::derive(Fr::from(99u64), rho));
        assert_ne!(nf, Nullifier::derive(ask, Fr::from(13u64)));
    }

    #[test]
    fn test_nullifier_serializes_as_hex() {
        let nf = Nullifier::derive(Fr::from(11u64), Fr::from(12u64));
        let json = serde_json::to_string(&nf).unwrap();
        assert_eq!(json, format!("\"{}\"", hex::encode(nf.as_bytes())));
        let back: Nullifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, nf);
    }

    #[test]
    fn test_out_of_range_nullifier_is_rejected() {
        let nf = Nullifier([0xab; 32]);
        assert!(!nf.is_canonical());
        let json = format!("\"{}\"", "ab".repeat(32));
        assert!(serde_json::from_str::<Nullifier>(&json).is_err());
    }
}
