//! Coin Commitments
//!
//! A two-stage Poseidon commitment:
//!
//! ```text
//! k  = Bind(apk, rho, r)   = Poseidon(apk, rho, r)
//! cm = Commit(value, k, s) = Poseidon(value, k, s)
//! ```
//!
//! `k` hides the owner and serial number, `s` hides the value. Handing out
//! `(value, k, s)` lets anyone check `cm` without learning `apk` or `rho`.

use ark_bn254::Fr;
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use std::fmt;

use crate::poseidon::{fr_from_bytes, fr_from_canonical_bytes, fr_to_bytes, poseidon_hash};

/// A coin commitment (32 bytes, little-endian field element)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Commitment(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Commitment {
    /// Create commitment from field element
    pub fn from_field(f: Fr) -> Self {
        Self(fr_to_bytes(&f))
    }

    /// Convert to field element
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

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: [u8; 32] = hex::serde::deserialize(deserializer)?;
        let value = Self(bytes);
        if !value.is_canonical() {
            return Err(D::Error::custom("commitment is not below the field modulus"));
        }
        Ok(value)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(self.0))
    }
}

/// `k = Poseidon(apk, rho, r)`
pub fn bind(apk: Fr, rho: Fr, r: Fr) -> Fr {
    poseidon_hash(&[apk, rho, r])
}

/// `cm = Poseidon(value, k, s)`
pub fn commit(value: u64, k: Fr, s: Fr) -> Fr {
    poseidon_hash(&[Fr::from(value), k, s])
}
