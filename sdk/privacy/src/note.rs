//! Shielded Coins
//!
//! A coin is a committed value owned by a shielded public key.
//!
//! ```text
//! ShieldedCoin = {
//!     apk:   Fr,   // owner's shielded public key
//!     value: u64,
//!     rho:   Fr,   // serial number seed (nullifier input)
//!     r:     Fr,   // trapdoor for Bind
//!     s:     Fr,   // trapdoor for Commit
//!     cm:    Fr,   // Commit(value, Bind(apk, rho, r), s)
//! }
//! ```

use ark_bn254::Fr;
use ark_std::UniformRand;
use rand::{CryptoRng, Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, bind, commit};
use crate::nullifier::Nullifier;
use crate::poseidon::{fr_from_bytes, poseidon_hash, serde_fr};

/// Domain tag for shielded public keys ("ADDR").
pub const PUBLIC_KEY_DOMAIN: u64 = 0x4144_4452;

/// Spending key - the secret `ask` that authorizes pours.
///
/// This is the most sensitive key. Loss = loss of funds.
/// Compromise = theft of funds.
#[derive(Clone)]
pub struct SpendingKey {
    ask: Fr,
}

impl SpendingKey {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self { ask: Fr::rand(rng) }
    }

    /// Reduces 32 secret bytes (for example a derived HD key) into the field.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            ask: fr_from_bytes(&key),
        }
    }

    pub fn secret(&self) -> Fr {
        self.ask
    }

    /// `apk = Poseidon(ADDR, ask)`
    pub fn public_key(&self) -> Fr {
        poseidon_hash(&[Fr::from(PUBLIC_KEY_DOMAIN), self.ask])
    }

    pub fn nullifier(&self, coin: &ShieldedCoin) -> Nullifier {
        Nullifier::derive(self.ask, coin.rho)
    }
}

impl std::fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SpendingKey(..)")
    }
}

/// A spending key paired with its public key.
#[derive(Debug, Clone)]
pub struct ShieldedKeyBundle {
    pub spending_key: SpendingKey,
    pub public_key: Fr,
}

impl ShieldedKeyBundle {
    pub fn from_spending_key(spending_key: SpendingKey) -> Self {
        let public_key = spending_key.public_key();
        Self {
            spending_key,
            public_key,
        }
    }
}

/// The full opening of a coin. Known to payer and payee only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedCoin {
    #[serde(with = "serde_fr")]
    pub apk: Fr,
    pub value: u64,
    #[serde(with = "serde_fr")]
    pub rho: Fr,
    #[serde(with = "serde_fr")]
    pub r: Fr,
    #[serde(with = "serde_fr")]
    pub s: Fr,
    #[serde(with = "serde_fr")]
    pub cm: Fr,
}

impl ShieldedCoin {
    /// Samples `rho`, `r` and `s` uniformly from the field.
    pub fn new<R: Rng + CryptoRng + ?Sized>(value: u64, apk: Fr, rng: &mut R) -> Self {
        let rho = Fr::rand(rng);
        let r = Fr::rand(rng);
        let s = Fr::rand(rng);
        let cm = commit(value, bind(apk, rho, r), s);
        Self {
            apk,
            value,
            rho,
            r,
            s,
            cm,
        }
    }

    pub fn bind_key(&self) -> Fr {
        bind(self.apk, self.rho, self.r)
    }

    /// Recomputes `cm` from the other five components.
    pub fn is_well_formed(&self) -> bool {
        commit(self.value, self.bind_key(), self.s) == self.cm
    }

    pub fn commitment(&self) -> Commitment {
        Commitment::from_field(self.cm)
    }

    /// The part of the coin a pour reveals to the verifier.
    pub fn public_part(&self) -> PublicCoin {
        PublicCoin {
            apk: self.apk,
            value: self.value,
            rho: self.rho,
            cm: self.cm,
        }
    }

    pub fn payload(&self) -> CoinPayload {
        CoinPayload {
            value: self.value,
            k: self.bind_key(),
            s: self.s,
            cm: self.cm,
        }
    }
}

/// What a recipient (and the ledger) sees of a coin: enough to check the
/// commitment and its value, not enough to spend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinPayload {
    pub value: u64,
    #[serde(with = "serde_fr")]
    pub k: Fr,
    #[serde(with = "serde_fr")]
    pub s: Fr,
    #[serde(with = "serde_fr")]
    pub cm: Fr,
}

impl CoinPayload {
    /// `Commit(value, k, s) == cm`
    pub fn opens(&self) -> bool {
        commit(self.value, self.k, self.s) == self.cm
    }

    pub fn commitment(&self) -> Commitment {
        Commitment::from_field(self.cm)
    }
}

/// Public signals of a pour output: `{apk, value, rho, cm}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCoin {
    #[serde(with = "serde_fr")]
    pub apk: Fr,
    pub value: u64,
    #[serde(with = "serde_fr")]
    pub rho: Fr,
    #[serde(with = "serde_fr")]
    pub cm: Fr,
}

/// Fresh coin of `value` for `apk`, plus the payload to hand to the recipient.
pub fn create_shielded_coin(value: u64, apk: Fr) -> (ShieldedCoin, CoinPayload) {
    let coin = ShieldedCoin::new(value, apk, &mut OsRng);
    let payload = coin.payload();
    (coin, payload)
}
