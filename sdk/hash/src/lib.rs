//! Keccak-256 digests and the checksummed base58 text form every ledger
//! identifier uses (transaction ids, block ids, merkle roots, nonces,
//! signatures).
//!
//! The checksum is the first four bytes of `keccak256(keccak256(payload))`,
//! appended to the payload before base58 encoding.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid base58 string: {0}")]
    Decode(#[from] bs58::decode::Error),
    #[error("base58check checksum mismatch")]
    Checksum,
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
}

/// Keccak-256 over `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub const CHECKSUM_LEN: usize = 4;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = keccak256(&keccak256(payload));
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

/// Base58 with a 4-byte double-Keccak checksum.
pub fn encode_check(bytes: &[u8]) -> String {
    let mut buf = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    buf.extend_from_slice(bytes);
    buf.extend_from_slice(&checksum(bytes));
    bs58::encode(buf).into_string()
}

pub fn decode_check(encoded: &str) -> Result<Vec<u8>, HashError> {
    let mut buf = bs58::decode(encoded).into_vec()?;
    if buf.len() < CHECKSUM_LEN {
        return Err(HashError::Checksum);
    }
    let split = buf.len() - CHECKSUM_LEN;
    if checksum(&buf[..split]) != buf[split..] {
        return Err(HashError::Checksum);
    }
    buf.truncate(split);
    Ok(buf)
}

/// A checksum-encoded byte string.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(String);

impl Hash {
    /// Encodes raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(encode_check(bytes))
    }

    /// Keccak-256 of `data`, encoded.
    pub fn digest(data: &[u8]) -> Self {
        Self::from_bytes(&keccak256(data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HashError> {
        decode_check(&self.0)
    }

    /// Decodes and requires an exact byte length.
    pub fn to_array<const N: usize>(&self) -> Result<[u8; N], HashError> {
        let bytes = self.to_bytes()?;
        let got = bytes.len();
        bytes
            .try_into()
            .map_err(|_| HashError::Length { expected: N, got })
    }

    /// Number of leading `marker` characters in the encoded text.
    pub fn leading(&self, marker: char) -> usize {
        self.0.chars().take_while(|c| *c == marker).count()
    }
}

impl From<String> for Hash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Hash {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.0)
    }
}
