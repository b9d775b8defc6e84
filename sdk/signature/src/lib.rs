use dotcoin_hash::{HashError, decode_check, encode_check};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A checksum-encoded compact (r || s) ECDSA signature.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(encode_check(bytes))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HashError> {
        decode_check(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Signature {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.0)
    }
}
