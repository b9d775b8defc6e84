use bip32::{Prefix, XPub};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid address {address}: {source}")]
    Decode {
        address: String,
        #[source]
        source: bip32::Error,
    },
    #[error("address {0} is not in canonical xpub form")]
    NonCanonical(String),
}

/// A ledger address: the text form of a BIP32 extended public key.
///
/// Every UTXO lives at exactly one address, and an address is never reused.
/// Only the `xpub` spelling produced by [`Address::from_xpub`] decodes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn from_xpub(key: &XPub) -> Self {
        Self(key.to_string(Prefix::XPUB))
    }

    pub fn to_xpub(&self) -> Result<XPub, AddressError> {
        let key = self.0.parse::<XPub>().map_err(|source| AddressError::Decode {
            address: self.0.clone(),
            source,
        })?;
        // UTXOs are keyed on the text, so a key must have a single spelling
        if key.to_string(Prefix::XPUB) != self.0 {
            return Err(AddressError::NonCanonical(self.0.clone()));
        }
        Ok(key)
    }

    /// The address text, once it has been checked to be canonical.
    pub fn canonical_bytes(&self) -> Result<&[u8], AddressError> {
        self.to_xpub()?;
        Ok(self.0.as_bytes())
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn pubkey_bytes(&self) -> Result<[u8; 33], AddressError> {
        Ok(self.to_xpub()?.to_bytes())
    }

    /// The non-hardened child index this key was derived at.
    pub fn child_index(&self) -> Result<u32, AddressError> {
        Ok(self.to_xpub()?.attrs().child_number.index())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bip32::XPrv;

    fn key() -> XPub {
        XPrv::new([9u8; 32]).unwrap().public_key()
    }

    #[test]
    fn test_address_round_trips_through_xpub() {
        let address = Address::from_xpub(&key());
        assert!(address.as_str().starts_with("xpub"));
        assert_eq!(address.to_xpub().unwrap(), key());
        assert_eq!(address.canonical_bytes().unwrap(), address.as_str().as_bytes());
    }

    #[test]
    fn test_other_prefixes_are_not_canonical() {
        let respelled = Address::from(key().to_string(Prefix::TPUB));
        assert!(matches!(
            respelled.to_xpub(),
            Err(AddressError::NonCanonical(_))
        ));
        assert!(respelled.canonical_bytes().is_err());
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        assert!(matches!(
            Address::from("not-a-key").to_xpub(),
            Err(AddressError::Decode { .. })
        ));
    }
}
