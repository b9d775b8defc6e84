use bip32::{ChildNumber, Prefix, XPrv, XPub};
use dotcoin_pubkey::{Address, AddressError};
use dotcoin_signature::Signature;
use k256::ecdsa::{
    Signature as EcdsaSignature,
    signature::hazmat::{PrehashSigner, PrehashVerifier},
};
use log::warn;
use std::fmt;
use thiserror::Error;

/// BIP44 purpose level.
pub const PURPOSE: u32 = 44;
/// Registered coin type for testnets.
pub const COIN_TYPE: u32 = 1;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key derivation failed: {0}")]
    Derivation(#[from] bip32::Error),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("signing failed: {0}")]
    Signing(#[from] k256::ecdsa::Error),
    #[error("input {address} does not belong to the receive or change chain of account {account}")]
    UnmatchedInput { address: Address, account: u32 },
}

/// The last derivation level under an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Chain {
    Change = 0,
    Receive = 1,
    Shielded = 2,
}

impl Chain {
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// `m/44'/1'/{account}'/{chain}`
pub fn derivation_path(account: u32, chain: Chain) -> String {
    format!("m/{PURPOSE}'/{COIN_TYPE}'/{account}'/{}", chain.index())
}

/// An extended key that may or may not carry private material.
#[derive(Clone)]
pub enum ExtendedKey {
    Private(XPrv),
    Public(XPub),
}

impl ExtendedKey {
    /// Accepts either an `xprv` or an `xpub` string.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        if let Ok(private) = encoded.parse::<XPrv>() {
            return Ok(Self::Private(private));
        }
        Ok(Self::Public(encoded.parse::<XPub>()?))
    }

    pub fn public(&self) -> XPub {
        match self {
            Self::Private(key) => key.public_key(),
            Self::Public(key) => key.clone(),
        }
    }

    pub fn address(&self) -> Address {
        Address::from_xpub(&self.public())
    }

    pub fn private(&self) -> Option<&XPrv> {
        match self {
            Self::Private(key) => Some(key),
            Self::Public(_) => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Private keys encode as `xprv`, public keys as `xpub`.
    pub fn encode(&self) -> String {
        match self {
            Self::Private(key) => key.to_string(Prefix::XPRV).as_str().to_owned(),
            Self::Public(key) => key.to_string(Prefix::XPUB),
        }
    }

    /// Child number of this key at its own depth.
    pub fn index(&self) -> u32 {
        match self {
            Self::Private(key) => key.attrs().child_number.index(),
            Self::Public(key) => key.attrs().child_number.index(),
        }
    }

    /// Non-hardened child. Public parents yield public children.
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let number = ChildNumber::new(index, false)?;
        Ok(match self {
            Self::Private(key) => Self::Private(key.derive_child(number)?),
            Self::Public(key) => Self::Public(key.derive_child(number)?),
        })
    }

    /// The first child whose index is above every child already holding a UTXO.
    pub fn next_available_child<'a>(
        &self,
        used: impl IntoIterator<Item = &'a Address>,
    ) -> Result<Self, KeyError> {
        let index = next_available_child_index(&self.address(), used)?;
        self.derive_child(index)
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_private() { "private" } else { "public" };
        f.debug_struct("ExtendedKey")
            .field("kind", &kind)
            .field("address", &self.address())
            .finish()
    }
}

/// True when `candidate` is the direct non-hardened child of `parent` at the
/// index embedded in `candidate`.
pub fn is_descendant(parent: &Address, candidate: &Address) -> Result<bool, KeyError> {
    let index = candidate.child_index()?;
    let child = parent
        .to_xpub()?
        .derive_child(ChildNumber::new(index, false)?)?;
    Ok(Address::from_xpub(&child) == *candidate)
}

/// One past the highest child index of `parent` among `used`, or 0.
pub fn next_available_child_index<'a>(
    parent: &Address,
    used: impl IntoIterator<Item = &'a Address>,
) -> Result<u32, KeyError> {
    let mut next = 0u32;
    for address in used {
        if is_descendant(parent, address)? {
            next = next.max(address.child_index()?.saturating_add(1));
        }
    }
    Ok(next)
}

/// ECDSA over a 32-byte digest; the digest is not hashed again.
pub fn sign(digest: &[u8], key: &XPrv) -> Result<Signature, KeyError> {
    let signature: EcdsaSignature = key.private_key().sign_prehash(digest)?;
    Ok(Signature::from_bytes(&signature.to_bytes()))
}

/// Malformed signatures verify as false; a malformed address is an error.
pub fn verify(digest: &[u8], address: &Address, signature: &Signature) -> Result<bool, KeyError> {
    let key = address.to_xpub()?;
    let Ok(bytes) = signature.to_bytes() else {
        return Ok(false);
    };
    let Ok(signature) = EcdsaSignature::from_slice(&bytes) else {
        return Ok(false);
    };
    Ok(key.public_key().verify_prehash(digest, &signature).is_ok())
}

/// A wallet rooted at a BIP32 master key.
/// NEVER expose this struct's internals.
pub struct Keypair {
    master: XPrv,
}

impl Keypair {
    /// `seed` is the 16 to 64 byte output of a mnemonic or other entropy source.
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        Ok(Self {
            master: XPrv::new(seed)?,
        })
    }

    /// The private key at `m/44'/1'/{account}'/{chain}`.
    pub fn account_key(&self, account: u32, chain: Chain) -> Result<ExtendedKey, KeyError> {
        Ok(ExtendedKey::Private(self.derive_account(account, chain)?))
    }

    fn derive_account(&self, account: u32, chain: Chain) -> Result<XPrv, KeyError> {
        let mut key = self.master.clone();
        for hardened in [PURPOSE, COIN_TYPE, account] {
            key = key.derive_child(ChildNumber::new(hardened, true)?)?;
        }
        Ok(key.derive_child(ChildNumber::new(chain.index(), false)?)?)
    }

    pub fn receive_key(&self, account: u32) -> Result<ExtendedKey, KeyError> {
        self.account_key(account, Chain::Receive)
    }

    pub fn change_key(&self, account: u32) -> Result<ExtendedKey, KeyError> {
        self.account_key(account, Chain::Change)
    }

    /// Raw scalar of the account's shielded chain key.
    pub fn shielded_secret(&self, account: u32) -> Result<[u8; 32], KeyError> {
        Ok(self.derive_account(account, Chain::Shielded)?.to_bytes())
    }

    /// Signs `digest` once per input, using the receive-chain child when it
    /// matches the input and the change-chain child otherwise.
    pub fn sign_inputs(
        &self,
        account: u32,
        digest: &[u8],
        inputs: &[Address],
    ) -> Result<Vec<Signature>, KeyError> {
        let receive = self.receive_key(account)?;
        let change = self.change_key(account)?;

        inputs
            .iter()
            .map(|input| {
                let index = input.child_index()?;
                for parent in [&receive, &change] {
                    let child = parent.derive_child(index)?;
                    if child.address() == *input {
                        if let Some(private) = child.private() {
                            return sign(digest, private);
                        }
                    }
                }
                warn!("no key for input {input} in account {account}");
                Err(KeyError::UnmatchedInput {
                    address: input.clone(),
                    account,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn keypair() -> Keypair {
        Keypair::from_seed(&[7u8; 64]).unwrap()
    }

    #[test]
    fn test_derivation_path_format() {
        assert_eq!(derivation_path(0, Chain::Receive), "m/44'/1'/0'/1");
        assert_eq!(derivation_path(3, Chain::Shielded), "m/44'/1'/3'/2");
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let receive = keypair().receive_key(0).unwrap();
        let public = ExtendedKey::Public(receive.public());

        for index in [0, 1, 17] {
            let from_private = receive.derive_child(index).unwrap();
            let from_public = public.derive_child(index).unwrap();
            assert_eq!(from_private.address(), from_public.address());
            assert!(!from_public.is_private());
        }
    }

    #[test]
    fn test_parse_round_trips_both_kinds() {
        let key = keypair().change_key(1).unwrap();
        let private = ExtendedKey::parse(&key.encode()).unwrap();
        assert!(private.is_private());
        assert_eq!(private.address(), key.address());

        let public = ExtendedKey::parse(key.address().as_str()).unwrap();
        assert!(!public.is_private());
        assert_eq!(public.address(), key.address());
    }

    #[test]
    fn test_is_descendant() {
        let keys = keypair();
        let receive = keys.receive_key(0).unwrap();
        let change = keys.change_key(0).unwrap();
        let child = receive.derive_child(4).unwrap().address();

        assert!(is_descendant(&receive.address(), &child).unwrap());
        assert!(!is_descendant(&change.address(), &child).unwrap());
        // A grandchild is not a direct descendant.
        let grandchild = receive.derive_child(4).unwrap().derive_child(0).unwrap();
        assert!(!is_descendant(&receive.address(), &grandchild.address()).unwrap());
    }

    #[test]
    fn test_next_available_child_index() {
        let keys = keypair();
        let receive = keys.receive_key(0).unwrap();
        let other = keys.receive_key(1).unwrap();
        assert_eq!(
            next_available_child_index(&receive.address(), std::iter::empty()).unwrap(),
            0
        );

        let used = vec![
            receive.derive_child(0).unwrap().address(),
            receive.derive_child(5).unwrap().address(),
            other.derive_child(9).unwrap().address(),
        ];
        assert_eq!(
            next_available_child_index(&receive.address(), &used).unwrap(),
            6
        );
        let next = receive.next_available_child(&used).unwrap();
        assert_eq!(next.index(), 6);
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = keypair();
        let child = keys.receive_key(0).unwrap().derive_child(2).unwrap();
        let mut digest = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut digest);

        let signature = sign(&digest, child.private().unwrap()).unwrap();
        assert!(verify(&digest, &child.address(), &signature).unwrap());

        let mut tampered = digest;
        tampered[0] ^= 1;
        assert!(!verify(&tampered, &child.address(), &signature).unwrap());

        let stranger = keys.receive_key(0).unwrap().derive_child(3).unwrap();
        assert!(!verify(&digest, &stranger.address(), &signature).unwrap());
        assert!(!verify(&digest, &child.address(), &Signature::from("garbage".to_string())).unwrap());
    }

    #[test]
    fn test_sign_inputs_picks_matching_chain() {
        let keys = keypair();
        let receive_child = keys.receive_key(0).unwrap().derive_child(1).unwrap();
        let change_child = keys.change_key(0).unwrap().derive_child(1).unwrap();
        let digest = [9u8; 32];
        let inputs = vec![receive_child.address(), change_child.address()];

        let signatures = keys.sign_inputs(0, &digest, &inputs).unwrap();
        assert_eq!(signatures.len(), 2);
        assert!(verify(&digest, &inputs[0], &signatures[0]).unwrap());
        assert!(verify(&digest, &inputs[1], &signatures[1]).unwrap());
    }

    #[test]
    fn test_sign_inputs_rejects_foreign_input() {
        let keys = keypair();
        let foreign = keys.receive_key(5).unwrap().derive_child(0).unwrap().address();
        let err = keys.sign_inputs(0, &[1u8; 32], &[foreign]).unwrap_err();
        assert!(matches!(err, KeyError::UnmatchedInput { account: 0, .. }));
    }

    #[test]
    fn test_shielded_secret_is_per_account() {
        let keys = keypair();
        assert_ne!(
            keys.shielded_secret(0).unwrap(),
            keys.shielded_secret(1).unwrap()
        );
        assert_eq!(
            keys.shielded_secret(0).unwrap(),
            keys.shielded_secret(0).unwrap()
        );
    }
}
