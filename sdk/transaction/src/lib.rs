use serde::{Deserialize, Serialize};
use thiserror::Error;

use dotcoin_hash::{Hash, HashError, keccak256};
use dotcoin_privacy::{
    CoinPayload, Commitment, Fr, Nullifier, PublicCoin, fr_to_bytes, poseidon::serde_fr,
};
use dotcoin_pubkey::{Address, AddressError};
use dotcoin_signature::Signature;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("invalid signature encoding: {0}")]
    Signature(#[from] HashError),
}

/// Value sent to a one-time transparent address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparentOutput {
    pub address: Address,
    pub amount: u64,
}

/// A coin commitment plus the payload that opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldedOutput {
    pub commitment: Commitment,
    pub payload: CoinPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Output {
    Transparent(TransparentOutput),
    Shielded(ShieldedOutput),
}

impl Output {
    pub fn transparent(address: Address, amount: u64) -> Self {
        Self::Transparent(TransparentOutput { address, amount })
    }

    pub fn shielded(payload: CoinPayload) -> Self {
        Self::Shielded(ShieldedOutput {
            commitment: payload.commitment(),
            payload,
        })
    }

    /// Value carried by the output (the payload value for shielded outputs).
    pub fn value(&self) -> u64 {
        match self {
            Self::Transparent(output) => output.amount,
            Self::Shielded(output) => output.payload.value,
        }
    }
}

/// The public half of a pour: what the proof is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PourDescription {
    /// Note tree root the membership proof was built against
    #[serde(with = "serde_fr")]
    pub root: Fr,
    pub nullifier: Nullifier,
    /// Public signals of the two new coins, in output order
    pub outputs: Vec<PublicCoin>,
    /// Compressed Groth16 proof
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// A ledger transaction.
///
/// `signatures` is `None` only while the transaction is being built; the
/// ledger requires it to be present (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Hash,
    pub inputs: Vec<Address>,
    pub outputs: Vec<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<Signature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour: Option<PourDescription>,
    #[serde(default)]
    pub confirming_block: Option<Hash>,
}

impl Transaction {
    /// Unsigned, unconfirmed, without an id.
    pub fn new(inputs: Vec<Address>, outputs: Vec<Output>) -> Self {
        Self {
            id: Hash::default(),
            inputs,
            outputs,
            signatures: None,
            pour: None,
            confirming_block: None,
        }
    }

    /// Canonical bytes:
    ///
    /// ```text
    /// (LE64(len) || input)*
    /// || (LE64(len) || address || LE64(amount))*      transparent outputs
    /// || (cm || LE64(value) || k || s)*               shielded outputs
    /// || root || nullifier || (apk || LE64(v) || rho || cm)* || proof
    /// || signature*                                   when included
    /// ```
    pub fn canonical_bytes(&self, with_signatures: bool) -> Result<Vec<u8>, TransactionError> {
        let mut bytes = Vec::new();

        for input in &self.inputs {
            push_address(&mut bytes, input)?;
        }

        for output in &self.outputs {
            match output {
                Output::Transparent(output) => {
                    push_address(&mut bytes, &output.address)?;
                    bytes.extend_from_slice(&output.amount.to_le_bytes());
                }
                Output::Shielded(output) => {
                    bytes.extend_from_slice(output.commitment.as_bytes());
                    bytes.extend_from_slice(&output.payload.value.to_le_bytes());
                    bytes.extend_from_slice(&fr_to_bytes(&output.payload.k));
                    bytes.extend_from_slice(&fr_to_bytes(&output.payload.s));
                }
            }
        }

        if let Some(pour) = &self.pour {
            bytes.extend_from_slice(&fr_to_bytes(&pour.root));
            bytes.extend_from_slice(pour.nullifier.as_bytes());
            for coin in &pour.outputs {
                bytes.extend_from_slice(&fr_to_bytes(&coin.apk));
                bytes.extend_from_slice(&coin.value.to_le_bytes());
                bytes.extend_from_slice(&fr_to_bytes(&coin.rho));
                bytes.extend_from_slice(&fr_to_bytes(&coin.cm));
            }
            bytes.extend_from_slice(&pour.proof);
        }

        if with_signatures {
            for signature in self.signatures.iter().flatten() {
                bytes.extend_from_slice(&signature.to_bytes()?);
            }
        }

        Ok(bytes)
    }

    /// The 32-byte message every input signature covers.
    pub fn signing_digest(&self) -> Result<[u8; 32], TransactionError> {
        Ok(keccak256(&self.canonical_bytes(false)?))
    }

    /// The id this transaction must carry.
    pub fn compute_id(&self) -> Result<Hash, TransactionError> {
        Ok(Hash::digest(&self.canonical_bytes(true)?))
    }

    /// Sets `id` from the current contents.
    pub fn seal(mut self) -> Result<Self, TransactionError> {
        self.id = self.compute_id()?;
        Ok(self)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirming_block.is_some()
    }

    pub fn transparent_outputs(&self) -> impl Iterator<Item = &TransparentOutput> {
        self.outputs.iter().filter_map(|output| match output {
            Output::Transparent(output) => Some(output),
            Output::Shielded(_) => None,
        })
    }

    pub fn shielded_outputs(&self) -> impl Iterator<Item = &ShieldedOutput> {
        self.outputs.iter().filter_map(|output| match output {
            Output::Shielded(output) => Some(output),
            Output::Transparent(_) => None,
        })
    }
}

fn push_address(bytes: &mut Vec<u8>, address: &Address) -> Result<(), AddressError> {
    let text = address.canonical_bytes()?;
    bytes.extend_from_slice(&(text.len() as u64).to_le_bytes());
    bytes.extend_from_slice(text);
    Ok(())
}

/// An output at a transparent address, with its spending state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub address: Address,
    pub amount: u64,
    /// Transaction that created the output
    pub origin: Hash,
    /// Set once, when a transaction consumes the output
    #[serde(default)]
    pub spending_tx: Option<Hash>,
}

impl Utxo {
    pub fn is_spent(&self) -> bool {
        self.spending_tx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bip32::{ExtendedKeyAttrs, Prefix, XPub};
    use dotcoin_keypair::Keypair;
    use dotcoin_privacy::create_shielded_coin;

    fn address(index: u32) -> Address {
        Keypair::from_seed(&[3u8; 32])
            .unwrap()
            .receive_key(0)
            .unwrap()
            .derive_child(index)
            .unwrap()
            .address()
    }

    fn sample() -> Transaction {
        Transaction::new(
            vec![address(0)],
            vec![
                Output::transparent(address(1), 60),
                Output::transparent(address(2), 40),
            ],
        )
    }

    #[test]
    fn test_id_covers_outputs() {
        let tx = sample().seal().unwrap();
        let mut changed = tx.clone();
        if let Output::Transparent(output) = &mut changed.outputs[0] {
            output.amount = 61;
        }
        assert_ne!(changed.compute_id().unwrap(), tx.id);
    }

    #[test]
    fn test_signing_digest_excludes_signatures() {
        let mut tx = sample();
        let before = tx.signing_digest().unwrap();
        let unsigned_id = tx.compute_id().unwrap();

        tx.signatures = Some(vec![Signature::from_bytes(&[1u8; 64])]);
        assert_eq!(tx.signing_digest().unwrap(), before);
        assert_ne!(tx.compute_id().unwrap(), unsigned_id);
    }

    #[test]
    fn test_confirmation_does_not_change_id() {
        let mut tx = sample().seal().unwrap();
        tx.confirming_block = Some(Hash::from_bytes(b"block"));
        assert_eq!(tx.compute_id().unwrap(), tx.id);
    }

    #[test]
    fn test_shielded_payload_is_bound_to_id() {
        let (_, payload) = create_shielded_coin(5, Fr::from(1u64));
        let tx = Transaction::new(vec![], vec![Output::shielded(payload)])
            .seal()
            .unwrap();

        let mut tampered = tx.clone();
        if let Output::Shielded(output) = &mut tampered.outputs[0] {
            output.payload.s = Fr::from(2u64);
        }
        assert_ne!(tampered.compute_id().unwrap(), tx.id);
    }

    #[test]
    fn test_malformed_address_fails_digest() {
        let tx = Transaction::new(vec![Address::from("not-a-key")], vec![]);
        assert!(matches!(
            tx.compute_id(),
            Err(TransactionError::Address(_))
        ));
    }

    #[test]
    fn test_respelled_address_fails_digest() {
        let respelled = Address::from(address(1).to_xpub().unwrap().to_string(Prefix::TPUB));
        let tx = Transaction::new(vec![address(0)], vec![Output::transparent(respelled, 60)]);
        assert!(matches!(
            tx.compute_id(),
            Err(TransactionError::Address(AddressError::NonCanonical(_)))
        ));
    }

    #[test]
    fn test_id_covers_full_address() {
        // Same public key, different chain code
        let original = address(1).to_xpub().unwrap();
        let swapped = XPub::new(
            *original.public_key(),
            ExtendedKeyAttrs {
                chain_code: [0u8; 32],
                ..original.attrs().clone()
            },
        );
        let rewritten = Address::from_xpub(&swapped);
        assert_eq!(rewritten.pubkey_bytes().unwrap(), address(1).pubkey_bytes().unwrap());

        let tx = sample();
        let mut relayed = tx.clone();
        relayed.outputs[0] = Output::transparent(rewritten, 60);
        assert_ne!(tx.compute_id().unwrap(), relayed.compute_id().unwrap());
    }

    #[test]
    fn test_output_json_shapes() {
        let transparent = Output::transparent(address(4), 7);
        let json = serde_json::to_value(&transparent).unwrap();
        assert!(json.get("address").is_some());
        assert_eq!(json["amount"], 7);

        let (_, payload) = create_shielded_coin(9, Fr::from(1u64));
        let shielded = Output::shielded(payload);
        let json = serde_json::to_value(&shielded).unwrap();
        assert!(json.get("commitment").is_some());
        let back: Output = serde_json::from_value(json).unwrap();
        assert_eq!(back, shielded);
    }

    #[test]
    fn test_transaction_json_uses_camel_case() {
        let mut tx = sample().seal().unwrap();
        tx.signatures = Some(vec![]);
        tx.confirming_block = Some(Hash::from_bytes(b"b"));
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("confirmingBlock").is_some());
        assert!(json.get("pour").is_none());
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
