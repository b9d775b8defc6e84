use dotcoin_hash::{Hash, HashError, keccak256};
use serde::{Deserialize, Serialize};

/// Character a block id must start with, repeated `difficulty` times.
pub const POW_MARKER: char = '1';
/// Raw nonce length in bytes.
pub const NONCE_LEN: usize = 32;

/// A mined block. The transactions it confirms point back at it through
/// their `confirming_block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: Hash,
    /// `None` only for the genesis block
    #[serde(default)]
    pub previous: Option<Hash>,
    /// Merkle root over `[coinbase id, confirmed ids...]`
    pub root: Hash,
    pub nonce: Hash,
}

impl Block {
    /// Recomputes the id from `previous`, `root` and `nonce`.
    pub fn compute_id(&self) -> Result<Hash, HashError> {
        let preimage = BlockPreimage::new(self.previous.as_ref(), &self.root)?;
        Ok(preimage.hash_with(&self.nonce.to_bytes()?))
    }

    pub fn is_genesis(&self) -> bool {
        self.previous.is_none()
    }
}

/// `decode(previous) || decode(root)`, fixed while the nonce varies.
#[derive(Debug, Clone)]
pub struct BlockPreimage {
    prefix: Vec<u8>,
}

impl BlockPreimage {
    pub fn new(previous: Option<&Hash>, root: &Hash) -> Result<Self, HashError> {
        let mut prefix = match previous {
            Some(previous) => previous.to_bytes()?,
            None => Vec::new(),
        };
        prefix.extend_from_slice(&root.to_bytes()?);
        Ok(Self { prefix })
    }

    /// `keccak256(previous || root || nonce)`, encoded.
    pub fn hash_with(&self, nonce: &[u8]) -> Hash {
        let mut buf = Vec::with_capacity(self.prefix.len() + nonce.len());
        buf.extend_from_slice(&self.prefix);
        buf.extend_from_slice(nonce);
        Hash::digest(&buf)
    }
}

/// True when the first `difficulty` characters of `id` are all `'1'`.
pub fn meets_difficulty(id: &Hash, difficulty: usize) -> bool {
    id.leading(POW_MARKER) >= difficulty
}

/// The acceptance test applied to submitted blocks. Only the id's prefix is
/// checked; that the id matches the block's contents is a separate rule.
pub fn verify_block_hash(block: &Block, difficulty: usize) -> bool {
    meets_difficulty(&block.id, difficulty)
}

/// Big-endian increment with carry; wraps to zero after all 0xff.
pub fn increment_nonce(nonce: &mut [u8]) {
    for byte in nonce.iter_mut().rev() {
        if *byte < u8::MAX {
            *byte += 1;
            return;
        }
        *byte = 0;
    }
}

/// Binary Merkle root over transaction ids.
///
/// Leaves are `keccak256(id text)`, parents `keccak256(left || right)`; an
/// unpaired last node moves up a level unchanged. A single leaf is its own
/// root and no leaves give the empty root.
pub fn merkle_root(ids: &[Hash]) -> Hash {
    if ids.is_empty() {
        return Hash::from_bytes(&[]);
    }

    let mut level: Vec<[u8; 32]> = ids
        .iter()
        .map(|id| keccak256(id.as_str().as_bytes()))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(left);
                    buf[32..].copy_from_slice(right);
                    next.push(keccak256(&buf));
                }
                [single] => next.push(*single),
                _ => {}
            }
        }
        level = next;
    }

    Hash::from_bytes(&level[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Hash> {
        (0..n).map(|i| Hash::digest(&[i as u8])).collect()
    }

    #[test]
    fn test_increment_nonce_carries() {
        let mut nonce = [0u8, 0xff, 0xff];
        increment_nonce(&mut nonce);
        assert_eq!(nonce, [1, 0, 0]);

        let mut nonce = [0u8, 0, 7];
        increment_nonce(&mut nonce);
        assert_eq!(nonce, [0, 0, 8]);

        let mut nonce = [0xffu8; 2];
        increment_nonce(&mut nonce);
        assert_eq!(nonce, [0, 0]);
    }

    #[test]
    fn test_meets_difficulty() {
        let id = Hash::from_bytes(&[0, 0, 5, 6]);
        assert!(meets_difficulty(&id, 0));
        assert!(meets_difficulty(&id, 2));
        assert!(!meets_difficulty(&id, 3));

        let block = Block {
            id,
            previous: None,
            root: Hash::default(),
            nonce: Hash::default(),
        };
        assert!(verify_block_hash(&block, 2));
        assert!(!verify_block_hash(&block, 3));
    }

    #[test]
    fn test_merkle_root_single_leaf() {
        let leaves = ids(1);
        let expected = Hash::from_bytes(&keccak256(leaves[0].as_str().as_bytes()));
        assert_eq!(merkle_root(&leaves), expected);
    }

    #[test]
    fn test_merkle_root_promotes_odd_leaf() {
        let leaves = ids(3);
        let l: Vec<[u8; 32]> = leaves
            .iter()
            .map(|id| keccak256(id.as_str().as_bytes()))
            .collect();
        let pair = keccak256(&[l[0], l[1]].concat());
        let root = keccak256(&[pair, l[2]].concat());
        assert_eq!(merkle_root(&leaves), Hash::from_bytes(&root));
    }

    #[test]
    fn test_merkle_root_is_order_sensitive() {
        let mut leaves = ids(4);
        let root = merkle_root(&leaves);
        leaves.swap(0, 1);
        assert_ne!(merkle_root(&leaves), root);
    }

    #[test]
    fn test_block_id_binds_all_fields() {
        let root = merkle_root(&ids(2));
        let nonce = Hash::from_bytes(&[9u8; NONCE_LEN]);
        let id = BlockPreimage::new(None, &root)
            .unwrap()
            .hash_with(&[9u8; NONCE_LEN]);
        let genesis = Block {
            id: id.clone(),
            previous: None,
            root: root.clone(),
            nonce: nonce.clone(),
        };
        assert_eq!(genesis.compute_id().unwrap(), id);

        let child = Block {
            id: Hash::default(),
            previous: Some(id.clone()),
            root,
            nonce,
        };
        assert_ne!(child.compute_id().unwrap(), id);
    }

    #[test]
    fn test_block_json_shape() {
        let block = Block {
            id: Hash::from_bytes(b"id"),
            previous: None,
            root: Hash::from_bytes(b"root"),
            nonce: Hash::from_bytes(b"nonce"),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert!(json["previous"].is_null());
        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }
}
