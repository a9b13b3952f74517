//! Poseidon hashing over BN254
//!
//! Fixed-parameter Poseidon (circom parameter set, x^5 S-box) behind a
//! byte-oriented entry point. Inputs are big-endian byte strings of at
//! most 32 bytes, reduced mod p before entering the permutation; the
//! output is the resulting field element as 32 big-endian bytes.
//!
//! One hash, three uses:
//! - note commitments (3 inputs)
//! - nullifiers (4 inputs)
//! - Merkle node combining via [`hash_nodes`] (2 inputs)

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::{WalletError, WalletResult};
use crate::field::FieldElement;

/// Maximum number of hash inputs (nullifier derivation)
pub const MAX_INPUTS: usize = 4;

/// Levels in an epoch tree, plus the leaf level
pub const ZERO_HASH_CHAIN_LEN: usize = yacoin_epoch_pool::TREE_DEPTH + 1;

/// Hash 1..=4 field elements
pub fn poseidon_hash_fields(inputs: &[FieldElement]) -> WalletResult<FieldElement> {
    if inputs.is_empty() || inputs.len() > MAX_INPUTS {
        return Err(WalletError::UnsupportedWidth(inputs.len() + 1));
    }

    let frs: Vec<Fr> = inputs.iter().map(|f| f.as_fr()).collect();
    let mut hasher = Poseidon::<Fr>::new_circom(frs.len())
        .map_err(|_| WalletError::UnsupportedWidth(frs.len() + 1))?;
    let digest = hasher
        .hash(&frs)
        .map_err(|e| WalletError::ProverFailed(format!("poseidon: {e}")))?;

    Ok(FieldElement::from_fr(digest))
}

/// Hash 1..=4 byte strings, each at most 32 bytes, reduced mod p
pub fn poseidon_hash_bytes(inputs: &[&[u8]]) -> WalletResult<[u8; 32]> {
    if inputs.is_empty() || inputs.len() > MAX_INPUTS {
        return Err(WalletError::UnsupportedWidth(inputs.len() + 1));
    }

    let mut fields = Vec::with_capacity(inputs.len());
    for input in inputs {
        fields.push(FieldElement::from_be_bytes_reduced(input)?);
    }

    Ok(poseidon_hash_fields(&fields)?.to_be_bytes())
}

/// The Merkle tree combiner
pub fn hash_nodes(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    // Two reduced 32-byte inputs cannot hit an unsupported width.
    poseidon_hash_bytes(&[left.as_ref(), right.as_ref()])
        .expect("two-input poseidon parameters are always available")
}

/// Empty-subtree hashes, leaf level first
///
/// `ZERO_HASHES[i]` fills any absent node at level `i`; the chain is
/// `Z[0] = 0`, `Z[i] = hash_nodes(Z[i-1], Z[i-1])`, pinned here as the
/// constants the deployed pool and verifier were generated against.
/// Consensus breaks on any deviation, so the table is fixed rather than
/// recomputed at startup.
pub const ZERO_HASHES: [[u8; 32]; ZERO_HASH_CHAIN_LEN] = [
    hex_literal("0000000000000000000000000000000000000000000000000000000000000000"),
    hex_literal("829a01fae4f8e22b1b4ca5ad5b54a5834ee098a77b735bd57431a7656d29a108"),
    hex_literal("50b4feaeb79752e57b182c6207a6984ebf5e6dc9d7e56c42889666509843b718"),
    hex_literal("f56fdd59a3fd78fbc066b31c20a0dc02d2fab63095664e87f2b2f0819e1cc22d"),
    hex_literal("6e58ea3b67b9d42ee340b22fcc79b87a8ce47a7a6d0404cb1d63fc16c0b95220"),
    hex_literal("2584ba0c4ab469e2d5d3c1e11b328a043f5cea0d1108539eec8c046b13bde31f"),
    hex_literal("c67b4a68ca203df0335e6fb6247a82963e5059ffa18e1af2cfb98581fea5aa00"),
    hex_literal("4dd60b46e179bc509022284c4ba37c9992b2e1b4f3261480dc18c2b346a9a01c"),
    hex_literal("4dc7695fdeb763e585c1fa1d235c42d196917acd8867cdcf20b5fca7594a3412"),
    hex_literal("363f05d4d2cca7b40d87546181acd14f1d21f9535c3d13c45dfbb32afaa3c516"),
    hex_literal("beab72b4311584a18d104dbf69ef69690840fd9fc40263b58122052478f08117"),
    hex_literal("e4f44df15cd40969d4f1bea1110ea66ba4e275ec3839ae243d72cd22f01f0d21"),
    hex_literal("b159372c0d35324c8f5fe23ff3fdf89901218d3d544eafaa115c08f2ddf6e205"),
];

/// The empty-subtree hash at `level`
pub fn zero_hash(level: usize) -> [u8; 32] {
    ZERO_HASHES[level]
}

const fn hex_literal(hex: &str) -> [u8; 32] {
    const fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            _ => panic!("invalid hex digit"),
        }
    }

    let raw = hex.as_bytes();
    assert!(raw.len() == 64);

    let mut out = [0u8; 32];
    let mut i = 0;
    while i < 32 {
        out[i] = nibble(raw[2 * i]) << 4 | nibble(raw[2 * i + 1]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = poseidon_hash_bytes(&[&[1u8; 32], &[2u8; 32]]).unwrap();
        let b = poseidon_hash_bytes(&[&[1u8; 32], &[2u8; 32]]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_sensitive_to_inputs() {
        let a = poseidon_hash_bytes(&[&[1u8; 32], &[2u8; 32]]).unwrap();
        let b = poseidon_hash_bytes(&[&[1u8; 32], &[3u8; 32]]).unwrap();
        let c = poseidon_hash_bytes(&[&[2u8; 32], &[1u8; 32]]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_sensitive_to_arity() {
        let two = poseidon_hash_bytes(&[&[1u8; 32], &[2u8; 32]]).unwrap();
        let three = poseidon_hash_bytes(&[&[1u8; 32], &[2u8; 32], &[0u8; 32]]).unwrap();
        assert_ne!(two, three);
    }

    #[test]
    fn test_output_is_in_field() {
        let digest = poseidon_hash_bytes(&[&[0xffu8; 32]]).unwrap();
        assert!(FieldElement::from_be_bytes(&digest).is_ok());
    }

    #[test]
    fn test_unsupported_widths() {
        assert!(matches!(
            poseidon_hash_bytes(&[]),
            Err(WalletError::UnsupportedWidth(_))
        ));
        let input = [0u8; 32];
        let five: Vec<&[u8]> = vec![&input; 5];
        assert!(matches!(
            poseidon_hash_bytes(&five),
            Err(WalletError::UnsupportedWidth(_))
        ));
    }

    #[test]
    fn test_inputs_reduced_before_hashing() {
        // 0xff..ff and its reduced form must hash identically
        let oversize = [0xffu8; 32];
        let reduced = FieldElement::from_be_bytes_reduced(&oversize)
            .unwrap()
            .to_be_bytes();
        let a = poseidon_hash_bytes(&[&oversize]).unwrap();
        let b = poseidon_hash_bytes(&[&reduced]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_hash_chain_canonical() {
        assert_eq!(ZERO_HASHES[0], [0u8; 32]);
        assert_eq!(
            hex::encode(ZERO_HASHES[1]),
            "829a01fae4f8e22b1b4ca5ad5b54a5834ee098a77b735bd57431a7656d29a108"
        );
        assert_eq!(
            hex::encode(ZERO_HASHES[2]),
            "50b4feaeb79752e57b182c6207a6984ebf5e6dc9d7e56c42889666509843b718"
        );
        assert_eq!(
            hex::encode(ZERO_HASHES[12]),
            "b159372c0d35324c8f5fe23ff3fdf89901218d3d544eafaa115c08f2ddf6e205"
        );
    }

    #[test]
    fn test_hash_nodes_matches_two_input_hash() {
        let left = [5u8; 32];
        let right = [6u8; 32];
        assert_eq!(
            hash_nodes(&left, &right),
            poseidon_hash_bytes(&[&left, &right]).unwrap()
        );
    }
}
