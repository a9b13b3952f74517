//! Deterministic account addressing for pool state
//!
//! Every piece of pool state lives at an address derived from a seed
//! tuple and the program id, so clients can locate epoch trees, leaf
//! chunks, and nullifier markers without an index:
//!
//! - epoch tree header: `("epoch_tree", pool, epoch)`
//! - leaf chunk:        `("leaf_chunk", pool, epoch, chunk_index)`
//! - nullifier marker:  `("nullifier", pool, epoch, nullifier)`
//!
//! A marker account existing at the nullifier address is the on-chain
//! double-spend check; clients probe it before paying for a proof.

use sha2::{Digest, Sha256};
use solana_pubkey::Pubkey;

const ADDRESS_DOMAIN: &[u8] = b"EpochPoolAddress";

fn derive_address(seeds: &[&[u8]], program_id: &Pubkey) -> Pubkey {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_ref());
    hasher.update(ADDRESS_DOMAIN);

    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Pubkey::new_from_array(bytes)
}

/// Address of the pool config account for an asset
pub fn pool_config_address(program_id: &Pubkey, asset_id: &[u8; 32]) -> Pubkey {
    derive_address(&[b"pool", asset_id.as_ref()], program_id)
}

/// Address of the tree header for `epoch`
pub fn epoch_tree_address(program_id: &Pubkey, pool: &Pubkey, epoch: u64) -> Pubkey {
    derive_address(
        &[b"epoch_tree", pool.as_ref(), &epoch.to_le_bytes()],
        program_id,
    )
}

/// Address of leaf chunk `chunk_index` within `epoch`
pub fn leaf_chunk_address(
    program_id: &Pubkey,
    pool: &Pubkey,
    epoch: u64,
    chunk_index: u32,
) -> Pubkey {
    derive_address(
        &[
            b"leaf_chunk",
            pool.as_ref(),
            &epoch.to_le_bytes(),
            &chunk_index.to_le_bytes(),
        ],
        program_id,
    )
}

/// Address of the spent-marker for `nullifier` within `epoch`
pub fn nullifier_marker_address(
    program_id: &Pubkey,
    pool: &Pubkey,
    epoch: u64,
    nullifier: &[u8; 32],
) -> Pubkey {
    derive_address(
        &[
            b"nullifier",
            pool.as_ref(),
            &epoch.to_le_bytes(),
            nullifier.as_ref(),
        ],
        program_id,
    )
}
